use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

use super::{ChannelId, Envelope, Message, MessageKind};
use crate::error::{BusError, BusResult};

static NEXT_CALLBACK_ID: AtomicU64 = AtomicU64::new(1);

/// Идентичность зарегистрированного обработчика.
///
/// Уникальна в пределах процесса; клоны одного [`Callback`] разделяют её.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type Handler = dyn Fn(&Envelope) + Send + Sync;

/// Обработчик сообщений с явной идентичностью.
///
/// Два разных замыкания с одинаковым поведением считаются разными
/// обработчиками.
/// Повторная привязка клона того же обработчика к тому же виду
/// игнорируется.
#[derive(Clone)]
pub struct Callback {
    id: CallbackId,
    handler: Arc<Handler>,
}

/// Маршрутизатор обратных вызовов одной конечной точки.
///
/// Таблица `вид → обработчики` принадлежит отдельной задаче; привязка и
/// вызов обработчиков выполняются ею по одному, в порядке поступления
/// команд.
pub struct Router {
    channel: ChannelId,
    commands: mpsc::Sender<RouterCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

enum RouterCommand {
    Bind {
        kind: MessageKind,
        callback: Callback,
        reply: oneshot::Sender<bool>,
    },
    Dispatch {
        envelope: Envelope,
        reply: oneshot::Sender<usize>,
    },
    Stop,
}

struct RouterActor {
    channel: ChannelId,
    callbacks: HashMap<MessageKind, Vec<Callback>>,
    commands: mpsc::Receiver<RouterCommand>,
}

impl Callback {
    /// Создаёт обработчик для конкретного типа сообщения.
    ///
    /// Сообщение другого типа, пришедшее под тем же видом, пропускается с
    /// предупреждением в логе.
    pub fn new<M, F>(f: F) -> Self
    where
        M: Message,
        F: Fn(&M) + Send + Sync + 'static,
    {
        Self::untyped(move |envelope: &Envelope| match envelope.downcast_ref::<M>() {
            Some(msg) => f(msg),
            None => warn!(
                kind = %envelope.kind(),
                expected = std::any::type_name::<M>(),
                "Callback skipped: message variant mismatch"
            ),
        })
    }

    /// Создаёт обработчик, получающий конверт без приведения типа.
    pub fn untyped<F>(f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        Self {
            id: CallbackId(NEXT_CALLBACK_ID.fetch_add(1, Ordering::Relaxed)),
            handler: Arc::new(f),
        }
    }

    pub fn id(&self) -> CallbackId {
        self.id
    }

    fn call(
        &self,
        envelope: &Envelope,
    ) {
        (self.handler)(envelope)
    }
}

impl PartialEq for Callback {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.id == other.id
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Callback").field("id", &self.id.0).finish()
    }
}

impl Router {
    /// Запускает задачу маршрутизатора. Требует активного runtime tokio.
    pub fn spawn(
        channel: ChannelId,
        queue_capacity: usize,
    ) -> Self {
        let (commands, rx) = mpsc::channel(queue_capacity.max(1));
        let actor = RouterActor {
            channel,
            callbacks: HashMap::new(),
            commands: rx,
        };
        let worker = tokio::spawn(actor.run());

        Self {
            channel,
            commands,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Привязывает обработчик к виду сообщения.
    ///
    /// Возвращает `false`, если этот же обработчик уже был привязан.
    pub async fn bind_message(
        &self,
        kind: MessageKind,
        callback: Callback,
    ) -> BusResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Bind {
            kind,
            callback,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.stopped())
    }

    /// Вызывает все обработчики вида сообщения в порядке привязки.
    ///
    /// Завершается после того, как отработал последний обработчик.
    /// Возвращает число вызванных обработчиков; вид без обработчиков не
    /// считается ошибкой.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
    ) -> BusResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(RouterCommand::Dispatch { envelope, reply }).await?;
        rx.await.map_err(|_| self.stopped())
    }

    /// Останавливает задачу и дожидается её завершения.
    pub async fn close(&self) {
        let _ = self.commands.send(RouterCommand::Stop).await;

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(channel = %self.channel, %err, "Router worker terminated abnormally");
            }
        }
    }

    async fn send(
        &self,
        cmd: RouterCommand,
    ) -> BusResult<()> {
        self.commands.send(cmd).await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> BusError {
        BusError::RouterStopped {
            channel: self.channel,
        }
    }
}

impl RouterActor {
    async fn run(mut self) {
        debug!(channel = %self.channel, "Router started");

        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                RouterCommand::Bind {
                    kind,
                    callback,
                    reply,
                } => {
                    let _ = reply.send(self.bind(kind, callback));
                }
                RouterCommand::Dispatch { envelope, reply } => {
                    let _ = reply.send(self.dispatch(&envelope));
                }
                RouterCommand::Stop => break,
            }
        }

        debug!(channel = %self.channel, "Router stopped");
    }

    fn bind(
        &mut self,
        kind: MessageKind,
        callback: Callback,
    ) -> bool {
        let bound = self.callbacks.entry(kind).or_default();
        if bound.contains(&callback) {
            trace!(channel = %self.channel, %kind, callback = callback.id.0, "Callback already bound");
            return false;
        }
        bound.push(callback);
        true
    }

    fn dispatch(
        &self,
        envelope: &Envelope,
    ) -> usize {
        let Some(bound) = self.callbacks.get(&envelope.kind()) else {
            trace!(channel = %self.channel, kind = %envelope.kind(), "No callbacks bound, message dropped");
            return 0;
        };

        for callback in bound {
            callback.call(envelope);
        }
        bound.len()
    }
}
