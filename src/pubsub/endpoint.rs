use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, trace};

use super::{
    bus::MessageQueue, Bus, Callback, ChannelId, Envelope, Mailbox, Message, MessageKind,
    PublishResult, Router,
};
use crate::error::{BusError, BusResult};

/// Конечная точка: почтовый ящик, маршрутизатор обратных вызовов и учёт
/// видов сообщений, на которые она подписана.
///
/// Потребитель сам решает, когда обрабатывать сообщения, вызывая
/// [`Endpoint::dispatch`] или его варианты. `Endpoint` дешёво клонируется;
/// все клоны работают с одной конечной точкой.
///
/// ```no_run
/// use kinbus::{impl_message, Bus, Message};
///
/// #[derive(Debug)]
/// struct Ping(u32);
/// impl_message!(Ping, 1);
///
/// # async fn demo() -> kinbus::BusResult<()> {
/// let bus = Bus::new();
/// let endpoint = bus.new_endpoint(8).await?;
/// endpoint
///     .subscribe(Ping(0).kind(), |ping: &Ping| println!("ping {}", ping.0))
///     .await?;
///
/// bus.publish(Ping(1)).await?;
/// endpoint.dispatch().await;
/// endpoint.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Endpoint {
    core: Arc<EndpointCore>,
    bus: Bus,
    _owner: Arc<Owner>,
}

/// Общий для всех клонов `Endpoint` маркер владельца. Уничтожение последнего
/// клона сообщает ядру, что ящик больше некому разбирать.
struct Owner(watch::Sender<bool>);

impl Drop for Owner {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Состояние конечной точки. Шина видит его только через [`MessageQueue`].
pub(crate) struct EndpointCore {
    id: ChannelId,
    mailbox: Mailbox,
    router: Router,
    /// Виды, о которых сообщено шине; каждый не более одного раза.
    kinds: Mutex<Vec<MessageKind>>,
    /// Подписка и закрытие выполняются строго по одной.
    lifecycle: AsyncMutex<()>,
    closed: AtomicBool,
    abandoned: watch::Receiver<bool>,
}

impl EndpointCore {
    fn new(
        id: ChannelId,
        mailbox_capacity: usize,
        router_queue: usize,
        abandoned: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            mailbox: Mailbox::new(id, mailbox_capacity),
            router: Router::spawn(id, router_queue),
            kinds: Mutex::new(Vec::new()),
            lifecycle: AsyncMutex::new(()),
            closed: AtomicBool::new(false),
            abandoned,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Останавливает маршрутизатор, затем закрывает ящик.
    ///
    /// Возвращает `false`, если конечная точка уже была остановлена.
    async fn stop(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.router.close().await;
        let discarded = self.mailbox.close().await;
        debug!(channel = %self.id, discarded, "Endpoint shut down");
        true
    }
}

#[async_trait]
impl MessageQueue for EndpointCore {
    fn id(&self) -> ChannelId {
        self.id
    }

    async fn enqueue(
        &self,
        envelope: Envelope,
    ) -> BusResult<()> {
        self.mailbox.push(envelope).await
    }

    fn try_enqueue(
        &self,
        envelope: Envelope,
    ) -> BusResult<()> {
        self.mailbox.try_push(envelope)
    }

    async fn abandoned(&self) {
        let mut rx = self.abandoned.clone();
        // закрытый канал тоже означает, что владельца больше нет
        let _ = rx.wait_for(|gone| *gone).await;
    }

    async fn shutdown(&self) {
        self.stop().await;
    }
}

impl Endpoint {
    pub(crate) fn new(
        bus: Bus,
        id: ChannelId,
        mailbox_capacity: usize,
        router_queue: usize,
    ) -> Self {
        let (owner, abandoned) = watch::channel(false);
        Self {
            core: Arc::new(EndpointCore::new(
                id,
                mailbox_capacity,
                router_queue,
                abandoned,
            )),
            bus,
            _owner: Arc::new(Owner(owner)),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.core.id
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn capacity(&self) -> usize {
        self.core.mailbox.capacity()
    }

    /// Количество сообщений, ожидающих обработки.
    pub fn pending(&self) -> usize {
        self.core.mailbox.len()
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Виды сообщений, о которых конечная точка сообщила шине.
    pub fn subscribed_kinds(&self) -> Vec<MessageKind> {
        self.core.kinds.lock().clone()
    }

    /// Привязывает обработчик к виду сообщения.
    ///
    /// Первая подписка на вид регистрирует интерес в шине; последующие
    /// только добавляют обработчик. Повторная привязка того же обработчика
    /// ничего не меняет. Если шина отклонила регистрацию, вид не
    /// запоминается.
    pub async fn subscribe_message(
        &self,
        kind: MessageKind,
        callback: &Callback,
    ) -> BusResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        self.ensure_open()?;

        let first = {
            let mut kinds = self.core.kinds.lock();
            if kinds.contains(&kind) {
                false
            } else {
                kinds.push(kind);
                true
            }
        };

        if let Err(err) = self.core.router.bind_message(kind, callback.clone()).await {
            if first {
                self.forget_kind(kind);
            }
            return Err(err);
        }

        if first {
            if let Err(err) = self.bus.register_queue(kind, self.id(), self.queue()).await {
                self.forget_kind(kind);
                return Err(err);
            }
        }

        trace!(channel = %self.id(), %kind, callback = ?callback.id(), "Subscribed");
        Ok(())
    }

    /// Типизированная подписка: создаёт обработчик для `M` и возвращает его,
    /// чтобы его можно было привязать повторно.
    pub async fn subscribe<M, F>(
        &self,
        kind: MessageKind,
        f: F,
    ) -> BusResult<Callback>
    where
        M: Message,
        F: Fn(&M) + Send + Sync + 'static,
    {
        let callback = Callback::new(f);
        self.subscribe_message(kind, &callback).await?;
        Ok(callback)
    }

    /// Кладёт сообщение прямо в свой ящик, минуя шину.
    pub async fn enqueue(
        &self,
        envelope: Envelope,
    ) -> BusResult<()> {
        self.core.mailbox.push(envelope).await
    }

    /// Ждёт одно сообщение и передаёт его маршрутизатору.
    ///
    /// Возвращает `true`, если сообщение было обработано, и `false`, если
    /// ящик закрыт.
    pub async fn dispatch(&self) -> bool {
        match self.core.mailbox.pop().await {
            Some(envelope) => self.route(envelope).await,
            None => false,
        }
    }

    /// Как [`Endpoint::dispatch`], но ждёт сообщение не дольше `timeout`.
    ///
    /// Ограничено только ожидание сообщения; обработка уже полученного
    /// сообщения доводится до конца.
    pub async fn timed_dispatch(
        &self,
        timeout: Duration,
    ) -> bool {
        match tokio::time::timeout(timeout, self.core.mailbox.pop()).await {
            Ok(Some(envelope)) => self.route(envelope).await,
            Ok(None) | Err(_) => false,
        }
    }

    /// Обрабатывает сообщение, только если оно уже есть в ящике.
    pub async fn try_dispatch(&self) -> bool {
        match self.core.mailbox.try_pop() {
            Some(envelope) => self.route(envelope).await,
            None => false,
        }
    }

    /// Публикует сообщение через свою шину.
    pub async fn publish<M: Message>(
        &self,
        msg: M,
    ) -> BusResult<PublishResult> {
        self.ensure_open()?;
        self.bus.publish(msg).await
    }

    /// Отменяет в шине интерес ко всем видам, затем останавливает
    /// конечную точку.
    ///
    /// Конечная точка останавливается в любом случае. Если шина не знала о
    /// каком-то виде, возвращается [`BusError::InvariantViolation`]. Закрытая
    /// шина ошибкой не считается. Повторный вызов ничего не делает.
    pub async fn close(&self) -> BusResult<()> {
        let _lifecycle = self.core.lifecycle.lock().await;
        if self.is_closed() {
            return Ok(());
        }

        let kinds = std::mem::take(&mut *self.core.kinds.lock());
        let mut failure = None;

        for kind in kinds {
            match self.bus.unregister_channel(kind, self.id()).await {
                Ok(()) => {}
                Err(BusError::BusClosed) => break,
                Err(BusError::NotRegistered { channel, kind }) => {
                    error!(%channel, %kind, "Subscription missing from bus table");
                    failure.get_or_insert(BusError::InvariantViolation { channel, kind });
                }
                Err(err) => {
                    err.log(self.id(), "Unregister failed");
                    failure.get_or_insert(err);
                }
            }
        }

        self.core.stop().await;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Останавливает маршрутизатор и закрывает ящик, не трогая таблицу шины.
    ///
    /// Оставшиеся в таблице записи шина удалит при следующей публикации.
    pub async fn shutdown(&self) {
        self.core.stop().await;
    }

    pub(crate) fn queue(&self) -> Weak<dyn MessageQueue> {
        let queue = Arc::downgrade(&self.core);
        queue
    }

    async fn route(
        &self,
        envelope: Envelope,
    ) -> bool {
        match self.core.router.dispatch(envelope).await {
            Ok(_) => true,
            Err(err) => {
                err.log(self.id(), "Message dropped");
                false
            }
        }
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.is_closed() {
            return Err(BusError::EndpointClosed { channel: self.id() });
        }
        Ok(())
    }

    fn forget_kind(
        &self,
        kind: MessageKind,
    ) {
        self.core.kinds.lock().retain(|k| *k != kind);
    }
}
