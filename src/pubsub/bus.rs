use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::{ChannelId, Endpoint, Envelope, Message, MessageKind};
use crate::{
    config::BusConfig,
    error::{BusError, BusResult},
};

/// Возможности конечной точки, которыми пользуется шина: идентичность,
/// постановка сообщения в очередь и остановка.
///
/// Шина хранит только `Weak`-ссылки на реализации и не продлевает жизнь
/// конечных точек.
#[async_trait]
pub(crate) trait MessageQueue: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Ставит сообщение в очередь, ожидая свободного места.
    async fn enqueue(
        &self,
        envelope: Envelope,
    ) -> BusResult<()>;

    /// Ставит сообщение в очередь без ожидания.
    fn try_enqueue(
        &self,
        envelope: Envelope,
    ) -> BusResult<()>;

    /// Завершается, когда уничтожен последний пользовательский дескриптор
    /// конечной точки и разбирать ящик больше некому.
    async fn abandoned(&self);

    /// Останавливает маршрутизатор и закрывает почтовый ящик.
    async fn shutdown(&self);
}

/// Шина публикации/подписки.
///
/// Таблица `вид → заинтересованные конечные точки` принадлежит одной
/// задаче. Регистрация, отмена регистрации, выдача идентификаторов и
/// рассылка выполняются ею строго по одной, в порядке поступления команд.
///
/// `publish` ждёт, пока сообщение не окажется в ящике каждого подписчика.
/// Если ящик полон, ждёт и вся шина: медленный потребитель тормозит всех.
/// Для рассылки без ожидания есть [`Bus::try_publish`].
///
/// `Bus` дешёво клонируется; все клоны работают с одной шиной.
#[derive(Clone)]
pub struct Bus {
    commands: mpsc::Sender<BusCommand>,
    metrics: Arc<BusMetrics>,
    config: Arc<BusConfig>,
}

/// Итог успешной публикации.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    /// Сколько ящиков получили сообщение.
    pub subscribers_reached: usize,
    /// Ящики, пропущенные `try_publish`, потому что были полны.
    pub skipped_full: Vec<ChannelId>,
}

/// Снимок счётчиков шины.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Публикации, дошедшие до актора шины.
    pub published: u64,
    /// Доставки в отдельные ящики.
    pub delivered: u64,
    /// Публикации, завершившиеся `NoSubscribers`.
    pub no_subscribers: u64,
    /// Ящики, пропущенные `try_publish`.
    pub skipped_full: u64,
    /// Удалённые из таблицы записи закрытых или уничтоженных конечных точек.
    pub stale_pruned: u64,
    pub endpoints_created: u64,
}

#[derive(Debug, Default)]
struct BusMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    no_subscribers: AtomicU64,
    skipped_full: AtomicU64,
    stale_pruned: AtomicU64,
    endpoints_created: AtomicU64,
}

#[derive(Clone)]
struct Subscriber {
    id: ChannelId,
    queue: Weak<dyn MessageQueue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Ждать свободного места в каждом ящике.
    Blocking,
    /// Пропускать полные ящики.
    Immediate,
}

enum BusCommand {
    Register {
        kind: MessageKind,
        subscriber: Subscriber,
        reply: oneshot::Sender<BusResult<()>>,
    },
    Unregister {
        kind: MessageKind,
        channel: ChannelId,
        reply: oneshot::Sender<BusResult<()>>,
    },
    AllocateId {
        reply: oneshot::Sender<ChannelId>,
    },
    Publish {
        envelope: Envelope,
        delivery: Delivery,
        reply: oneshot::Sender<BusResult<PublishResult>>,
    },
    SubscriberCount {
        kind: MessageKind,
        reply: oneshot::Sender<usize>,
    },
    ActiveKinds {
        reply: oneshot::Sender<Vec<MessageKind>>,
    },
    Close {
        reply: oneshot::Sender<usize>,
    },
}

struct BusActor {
    subscribers: HashMap<MessageKind, Vec<Subscriber>>,
    last_channel_id: ChannelId,
    metrics: Arc<BusMetrics>,
    commands: mpsc::Receiver<BusCommand>,
}

impl Bus {
    /// Создаёт шину с настройками по умолчанию.
    ///
    /// Запускает задачу шины, поэтому требует активного runtime tokio.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.command_capacity.max(1));
        let metrics = Arc::new(BusMetrics::default());
        let actor = BusActor {
            subscribers: HashMap::new(),
            last_channel_id: ChannelId::new(0),
            metrics: metrics.clone(),
            commands: rx,
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            metrics,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Создаёт конечную точку с почтовым ящиком заданной ёмкости.
    pub async fn new_endpoint(
        &self,
        mailbox_capacity: usize,
    ) -> BusResult<Endpoint> {
        let id = self.allocate_channel_id().await?;
        self.metrics
            .endpoints_created
            .fetch_add(1, Ordering::Relaxed);
        debug!(channel = %id, mailbox_capacity, "Endpoint created");

        Ok(Endpoint::new(
            self.clone(),
            id,
            mailbox_capacity,
            self.config.command_capacity,
        ))
    }

    /// Создаёт конечную точку с ёмкостью ящика из конфигурации.
    pub async fn open_endpoint(&self) -> BusResult<Endpoint> {
        self.new_endpoint(self.config.default_mailbox_capacity)
            .await
    }

    /// Выдаёт следующий идентификатор канала.
    pub async fn allocate_channel_id(&self) -> BusResult<ChannelId> {
        self.request(|reply| BusCommand::AllocateId { reply }).await
    }

    /// Записывает интерес конечной точки к виду сообщения.
    ///
    /// Повторная регистрация возвращает [`BusError::AlreadySubscribed`] и не
    /// меняет таблицу.
    pub async fn register_interest(
        &self,
        kind: MessageKind,
        endpoint: &Endpoint,
    ) -> BusResult<()> {
        self.register_queue(kind, endpoint.id(), endpoint.queue())
            .await
    }

    /// Удаляет конечную точку из списка вида, сохраняя порядок остальных.
    pub async fn unregister_interest(
        &self,
        kind: MessageKind,
        endpoint: &Endpoint,
    ) -> BusResult<()> {
        self.unregister_channel(kind, endpoint.id()).await
    }

    /// Рассылает сообщение всем заинтересованным конечным точкам.
    ///
    /// Ждёт места в каждом ящике по порядку списка.
    pub async fn publish<M: Message>(
        &self,
        msg: M,
    ) -> BusResult<PublishResult> {
        self.publish_envelope(Some(Envelope::new(msg))).await
    }

    /// То же, что [`Bus::publish`], для готового конверта.
    ///
    /// Пустой аргумент даёт [`BusError::InvalidArgument`] независимо от
    /// состояния подписок.
    pub async fn publish_envelope(
        &self,
        envelope: Option<Envelope>,
    ) -> BusResult<PublishResult> {
        let envelope = envelope.ok_or_else(Self::empty_message)?;
        self.submit(envelope, Delivery::Blocking).await
    }

    /// Рассылка без ожидания: полные ящики пропускаются и перечисляются в
    /// [`PublishResult::skipped_full`].
    pub async fn try_publish<M: Message>(
        &self,
        msg: M,
    ) -> BusResult<PublishResult> {
        self.try_publish_envelope(Some(Envelope::new(msg))).await
    }

    pub async fn try_publish_envelope(
        &self,
        envelope: Option<Envelope>,
    ) -> BusResult<PublishResult> {
        let envelope = envelope.ok_or_else(Self::empty_message)?;
        self.submit(envelope, Delivery::Immediate).await
    }

    /// Количество конечных точек, заинтересованных в виде сообщения.
    pub async fn subscriber_count(
        &self,
        kind: MessageKind,
    ) -> BusResult<usize> {
        self.request(|reply| BusCommand::SubscriberCount { kind, reply })
            .await
    }

    /// Виды сообщений, у которых есть подписчики, по возрастанию.
    pub async fn active_kinds(&self) -> BusResult<Vec<MessageKind>> {
        self.request(|reply| BusCommand::ActiveKinds { reply }).await
    }

    pub fn stats(&self) -> BusStats {
        let m = &self.metrics;
        BusStats {
            published: m.published.load(Ordering::Relaxed),
            delivered: m.delivered.load(Ordering::Relaxed),
            no_subscribers: m.no_subscribers.load(Ordering::Relaxed),
            skipped_full: m.skipped_full.load(Ordering::Relaxed),
            stale_pruned: m.stale_pruned.load(Ordering::Relaxed),
            endpoints_created: m.endpoints_created.load(Ordering::Relaxed),
        }
    }

    /// Останавливает каждую конечную точку из таблицы ровно один раз, затем
    /// останавливает задачу шины.
    ///
    /// Возвращает число остановленных конечных точек. Любая операция после
    /// закрытия возвращает [`BusError::BusClosed`].
    pub async fn close(&self) -> BusResult<usize> {
        self.request(|reply| BusCommand::Close { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub(crate) async fn register_queue(
        &self,
        kind: MessageKind,
        id: ChannelId,
        queue: Weak<dyn MessageQueue>,
    ) -> BusResult<()> {
        let subscriber = Subscriber { id, queue };
        self.request(|reply| BusCommand::Register {
            kind,
            subscriber,
            reply,
        })
        .await?
    }

    pub(crate) async fn unregister_channel(
        &self,
        kind: MessageKind,
        channel: ChannelId,
    ) -> BusResult<()> {
        self.request(|reply| BusCommand::Unregister {
            kind,
            channel,
            reply,
        })
        .await?
    }

    async fn submit(
        &self,
        envelope: Envelope,
        delivery: Delivery,
    ) -> BusResult<PublishResult> {
        self.request(|reply| BusCommand::Publish {
            envelope,
            delivery,
            reply,
        })
        .await?
    }

    /// Отправляет команду задаче шины и ждёт ответа.
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> BusCommand,
    ) -> BusResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| BusError::BusClosed)?;
        rx.await.map_err(|_| BusError::BusClosed)
    }

    fn empty_message() -> BusError {
        BusError::InvalidArgument("message must not be empty".to_string())
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusActor {
    async fn run(mut self) {
        debug!("Bus started");

        while let Some(cmd) = self.commands.recv().await {
            match cmd {
                BusCommand::Register {
                    kind,
                    subscriber,
                    reply,
                } => {
                    let _ = reply.send(self.register(kind, subscriber));
                }
                BusCommand::Unregister {
                    kind,
                    channel,
                    reply,
                } => {
                    let _ = reply.send(self.unregister(kind, channel));
                }
                BusCommand::AllocateId { reply } => {
                    self.last_channel_id = self.last_channel_id.next();
                    let _ = reply.send(self.last_channel_id);
                }
                BusCommand::Publish {
                    envelope,
                    delivery,
                    reply,
                } => {
                    let result = self.publish(envelope, delivery).await;
                    let _ = reply.send(result);
                }
                BusCommand::SubscriberCount { kind, reply } => {
                    let count = self.subscribers.get(&kind).map_or(0, Vec::len);
                    let _ = reply.send(count);
                }
                BusCommand::ActiveKinds { reply } => {
                    let mut kinds: Vec<MessageKind> = self
                        .subscribers
                        .iter()
                        .filter(|(_, list)| !list.is_empty())
                        .map(|(kind, _)| *kind)
                        .collect();
                    kinds.sort_unstable();
                    let _ = reply.send(kinds);
                }
                BusCommand::Close { reply } => {
                    let closed = self.close().await;
                    info!(endpoints = closed, "Bus closed");
                    let _ = reply.send(closed);
                    break;
                }
            }
        }
    }

    fn register(
        &mut self,
        kind: MessageKind,
        subscriber: Subscriber,
    ) -> BusResult<()> {
        let list = self.subscribers.entry(kind).or_default();
        if list.iter().any(|candidate| candidate.id == subscriber.id) {
            return Err(BusError::AlreadySubscribed {
                channel: subscriber.id,
                kind,
            });
        }

        debug!(channel = %subscriber.id, %kind, "Interest registered");
        list.push(subscriber);
        Ok(())
    }

    fn unregister(
        &mut self,
        kind: MessageKind,
        channel: ChannelId,
    ) -> BusResult<()> {
        let not_registered = BusError::NotRegistered { channel, kind };
        let list = self.subscribers.get_mut(&kind).ok_or(not_registered.clone())?;
        let pos = list
            .iter()
            .position(|candidate| candidate.id == channel)
            .ok_or(not_registered)?;

        list.remove(pos);
        if list.is_empty() {
            self.subscribers.remove(&kind);
        }

        debug!(%channel, %kind, "Interest unregistered");
        Ok(())
    }

    async fn publish(
        &mut self,
        envelope: Envelope,
        delivery: Delivery,
    ) -> BusResult<PublishResult> {
        self.metrics.published.fetch_add(1, Ordering::Relaxed);
        let kind = envelope.kind();

        let targets = match self.subscribers.get(&kind) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return Err(self.no_subscribers(kind)),
        };

        let mut result = PublishResult::default();
        let mut stale = Vec::new();

        for target in &targets {
            let Some(queue) = target.queue.upgrade() else {
                stale.push(target.id);
                continue;
            };

            let outcome = match delivery {
                Delivery::Blocking => {
                    tokio::select! {
                        biased;
                        _ = queue.abandoned() => Err(BusError::EndpointClosed { channel: target.id }),
                        outcome = queue.enqueue(envelope.clone()) => outcome,
                    }
                }
                Delivery::Immediate => queue.try_enqueue(envelope.clone()),
            };

            match outcome {
                Ok(()) => {
                    trace!(channel = %target.id, %kind, "Message enqueued");
                    result.subscribers_reached += 1;
                }
                Err(BusError::MailboxFull { channel }) => {
                    trace!(%channel, %kind, "Mailbox full, message skipped");
                    result.skipped_full.push(channel);
                }
                Err(err) => {
                    err.log(target.id, "Enqueue failed");
                    stale.push(target.id);
                }
            }
        }

        if !stale.is_empty() {
            self.prune(kind, &stale);
        }

        self.metrics
            .delivered
            .fetch_add(result.subscribers_reached as u64, Ordering::Relaxed);
        self.metrics
            .skipped_full
            .fetch_add(result.skipped_full.len() as u64, Ordering::Relaxed);

        if result.subscribers_reached == 0 && result.skipped_full.is_empty() {
            return Err(self.no_subscribers(kind));
        }
        Ok(result)
    }

    /// Удаляет записи конечных точек, которые уже закрыты или уничтожены.
    fn prune(
        &mut self,
        kind: MessageKind,
        stale: &[ChannelId],
    ) {
        if let Some(list) = self.subscribers.get_mut(&kind) {
            list.retain(|candidate| !stale.contains(&candidate.id));
            if list.is_empty() {
                self.subscribers.remove(&kind);
            }
        }

        warn!(%kind, channels = ?stale, "Pruned stale subscribers");
        self.metrics
            .stale_pruned
            .fetch_add(stale.len() as u64, Ordering::Relaxed);
    }

    fn no_subscribers(
        &self,
        kind: MessageKind,
    ) -> BusError {
        self.metrics.no_subscribers.fetch_add(1, Ordering::Relaxed);
        BusError::NoSubscribers { kind }
    }

    async fn close(&mut self) -> usize {
        let mut seen = HashSet::new();
        let distinct: Vec<Subscriber> = self
            .subscribers
            .values()
            .flatten()
            .filter(|sub| seen.insert(sub.id))
            .cloned()
            .collect();
        self.subscribers.clear();

        let mut closed = 0;
        for sub in distinct {
            if let Some(queue) = sub.queue.upgrade() {
                queue.shutdown().await;
                closed += 1;
            }
        }
        closed
    }
}
