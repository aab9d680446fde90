use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot, watch, Mutex,
};
use tracing::{debug, trace};

use super::{ChannelId, Envelope};
use crate::error::{BusError, BusResult};

/// Ограниченная FIFO-очередь сообщений одной конечной точки.
///
/// - `push` ждёт свободного места; именно через него противодавление
///   медленного потребителя доходит до актора шины.
/// - Ёмкость 0 означает синхронную передачу: `push` завершается только
///   после того, как потребитель забрал сообщение.
/// - После `close` вставка возвращает [`BusError::MailboxClosed`], а
///   извлечение сразу видит «пусто, закрыто». Оставшиеся в очереди сообщения
///   отбрасываются.
///
/// Производителей и потребителей может быть несколько; каждое сообщение
/// достаётся ровно одному потребителю.
pub struct Mailbox {
    channel: ChannelId,
    capacity: usize,
    tx: mpsc::Sender<Slot>,
    rx: Mutex<mpsc::Receiver<Slot>>,
    closed: watch::Sender<bool>,
    /// Количество потребителей, ожидающих в `pop`.
    waiting: AtomicUsize,
}

/// Элемент очереди. Для ящика нулевой ёмкости несёт подтверждение передачи.
struct Slot {
    envelope: Envelope,
    handoff: Option<oneshot::Sender<()>>,
}

/// Снимает отметку ожидающего потребителя, даже если `pop` был отменён.
struct WaitGuard<'a>(&'a AtomicUsize);

impl Mailbox {
    pub fn new(
        channel: ChannelId,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            channel,
            capacity,
            tx,
            rx: Mutex::new(rx),
            closed,
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Ёмкость, заданная при создании (0 означает синхронную передачу).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Количество сообщений, ожидающих выборки.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Помещает сообщение в очередь, ожидая свободного места.
    pub async fn push(
        &self,
        envelope: Envelope,
    ) -> BusResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        if self.capacity == 0 {
            let (ack, acked) = oneshot::channel();
            self.send(Slot {
                envelope,
                handoff: Some(ack),
            })
            .await?;
            return acked.await.map_err(|_| self.closed_error());
        }

        self.send(Slot {
            envelope,
            handoff: None,
        })
        .await
    }

    /// Помещает сообщение в очередь, только если место есть прямо сейчас.
    ///
    /// Для ящика нулевой ёмкости место есть, только когда потребитель уже
    /// ждёт в `pop`.
    pub fn try_push(
        &self,
        envelope: Envelope,
    ) -> BusResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        if self.capacity == 0 && self.waiting.load(Ordering::Acquire) == 0 {
            return Err(BusError::MailboxFull {
                channel: self.channel,
            });
        }

        self.tx
            .try_send(Slot {
                envelope,
                handoff: None,
            })
            .map_err(|err| match err {
                TrySendError::Full(_) => BusError::MailboxFull {
                    channel: self.channel,
                },
                TrySendError::Closed(_) => self.closed_error(),
            })
    }

    /// Ждёт следующее сообщение.
    ///
    /// Возвращает `None`, если ящик закрыт (в том числе во время ожидания).
    pub async fn pop(&self) -> Option<Envelope> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }

        let mut rx = tokio::select! {
            guard = self.rx.lock() => guard,
            _ = closed.changed() => return None,
        };

        let _waiting = WaitGuard::enter(&self.waiting);
        let slot = tokio::select! {
            slot = rx.recv() => slot,
            _ = closed.changed() => None,
        };

        slot.map(Slot::accept)
    }

    /// Забирает сообщение, только если оно доступно немедленно.
    pub fn try_pop(&self) -> Option<Envelope> {
        if self.is_closed() {
            return None;
        }
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok().map(Slot::accept)
    }

    /// Закрывает ящик. Повторный вызов ничего не делает.
    ///
    /// Возвращает количество отброшенных сообщений.
    pub async fn close(&self) -> usize {
        if self.closed.send_replace(true) {
            return 0;
        }

        let mut rx = self.rx.lock().await;
        rx.close();

        let mut discarded = 0;
        while let Ok(slot) = rx.try_recv() {
            trace!(channel = %self.channel, kind = %slot.envelope.kind(), "Discarding message");
            discarded += 1;
        }

        debug!(channel = %self.channel, discarded, "Mailbox closed");
        discarded
    }

    async fn send(
        &self,
        slot: Slot,
    ) -> BusResult<()> {
        self.tx.send(slot).await.map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> BusError {
        BusError::MailboxClosed {
            channel: self.channel,
        }
    }
}

impl Slot {
    fn accept(self) -> Envelope {
        if let Some(ack) = self.handoff {
            let _ = ack.send(());
        }
        self.envelope
    }
}

impl<'a> WaitGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
