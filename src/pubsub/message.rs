use std::{any::Any, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Числовой идентификатор типа сообщения.
///
/// Стабилен на всё время жизни процесса; сравнивается только на равенство.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MessageKind(u32);

/// Идентификатор конечной точки, выдаваемый шиной при её создании.
///
/// Используется только для сравнения на равенство. Первый выданный
/// идентификатор равен 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ChannelId(u64);

/// Позволяет получить `&dyn Any` из типажного объекта сообщения.
///
/// Реализован для всех `'static` типов, вручную реализовывать не нужно.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

/// Сообщение, передаваемое через шину.
///
/// Единственное требование: сообщить свой [`MessageKind`]. Для типов с
/// фиксированным видом удобнее макрос [`impl_message!`](crate::impl_message).
pub trait Message: AsAny + Send + Sync + fmt::Debug + 'static {
    fn kind(&self) -> MessageKind;
}

/// Неизменяемое опубликованное сообщение.
///
/// Клонирование дешёвое: все получатели разделяют один `Arc`. Вид сообщения
/// вычисляется один раз при создании конверта.
#[derive(Clone)]
pub struct Envelope {
    kind: MessageKind,
    inner: Arc<dyn Message>,
}

impl MessageKind {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl ChannelId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Следующий идентификатор после `self`.
    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Envelope {
    /// Оборачивает сообщение в конверт, забирая владение.
    pub fn new<M: Message>(msg: M) -> Self {
        Self::from_shared(Arc::new(msg))
    }

    /// Создаёт конверт из уже разделяемого сообщения.
    pub fn from_shared(inner: Arc<dyn Message>) -> Self {
        Self {
            kind: inner.kind(),
            inner,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn message(&self) -> &dyn Message {
        &*self.inner
    }

    /// Возвращает сообщение как конкретный тип `M`, если он совпадает.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        AsAny::as_any(&*self.inner).downcast_ref::<M>()
    }

    /// Проверяет, что оба конверта указывают на одно и то же сообщение.
    pub fn ptr_eq(
        &self,
        other: &Envelope,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("message", &self.inner)
            .finish()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MessageKind {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<MessageKind> for u32 {
    fn from(kind: MessageKind) -> Self {
        kind.0
    }
}

impl From<u64> for ChannelId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
