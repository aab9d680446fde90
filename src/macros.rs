/// Реализует [`Message`](crate::pubsub::Message) для типа с фиксированным
/// видом сообщения.
///
/// Пример:
///
/// ```
/// use kinbus::{impl_message, pubsub::{Message, MessageKind}};
///
/// #[derive(Debug)]
/// struct Ping {
///     seq: u64,
/// }
/// impl_message!(Ping, 100);
///
/// assert_eq!(Ping { seq: 1 }.kind(), MessageKind::new(100));
/// ```
#[macro_export]
macro_rules! impl_message {
    ($ty:ty, $kind:expr) => {
        impl $crate::pubsub::Message for $ty {
            fn kind(&self) -> $crate::pubsub::MessageKind {
                $crate::pubsub::MessageKind::new($kind)
            }
        }
    };
}
