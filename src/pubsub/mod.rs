//! Внутрипроцессная шина публикации/подписки.
//!
//! - `message`: виды сообщений, типаж [`Message`] и конверт [`Envelope`].
//! - `mailbox`: ограниченная очередь конечной точки.
//! - `router`: маршрутизатор обратных вызовов и дескриптор [`Callback`].
//! - `endpoint`: конечная точка, объединяющая ящик и маршрутизатор.
//! - `bus`: актор шины с таблицей `вид → конечные точки`.
//!
//! Публикация проходит путь `Bus → Mailbox → dispatch → Router → Callback`.
//! Подписчик получает сообщение только когда сам вызывает
//! [`Endpoint::dispatch`].

pub mod bus;
pub mod endpoint;
pub mod mailbox;
pub mod message;
pub mod router;

pub use bus::{Bus, BusStats, PublishResult};
pub use endpoint::Endpoint;
pub use mailbox::Mailbox;
pub use message::*;
pub use router::{Callback, CallbackId, Router};
