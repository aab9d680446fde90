#[macro_use]
mod macros;

/// Configuration loading: bus and logging settings.
pub mod config;
/// Error types: BusError, LoggingError and status codes.
pub mod error;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Pub/Sub: Bus, Endpoint, Mailbox, Callback Router.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// config
pub use config::{BusConfig, Settings};
/// Operation errors and result types.
pub use error::{BusError, BusResult, ErrorExt, LoggingError, StatusCode};
/// Logging setup.
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingHandle};
/// Pub/Sub API.
pub use pubsub::{
    Bus, BusStats, Callback, CallbackId, ChannelId, Endpoint, Envelope, Message, MessageKind,
    PublishResult,
};
