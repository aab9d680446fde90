pub mod logging;
pub mod pubsub;

pub use kinbus_error::{ErrorExt, LogLevel, StatusCode};
pub use logging::{LoggingError, LoggingResult};
pub use pubsub::{BusError, BusResult};
