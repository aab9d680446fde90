use std::{any::Any, io};

use kinbus_error::{ErrorExt, StatusCode};
use thiserror::Error;

pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid log filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Log file name must not be empty when file logging is enabled")]
    EmptyFileName,

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Io(_) => StatusCode::Internal,
            Self::InvalidDirective { .. } | Self::EmptyFileName => StatusCode::InvalidArgs,
            Self::AlreadyInitialized(_) => StatusCode::AlreadyExists,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
