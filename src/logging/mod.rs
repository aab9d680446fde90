//! Настройка логирования на базе `tracing`.
//!
//! - `config`: [`LoggingConfig`] и формат вывода.
//! - `filters`: построение `EnvFilter` (`RUST_LOG` в приоритете).
//! - `formatter`: fmt-слой в формате compact/pretty/json.
//! - `sinks`: консольный и файловый выводы.
//! - `handle`: [`LoggingHandle`], владеющий guard файлового вывода.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{LoggingError, LoggingResult};

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный подписчик; повторный вызов возвращает
/// [`LoggingError::AlreadyInitialized`].
pub fn init_logging(config: &LoggingConfig) -> LoggingResult<LoggingHandle> {
    config.validate()?;
    config.ensure_log_dir()?;

    let env_filter = filters::build_filter_from_config(config);
    let mut layers = vec![sinks::console::layer_with_config(config)];

    let (file_guard, file_path) = if config.file_enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(config)?;
        layers.push(file_layer);
        (Some(guard), Some(config.log_dir.join(&config.file_name)))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = ?config.format,
        file_enabled = config.file_enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard, file_path))
}
