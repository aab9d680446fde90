use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling::daily};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::{
    error::LoggingResult,
    logging::{config::LoggingConfig, formatter},
};

/// Файловый слой с ежедневной ротацией.
///
/// Запись идёт через фоновый поток; guard нужно держать, пока логирование
/// используется, иначе хвост буфера потеряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> LoggingResult<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = daily(&config.log_dir, &config.file_name);
    let (non_blocking_writer, guard) = non_blocking(file_appender);

    let layer =
        formatter::build_formatter_from_config(config, config.format, non_blocking_writer, false);
    Ok((layer, guard))
}
