use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Строит фильтр событий.
///
/// Если задан `RUST_LOG`, используется он; иначе директива из конфигурации,
/// а при её ошибке `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return env_filter;
    }

    let directive = config.build_filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            // подписчик ещё не установлен, сообщать некуда кроме stderr
            eprintln!("Invalid log filter directive from config ('{directive}'): {e}; falling back to 'info'");
            EnvFilter::new("info")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info message should be filtered out");
            tracing::warn!("warn message should pass through");
        });

        let out = buffer.lock().unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// Тест проверяет, что директива из конфигурации отсекает уровни ниже
    /// заданного.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&cfg));
        assert!(out.contains("warn message should pass through"));
        assert!(!out.contains("info message should be filtered out"));
    }

    /// Тест проверяет, что некорректная директива не приводит к панике и
    /// заменяется на `info`.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let cfg = LoggingConfig {
            level: "kinbus=loud".to_string(),
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&cfg));
        assert!(out.contains("info message should be filtered out"));
    }

    /// Тест проверяет приоритет `RUST_LOG` над конфигурацией.
    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let cfg = LoggingConfig {
            level: "trace".to_string(),
            ..Default::default()
        };

        let out = capture(build_filter_from_config(&cfg));
        env::remove_var("RUST_LOG");
        assert!(!out.contains("warn message should pass through"));
    }
}
