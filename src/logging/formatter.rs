use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Строит fmt-слой по конфигурации.
///
/// Возвращаем boxed trait-объект, чтобы стереть конкретный тип формата
/// (json/pretty/compact).
pub fn build_formatter_from_config<S, W>(
    config: &LoggingConfig,
    format: LogFormat,
    writer: W,
    with_ansi: bool,
) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => {
            let json_fmt = fmt::format().json().with_current_span(true);
            let layer = fmt::layer()
                .event_format(json_fmt)
                .fmt_fields(fmt::format::JsonFields::new())
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids);
            Box::new(layer)
        }
        LogFormat::Pretty => {
            let pretty_fmt = fmt::format().pretty();
            let layer = fmt::layer()
                .event_format(pretty_fmt)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids);
            Box::new(layer)
        }
        LogFormat::Compact => {
            let compact_fmt = fmt::format().compact();
            let layer = fmt::layer()
                .event_format(compact_fmt)
                .with_writer(writer)
                .with_ansi(with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids);
            Box::new(layer)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::rstest;
    use tracing_subscriber::{prelude::*, Registry};

    use super::*;

    #[derive(Clone)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
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

    /// Тест проверяет, что каждый формат строится и пишет событие.
    #[rstest]
    #[case(LogFormat::Compact)]
    #[case(LogFormat::Pretty)]
    #[case(LogFormat::Json)]
    fn test_every_format_emits_event(#[case] format: LogFormat) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let out = out.clone();
            move || Buffer(out.clone())
        };
        let cfg = LoggingConfig::default();
        let layer = build_formatter_from_config::<Registry, _>(&cfg, format, writer, false);

        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::info!(channel = 7, "endpoint created");
        });

        let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert!(text.contains("endpoint created"));
    }

    #[test]
    fn test_json_format_is_parseable() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let out = out.clone();
            move || Buffer(out.clone())
        };
        let cfg = LoggingConfig::default();
        let layer = build_formatter_from_config::<Registry, _>(&cfg, LogFormat::Json, writer, true);

        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::warn!(kind = 3, "pruned stale subscribers");
        });

        let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        let line = text.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["fields"]["message"], "pruned stale subscribers");
        assert_eq!(value["fields"]["kind"], 3);
    }
}
