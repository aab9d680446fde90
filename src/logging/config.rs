use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{LoggingError, LoggingResult};

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Настройки логирования.
///
/// `level` задаётся директивой `EnvFilter`: уровень (`"info"`) или полный набор
/// (`"kinbus=debug,warn"`). Переменная `RUST_LOG` имеет приоритет.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_ansi: bool,
    /// Дублировать события в файл с ежедневной ротацией.
    pub file_enabled: bool,
    pub log_dir: PathBuf,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_target: true,
            with_thread_ids: false,
            with_ansi: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "kinbus.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_string()
    }

    pub fn validate(&self) -> LoggingResult<()> {
        let directive = self.build_filter_directive();
        if let Err(err) = EnvFilter::try_new(&directive) {
            return Err(LoggingError::InvalidDirective {
                directive,
                reason: err.to_string(),
            });
        }
        if self.file_enabled && self.file_name.trim().is_empty() {
            return Err(LoggingError::EmptyFileName);
        }
        Ok(())
    }

    /// Создаёт каталог логов, если включён вывод в файл.
    pub fn ensure_log_dir(&self) -> LoggingResult<()> {
        if self.file_enabled {
            std::fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = LoggingConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.format, LogFormat::Compact);
        assert!(!cfg.file_enabled);
    }

    #[test]
    fn test_invalid_directive_rejected() {
        let cfg = LoggingConfig {
            level: "kinbus=loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(LoggingError::InvalidDirective { .. })
        ));
    }

    #[test]
    fn test_empty_file_name_rejected_only_when_enabled() {
        let mut cfg = LoggingConfig {
            file_name: " ".to_string(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        cfg.file_enabled = true;
        assert!(matches!(cfg.validate(), Err(LoggingError::EmptyFileName)));
    }

    /// Тест проверяет разбор формата из нижнего регистра.
    #[test]
    fn test_format_deserialize() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{ "format": "json", "level": "debug" }"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.file_name, "kinbus.log");
    }

    #[test]
    fn test_ensure_log_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let cfg = LoggingConfig {
            file_enabled: true,
            log_dir: dir.clone(),
            ..Default::default()
        };

        cfg.ensure_log_dir().unwrap();
        assert!(dir.is_dir());
    }
}
