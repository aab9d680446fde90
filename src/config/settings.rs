use std::path::Path;

use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

const ENV_PREFIX: &str = "KINBUS";
const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_COMMAND_CAPACITY: usize = 64;
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// Параметры шины.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Ёмкость очереди команд актора шины и маршрутизаторов конечных точек.
    pub command_capacity: usize,
    /// Ёмкость ящика для [`Bus::open_endpoint`](crate::Bus::open_endpoint).
    /// 0 означает синхронную передачу.
    pub default_mailbox_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusConfig,
    pub logging: LoggingConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            default_mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и переменных окружения
    /// `KINBUS__<СЕКЦИЯ>__<КЛЮЧ>`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::finish(Self::builder()?)
    }

    /// То же, что [`Settings::load`], но сначала читает файл. Переменные
    /// окружения перекрывают значения из файла.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = Self::builder()?.add_source(File::from(path.as_ref()).required(true));
        Self::finish(builder)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.command_capacity == 0 {
            return Err(ConfigError::Message(
                "bus.command_capacity must be at least 1".to_string(),
            ));
        }
        self.logging
            .validate()
            .map_err(|e| ConfigError::Message(format!("logging: {e}")))
    }

    fn builder() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = Self::default();
        Config::builder()
            // Добавляем значения по умолчанию
            .set_default("bus.command_capacity", defaults.bus.command_capacity as u64)?
            .set_default(
                "bus.default_mailbox_capacity",
                defaults.bus.default_mailbox_capacity as u64,
            )?
            .set_default("logging.level", defaults.logging.level)
    }

    fn finish(
        builder: ConfigBuilder<config::builder::DefaultState>
    ) -> Result<Self, ConfigError> {
        let settings: Settings = builder
            // Переменные окружения с префиксом KINBUS__
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bus.command_capacity, DEFAULT_COMMAND_CAPACITY);
        assert_eq!(settings.bus.default_mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
    }

    #[test]
    fn test_zero_command_capacity_rejected() {
        let settings = Settings {
            bus: BusConfig {
                command_capacity: 0,
                default_mailbox_capacity: 0,
            },
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("command_capacity"));
    }

    #[test]
    fn test_zero_mailbox_capacity_allowed() {
        let settings = Settings {
            bus: BusConfig {
                command_capacity: 1,
                default_mailbox_capacity: 0,
            },
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
    }
}
