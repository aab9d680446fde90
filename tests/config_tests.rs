use std::{env, io::Write};

use kinbus::{LogFormat, Settings};
use serial_test::serial;

const VARS: &[&str] = &[
    "KINBUS__BUS__COMMAND_CAPACITY",
    "KINBUS__BUS__DEFAULT_MAILBOX_CAPACITY",
    "KINBUS__LOGGING__LEVEL",
    "KINBUS__LOGGING__FORMAT",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Тест проверяет значения по умолчанию без файла и окружения.
#[test]
#[serial]
fn test_load_defaults() {
    clear_env();
    let settings = Settings::load().unwrap();
    assert_eq!(settings, Settings::default());
}

/// Тест проверяет переопределение через переменные окружения.
#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    env::set_var("KINBUS__BUS__DEFAULT_MAILBOX_CAPACITY", "32");
    env::set_var("KINBUS__LOGGING__LEVEL", "debug");

    let settings = Settings::load();
    clear_env();
    let settings = settings.unwrap();

    assert_eq!(settings.bus.default_mailbox_capacity, 32);
    assert_eq!(settings.logging.level, "debug");
}

/// Тест проверяет чтение файла и приоритет окружения над ним.
#[test]
#[serial]
fn test_file_then_env() {
    clear_env();
    let file = write_config(
        r#"
[bus]
command_capacity = 8
default_mailbox_capacity = 2

[logging]
format = "json"
"#,
    );
    env::set_var("KINBUS__BUS__COMMAND_CAPACITY", "16");

    let settings = Settings::load_from(file.path());
    clear_env();
    let settings = settings.unwrap();

    assert_eq!(settings.bus.command_capacity, 16);
    assert_eq!(settings.bus.default_mailbox_capacity, 2);
    assert_eq!(settings.logging.format, LogFormat::Json);
}

/// Тест проверяет, что нулевая ёмкость очереди команд отклоняется.
#[test]
#[serial]
fn test_zero_command_capacity_rejected() {
    clear_env();
    let file = write_config("[bus]\ncommand_capacity = 0\n");

    let err = Settings::load_from(file.path()).unwrap_err();
    assert!(err.to_string().contains("command_capacity"));
}

#[test]
#[serial]
fn test_missing_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(Settings::load_from(dir.path().join("absent.toml")).is_err());
}

/// Тест проверяет, что шина использует ёмкость ящика из конфигурации.
#[tokio::test]
#[serial]
async fn test_open_endpoint_uses_configured_capacity() {
    clear_env();
    let file = write_config("[bus]\ndefault_mailbox_capacity = 3\n");
    let settings = Settings::load_from(file.path()).unwrap();

    let bus = kinbus::Bus::with_config(settings.bus);
    let endpoint = bus.open_endpoint().await.unwrap();
    assert_eq!(endpoint.capacity(), 3);
}
