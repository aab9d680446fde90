use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок шины.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки таблицы подписок
/// - 4xxx: Противодавление (backpressure)
/// - 6xxx: Жизненный цикл акторов и очередей
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    InvariantViolation = 1005,

    // === 2xxx: Таблица подписок ===
    NotFound = 2000,
    AlreadyExists = 2001,
    NoSubscribers = 2002,

    // === 4xxx: Противодавление ===
    MailboxFull = 4000,

    // === 6xxx: Жизненный цикл ===
    ChannelClosed = 6000,
    Timeout = 6001,
    BusClosed = 6002,
    ActorStopped = 6003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    ///
    /// Возвращает `None`, если значение не соответствует ни одному варианту.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка вызывающей стороны: неверный аргумент или состояние подписки.
    pub fn is_client_error(&self) -> bool {
        let c = self.code();
        if (2000..=4999).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Нарушен внутренний инвариант: продолжать работу с объектом нельзя.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Internal | Self::InvariantViolation | Self::Unexpected
        )
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::AlreadyExists | Self::NoSubscribers => LogLevel::Debug,
            Self::InvalidArgs | Self::ChannelClosed | Self::BusClosed => LogLevel::Info,
            Self::MailboxFull | Self::Timeout | Self::ActorStopped => LogLevel::Warn,
            Self::Internal | Self::InvariantViolation | Self::Unexpected => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
