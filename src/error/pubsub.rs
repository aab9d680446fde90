use std::any::Any;

use kinbus_error::{ErrorExt, LogLevel, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::pubsub::{ChannelId, MessageKind};

pub type BusResult<T> = Result<T, BusError>;

/// Ошибки шины, конечных точек и их акторов.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("endpoint {channel} is already subscribed to message kind {kind}")]
    AlreadySubscribed {
        channel: ChannelId,
        kind: MessageKind,
    },

    #[error("endpoint {channel} is not registered for message kind {kind}")]
    NotRegistered {
        channel: ChannelId,
        kind: MessageKind,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no subscribers for message kind {kind}")]
    NoSubscribers { kind: MessageKind },

    #[error("endpoint {channel} is closed")]
    EndpointClosed { channel: ChannelId },

    #[error("mailbox of endpoint {channel} is closed")]
    MailboxClosed { channel: ChannelId },

    #[error("mailbox of endpoint {channel} is full")]
    MailboxFull { channel: ChannelId },

    #[error("bus is closed")]
    BusClosed,

    #[error("callback router of endpoint {channel} has stopped")]
    RouterStopped { channel: ChannelId },

    /// Локальный учёт подписок конечной точки разошёлся с таблицей шины.
    #[error(
        "subscription bookkeeping of endpoint {channel} diverged from the bus table (kind {kind})"
    )]
    InvariantViolation {
        channel: ChannelId,
        kind: MessageKind,
    },
}

impl BusError {
    /// Пишет ошибку в лог с уровнем, который задаёт её код статуса.
    pub(crate) fn log(
        &self,
        channel: ChannelId,
        context: &'static str,
    ) {
        let tags = self.metrics_tags();
        match self.status_code().log_level() {
            LogLevel::Trace => trace!(%channel, err = %self, ?tags, "{context}"),
            LogLevel::Debug => debug!(%channel, err = %self, ?tags, "{context}"),
            LogLevel::Info => info!(%channel, err = %self, ?tags, "{context}"),
            LogLevel::Warn => warn!(%channel, err = %self, ?tags, "{context}"),
            LogLevel::Error => error!(%channel, err = %self, ?tags, "{context}"),
        }
    }
}

impl ErrorExt for BusError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadySubscribed { .. } => StatusCode::AlreadyExists,
            Self::NotRegistered { .. } => StatusCode::NotFound,
            Self::InvalidArgument(_) => StatusCode::InvalidArgs,
            Self::NoSubscribers { .. } => StatusCode::NoSubscribers,
            Self::EndpointClosed { .. } | Self::MailboxClosed { .. } => StatusCode::ChannelClosed,
            Self::MailboxFull { .. } => StatusCode::MailboxFull,
            Self::BusClosed => StatusCode::BusClosed,
            Self::RouterStopped { .. } => StatusCode::ActorStopped,
            Self::InvariantViolation { .. } => StatusCode::InvariantViolation,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "bus".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::AlreadySubscribed { kind, .. }
            | Self::NotRegistered { kind, .. }
            | Self::NoSubscribers { kind }
            | Self::InvariantViolation { kind, .. } => {
                tags.push(("message_kind", kind.to_string()));
            }
            _ => {}
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_error_display() {
        let err = BusError::AlreadySubscribed {
            channel: ChannelId::new(3),
            kind: MessageKind::new(7),
        };
        assert_eq!(
            err.to_string(),
            "endpoint 3 is already subscribed to message kind 7"
        );
        assert_eq!(
            BusError::NoSubscribers {
                kind: MessageKind::new(1)
            }
            .to_string(),
            "no subscribers for message kind 1"
        );
        assert_eq!(BusError::BusClosed.to_string(), "bus is closed");
    }

    /// Тест проверяет соответствие ошибок кодам статуса.
    #[test]
    fn test_status_codes() {
        let ch = ChannelId::new(1);
        let kind = MessageKind::new(1);
        assert_eq!(
            BusError::NotRegistered { channel: ch, kind }.status_code(),
            StatusCode::NotFound
        );
        assert_eq!(
            BusError::InvalidArgument("msg".into()).status_code(),
            StatusCode::InvalidArgs
        );
        assert_eq!(
            BusError::MailboxFull { channel: ch }.status_code(),
            StatusCode::MailboxFull
        );
        assert_eq!(
            BusError::RouterStopped { channel: ch }.status_code(),
            StatusCode::ActorStopped
        );
    }

    /// Тест проверяет, что фатальным считается только нарушение инварианта.
    #[test]
    fn test_only_invariant_violation_is_fatal() {
        let ch = ChannelId::new(1);
        let kind = MessageKind::new(2);
        assert!(BusError::InvariantViolation { channel: ch, kind }.is_fatal());
        assert!(!BusError::NotRegistered { channel: ch, kind }.is_fatal());
        assert!(!BusError::NoSubscribers { kind }.is_fatal());
        assert!(!BusError::BusClosed.is_fatal());
    }

    /// Тест проверяет уровни логирования, которые выбираются по коду
    /// статуса ошибки.
    #[test]
    fn test_log_levels_follow_status_code() {
        let ch = ChannelId::new(1);
        assert_eq!(
            BusError::MailboxClosed { channel: ch }
                .status_code()
                .log_level(),
            LogLevel::Info
        );
        assert_eq!(
            BusError::RouterStopped { channel: ch }
                .status_code()
                .log_level(),
            LogLevel::Warn
        );
        assert_eq!(
            BusError::InvariantViolation {
                channel: ch,
                kind: MessageKind::new(1)
            }
            .status_code()
            .log_level(),
            LogLevel::Error
        );
        // запись в лог без установленного подписчика не паникует
        BusError::BusClosed.log(ch, "Bus unavailable");
    }

    #[test]
    fn test_metrics_tags_include_kind() {
        let tags = BusError::NoSubscribers {
            kind: MessageKind::new(9),
        }
        .metrics_tags();
        assert!(tags.contains(&("message_kind", "9".to_string())));
        assert!(tags.contains(&("error_type", "bus".to_string())));
    }
}
