use crate::types::{Channel, NotificationId};
use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid notification: {0}")]
    Validation(String),

    #[error("Notification {0} not found")]
    NotFound(NotificationId),

    #[error("No sender found for channel: {0}")]
    NoSender(Channel),

    #[error("Rate limit exceeded for {recipient}. Retry after {retry_after_secs} seconds.")]
    RateLimited {
        recipient: String,
        retry_after_secs: u64,
    },

    /// Channel-level delivery failure; the message is the sender's own description.
    #[error("{0}")]
    Delivery(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NotifyError {
    /// Failures that are recorded on the notification and may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Delivery(_))
    }

    /// Deployment misconfiguration. Never retried, surfaced to operators.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoSender(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_message_is_verbatim() {
        let err = NotifyError::Delivery("timeout".into());
        assert_eq!(err.to_string(), "timeout");
        assert!(err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_classification() {
        let limited = NotifyError::RateLimited {
            recipient: "a@x.com".into(),
            retry_after_secs: 42,
        };
        assert!(limited.is_retryable());
        assert!(limited.to_string().contains("Retry after 42 seconds"));

        let fatal = NotifyError::NoSender(Channel::Sms);
        assert!(fatal.is_fatal());
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.to_string(), "No sender found for channel: sms");
    }
}
