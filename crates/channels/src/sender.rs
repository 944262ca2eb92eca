use async_trait::async_trait;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::types::{Channel, Notification};
use notify_delivery::{RateLimitDecision, RecipientRateLimiter};

/// Delivery capability for one channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn supports(&self, channel: Channel) -> bool;

    /// Deliver the notification. Any error is a failed attempt.
    async fn send(&self, notification: &Notification) -> NotifyResult<()>;
}

/// Consume one unit for the recipient, turning a rejection into a retryable error.
pub(crate) fn consume_rate_limit(
    limiter: Option<&RecipientRateLimiter>,
    recipient: &str,
) -> NotifyResult<()> {
    let Some(limiter) = limiter else {
        return Ok(());
    };
    match limiter.consume(recipient) {
        RateLimitDecision::Accepted { .. } => Ok(()),
        rejected @ RateLimitDecision::Rejected { .. } => Err(NotifyError::RateLimited {
            recipient: recipient.to_string(),
            retry_after_secs: rejected.retry_after_secs(),
        }),
    }
}

/// Endpoint for a live send. Mock senders fall back to `mock_target`;
/// live senders without a configured endpoint fail with a non-retryable
/// configuration error.
pub(crate) fn resolve_endpoint<'a>(
    channel: Channel,
    configured: Option<&'a str>,
    mock: bool,
    mock_target: &'a str,
) -> NotifyResult<&'a str> {
    match (configured, mock) {
        (Some(url), _) => Ok(url),
        (None, true) => Ok(mock_target),
        (None, false) => Err(NotifyError::Config(format!(
            "{channel} endpoint is required when mock is false"
        ))),
    }
}
