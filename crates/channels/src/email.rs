//! Email sender with per-recipient rate limiting.
//!
//! Builds a mail-API payload (from, to, subject, text and HTML parts) and
//! hands it to the configured backend.

use crate::backend::DeliveryBackend;
use crate::sender::{consume_rate_limit, resolve_endpoint, NotificationSender};
use async_trait::async_trait;
use notify_core::config::EmailChannelConfig;
use notify_core::error::NotifyResult;
use notify_core::types::{Channel, Notification};
use notify_delivery::RecipientRateLimiter;
use std::sync::Arc;
use tracing::{debug, info};

pub struct EmailSender {
    config: EmailChannelConfig,
    limiter: Option<Arc<RecipientRateLimiter>>,
    backend: Arc<dyn DeliveryBackend>,
}

impl EmailSender {
    pub fn new(config: EmailChannelConfig, backend: Arc<dyn DeliveryBackend>) -> Self {
        info!(
            from = %config.from_address,
            mock = config.mock,
            "Email sender initialized"
        );
        Self {
            config,
            limiter: None,
            backend,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RecipientRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn build_payload(&self, n: &Notification) -> serde_json::Value {
        let subject = n
            .subject
            .as_deref()
            .unwrap_or(&self.config.default_subject);
        serde_json::json!({
            "from": {
                "email": self.config.from_address,
                "name": self.config.from_name
            },
            "to": [{ "email": n.recipient }],
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": n.message },
                { "type": "text/html", "value": format!("<p>{}</p>", n.message) }
            ],
            "custom_args": { "notification_id": n.id.to_string() }
        })
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Email
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<()> {
        let target = resolve_endpoint(
            Channel::Email,
            self.config.api_url.as_deref(),
            self.config.mock,
            &notification.recipient,
        )?;
        consume_rate_limit(self.limiter.as_deref(), &notification.recipient)?;

        debug!(
            notification_id = %notification.id,
            to = %notification.recipient,
            "Sending email notification"
        );

        let payload = self.build_payload(notification);
        self.backend.deliver(target, &payload).await?;

        metrics::counter!("sender.delivered", "channel" => "email").increment(1);
        Ok(())
    }
}
