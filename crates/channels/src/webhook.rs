//! Generic webhook sender. The recipient is the URL to POST to.

use crate::backend::DeliveryBackend;
use crate::sender::{consume_rate_limit, NotificationSender};
use async_trait::async_trait;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::types::{Channel, Notification};
use notify_delivery::RecipientRateLimiter;
use std::sync::Arc;
use tracing::debug;

pub struct WebhookSender {
    limiter: Option<Arc<RecipientRateLimiter>>,
    backend: Arc<dyn DeliveryBackend>,
}

impl WebhookSender {
    pub fn new(backend: Arc<dyn DeliveryBackend>) -> Self {
        Self {
            limiter: None,
            backend,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RecipientRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    fn build_payload(n: &Notification) -> serde_json::Value {
        serde_json::json!({
            "id": n.id,
            "channel": n.channel,
            "message": n.message,
            "timestamp": n.created_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Webhook
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<()> {
        let url = notification.recipient.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Delivery(format!(
                "webhook recipient '{url}' is not an http(s) url"
            )));
        }

        consume_rate_limit(self.limiter.as_deref(), url)?;

        debug!(notification_id = %notification.id, url = %url, "Calling webhook");
        self.backend
            .deliver(url, &Self::build_payload(notification))
            .await?;

        metrics::counter!("sender.delivered", "channel" => "webhook").increment(1);
        Ok(())
    }
}
