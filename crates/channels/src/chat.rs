//! Chat sender posting to an incoming-webhook style chat API.

use crate::backend::DeliveryBackend;
use crate::sender::{consume_rate_limit, resolve_endpoint, NotificationSender};
use async_trait::async_trait;
use notify_core::config::ChatChannelConfig;
use notify_core::error::NotifyResult;
use notify_core::types::{Channel, Notification};
use notify_delivery::RecipientRateLimiter;
use std::sync::Arc;
use tracing::debug;

pub struct ChatSender {
    config: ChatChannelConfig,
    limiter: Option<Arc<RecipientRateLimiter>>,
    backend: Arc<dyn DeliveryBackend>,
}

impl ChatSender {
    pub fn new(config: ChatChannelConfig, backend: Arc<dyn DeliveryBackend>) -> Self {
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
}

#[async_trait]
impl NotificationSender for ChatSender {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Chat
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<()> {
        let target = resolve_endpoint(
            Channel::Chat,
            self.config.webhook_url.as_deref(),
            self.config.mock,
            "mock://chat",
        )?;
        // Keyed by the chat room / channel the message is posted to.
        consume_rate_limit(self.limiter.as_deref(), &notification.recipient)?;

        debug!(
            notification_id = %notification.id,
            room = %notification.recipient,
            "Sending chat notification"
        );

        let payload = serde_json::json!({
            "channel": notification.recipient,
            "text": notification.message,
            "username": self.config.username,
        });
        self.backend.deliver(target, &payload).await?;

        metrics::counter!("sender.delivered", "channel" => "chat").increment(1);
        Ok(())
    }
}
