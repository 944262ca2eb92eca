//! SMS sender: telephony provider payload with segment accounting.

use crate::backend::DeliveryBackend;
use crate::sender::{consume_rate_limit, resolve_endpoint, NotificationSender};
use async_trait::async_trait;
use notify_core::config::SmsChannelConfig;
use notify_core::error::NotifyResult;
use notify_core::types::{Channel, Notification};
use notify_delivery::RecipientRateLimiter;
use std::sync::Arc;
use tracing::debug;

const GSM_SEGMENT_LEN: usize = 160;
const GSM_CONCAT_SEGMENT_LEN: usize = 153;

pub struct SmsSender {
    config: SmsChannelConfig,
    limiter: Option<Arc<RecipientRateLimiter>>,
    backend: Arc<dyn DeliveryBackend>,
}

impl SmsSender {
    pub fn new(config: SmsChannelConfig, backend: Arc<dyn DeliveryBackend>) -> Self {
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

    /// Number of SMS segments the body will be billed as.
    pub fn segments(body: &str) -> u32 {
        let len = body.chars().count();
        if len <= GSM_SEGMENT_LEN {
            1
        } else {
            len.div_ceil(GSM_CONCAT_SEGMENT_LEN) as u32
        }
    }
}

#[async_trait]
impl NotificationSender for SmsSender {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Sms
    }

    async fn send(&self, notification: &Notification) -> NotifyResult<()> {
        let target = resolve_endpoint(
            Channel::Sms,
            self.config.api_url.as_deref(),
            self.config.mock,
            &notification.recipient,
        )?;
        consume_rate_limit(self.limiter.as_deref(), &notification.recipient)?;

        let segments = Self::segments(&notification.message);
        debug!(
            notification_id = %notification.id,
            to = %notification.recipient,
            segments = segments,
            "Sending SMS notification"
        );

        let payload = serde_json::json!({
            "to": notification.recipient,
            "from": self.config.from_number,
            "body": notification.message,
        });
        self.backend.deliver(target, &payload).await?;

        metrics::counter!("sender.delivered", "channel" => "sms").increment(1);
        metrics::counter!("sms.segments").increment(segments as u64);
        Ok(())
    }
}
