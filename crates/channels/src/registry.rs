//! Builds the ordered sender list from configuration.

use crate::backend::{DeliveryBackend, HttpBackend, LogBackend};
use crate::chat::ChatSender;
use crate::email::EmailSender;
use crate::sender::NotificationSender;
use crate::sms::SmsSender;
use crate::webhook::WebhookSender;
use notify_core::config::{ChannelsConfig, RateLimitPolicy, RateLimitsConfig};
use notify_core::error::NotifyResult;
use notify_delivery::RecipientRateLimiter;
use std::sync::Arc;
use std::time::Duration;

fn backend(
    channel: &'static str,
    mock: bool,
    timeout: Duration,
) -> NotifyResult<Arc<dyn DeliveryBackend>> {
    if mock {
        Ok(Arc::new(LogBackend::new(channel)))
    } else {
        Ok(Arc::new(HttpBackend::new(timeout)?))
    }
}

/// Configured senders plus the rate limiters they consume from.
pub struct ChannelSenders {
    pub senders: Vec<Arc<dyn NotificationSender>>,
    pub limiters: Vec<Arc<RecipientRateLimiter>>,
}

impl ChannelSenders {
    /// Drop idle recipients from every limiter. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        self.limiters.iter().map(|l| l.evict_idle()).sum()
    }

    pub fn tracked_recipients(&self) -> usize {
        self.limiters.iter().map(|l| l.tracked_recipients()).sum()
    }
}

/// Senders in fixed order: email, chat, sms, webhook.
pub fn senders_from_config(
    channels: &ChannelsConfig,
    limits: &RateLimitsConfig,
) -> NotifyResult<ChannelSenders> {
    let timeout = Duration::from_secs(channels.webhook.timeout_secs);
    let mut limiters = Vec::new();
    let mut limiter = |channel: &'static str, policy: Option<RateLimitPolicy>| {
        policy.map(|p| {
            let limiter = Arc::new(RecipientRateLimiter::new(channel, p));
            limiters.push(limiter.clone());
            limiter
        })
    };

    let mut email = EmailSender::new(
        channels.email.clone(),
        backend("email", channels.email.mock, timeout)?,
    );
    if let Some(l) = limiter("email", limits.email) {
        email = email.with_rate_limiter(l);
    }

    let mut chat = ChatSender::new(
        channels.chat.clone(),
        backend("chat", channels.chat.mock, timeout)?,
    );
    if let Some(l) = limiter("chat", limits.chat) {
        chat = chat.with_rate_limiter(l);
    }

    let mut sms = SmsSender::new(
        channels.sms.clone(),
        backend("sms", channels.sms.mock, timeout)?,
    );
    if let Some(l) = limiter("sms", limits.sms) {
        sms = sms.with_rate_limiter(l);
    }

    let mut webhook = WebhookSender::new(backend("webhook", channels.webhook.mock, timeout)?);
    if let Some(l) = limiter("webhook", limits.webhook) {
        webhook = webhook.with_rate_limiter(l);
    }

    Ok(ChannelSenders {
        senders: vec![
            Arc::new(email),
            Arc::new(chat),
            Arc::new(sms),
            Arc::new(webhook),
        ],
        limiters,
    })
}
