//! Notification dispatcher — routes a notification to the first registered
//! sender that supports its channel.

use crate::sender::NotificationSender;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::types::{Channel, Notification};
use std::sync::Arc;
use tracing::{error, info};

/// Ordered sender collection, resolved by linear scan.
#[derive(Clone, Default)]
pub struct Dispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl Dispatcher {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        info!(
            senders = ?senders.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Dispatcher initialized"
        );
        Self { senders }
    }

    /// Append a sender. Registration order is resolution order.
    pub fn register(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.senders.push(sender);
        self
    }

    pub fn sender_for(&self, channel: Channel) -> Option<&Arc<dyn NotificationSender>> {
        self.senders.iter().find(|s| s.supports(channel))
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.sender_for(channel).is_some()
    }

    /// Send through the matching sender. A channel with no sender is a
    /// configuration error.
    pub async fn dispatch(&self, notification: &Notification) -> NotifyResult<()> {
        let channel = notification.channel;

        let Some(sender) = self.sender_for(channel) else {
            error!(
                notification_id = %notification.id,
                channel = %channel,
                "No sender registered for channel"
            );
            metrics::counter!("dispatch.no_sender", "channel" => channel.as_str()).increment(1);
            return Err(NotifyError::NoSender(channel));
        };

        info!(
            notification_id = %notification.id,
            channel = %channel,
            sender = sender.name(),
            "Dispatching notification"
        );

        let start = std::time::Instant::now();
        let result = sender.send(notification).await;
        metrics::histogram!("dispatch.latency_ms", "channel" => channel.as_str())
            .record(start.elapsed().as_millis() as f64);

        match &result {
            Ok(()) => {
                metrics::counter!("dispatch.sent", "channel" => channel.as_str()).increment(1)
            }
            Err(_) => {
                metrics::counter!("dispatch.failed", "channel" => channel.as_str()).increment(1)
            }
        }
        result
    }
}
