use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque notification identity, assigned once at construction.
pub type NotificationId = Uuid;

/// Metadata key marking a failure that must never be re-admitted.
pub const NON_RETRYABLE_KEY: &str = "non_retryable";

/// Delivery medium for a notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Chat,
    Sms,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Chat, Channel::Sms, Channel::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Chat => "chat",
            Channel::Sms => "sms",
            Channel::Webhook => "webhook",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "chat" | "slack" => Ok(Channel::Chat),
            "sms" => Ok(Channel::Sms),
            "webhook" => Ok(Channel::Webhook),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

/// Lifecycle states. Every state is a rest state except `Sending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Draft,
    Approved,
    Sending,
    Sent,
    Failed,
}

impl NotificationState {
    pub const ALL: [NotificationState; 5] = [
        NotificationState::Draft,
        NotificationState::Approved,
        NotificationState::Sending,
        NotificationState::Sent,
        NotificationState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationState::Draft => "draft",
            NotificationState::Approved => "approved",
            NotificationState::Sending => "sending",
            NotificationState::Sent => "sent",
            NotificationState::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of outbound communication with a lifecycle and a target channel/recipient.
///
/// `state` is only moved by the lifecycle state machine; timestamps, `retry_count`
/// and `last_error` are only written by the dispatch pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    pub state: NotificationState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Notification {
    /// Create a fresh notification in `draft`.
    pub fn new(channel: Channel, recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            recipient: recipient.into(),
            subject: None,
            message: message.into(),
            state: NotificationState::Draft,
            created_at: Utc::now(),
            sent_at: None,
            failed_at: None,
            retry_count: 0,
            last_error: None,
            metadata: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
    }

    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Record the most recent failure. `retry_count` grows by exactly one.
    pub fn record_failure(&mut self, at: DateTime<Utc>, error: impl Into<String>) {
        self.failed_at = Some(at);
        self.last_error = Some(error.into());
        self.retry_count += 1;
    }

    /// Seconds between creation and successful delivery.
    pub fn delivery_seconds(&self) -> Option<f64> {
        self.sent_at
            .map(|sent| (sent - self.created_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// A reference to a notification to be sent. Carries identity only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendJob {
    pub notification_id: NotificationId,
}

impl SendJob {
    pub fn new(notification_id: NotificationId) -> Self {
        Self { notification_id }
    }
}

/// Counts grouped by state and by channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationStats {
    pub by_state: BTreeMap<String, u64>,
    pub by_channel: BTreeMap<String, u64>,
    pub total: u64,
}

impl NotificationStats {
    /// Build stats from an iterator over notifications.
    pub fn tally<'a>(notifications: impl IntoIterator<Item = &'a Notification>) -> Self {
        let mut stats = Self::default();
        for n in notifications {
            *stats.by_state.entry(n.state.to_string()).or_default() += 1;
            *stats.by_channel.entry(n.channel.to_string()).or_default() += 1;
            stats.total += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_notification_is_draft() {
        let n = Notification::new(Channel::Email, "a@x.com", "hi");
        assert_eq!(n.state, NotificationState::Draft);
        assert_eq!(n.retry_count, 0);
        assert!(n.sent_at.is_none());
        assert!(n.failed_at.is_none());
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("EMAIL".parse::<Channel>(), Ok(Channel::Email));
        assert_eq!("slack".parse::<Channel>(), Ok(Channel::Chat));
        assert!("fax".parse::<Channel>().is_err());
    }

    #[test]
    fn test_record_failure_keeps_latest() {
        let mut n = Notification::new(Channel::Sms, "+15550100", "hi");
        n.record_failure(Utc::now(), "first");
        n.record_failure(Utc::now(), "second");
        assert_eq!(n.retry_count, 2);
        assert_eq!(n.last_error.as_deref(), Some("second"));
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let n = Notification::new(Channel::Webhook, "https://hooks.local/x", "ping");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["channel"], "webhook");
        assert_eq!(json["state"], "draft");
        let back: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn test_stats_tally() {
        let a = Notification::new(Channel::Email, "a", "m");
        let mut b = Notification::new(Channel::Email, "b", "m");
        b.state = NotificationState::Sent;
        let c = Notification::new(Channel::Chat, "c", "m");
        let stats = NotificationStats::tally([&a, &b, &c]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_state["draft"], 2);
        assert_eq!(stats.by_channel["email"], 2);
    }
}
