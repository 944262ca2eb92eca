//! Notification event bus — typed observer for analytics and logging.
//!
//! The dispatch pipeline accepts an `Arc<dyn EventSink>` and emits one event
//! synchronously after each terminal state has been persisted.

use crate::types::{Channel, NotificationId};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Events emitted for external analytics collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    Sent {
        id: NotificationId,
        channel: Channel,
        duration_seconds: f64,
    },
    Failed {
        id: NotificationId,
        channel: Channel,
        error: String,
        retry_count: u32,
    },
}

impl NotificationEvent {
    pub fn id(&self) -> NotificationId {
        match self {
            Self::Sent { id, .. } | Self::Failed { id, .. } => *id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Trait for receiving notification events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NotificationEvent);
}

/// No-op sink for tests and wiring that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: NotificationEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn failures(&self) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.is_failure())
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: NotificationEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Analytics sink: structured log line plus delivery metrics per event.
pub struct AnalyticsLogSink;

impl EventSink for AnalyticsLogSink {
    fn emit(&self, event: NotificationEvent) {
        match &event {
            NotificationEvent::Sent {
                id,
                channel,
                duration_seconds,
            } => {
                info!(
                    notification_id = %id,
                    channel = %channel,
                    duration_seconds = duration_seconds,
                    "[analytics] notification sent"
                );
                metrics::histogram!(
                    "notification.delivery_seconds",
                    "channel" => channel.as_str()
                )
                .record(*duration_seconds);
            }
            NotificationEvent::Failed {
                id,
                channel,
                error,
                retry_count,
            } => {
                error!(
                    notification_id = %id,
                    channel = %channel,
                    error = %error,
                    retry_count = retry_count,
                    "[analytics] notification failed"
                );
                metrics::counter!(
                    "notification.failures",
                    "channel" => channel.as_str()
                )
                .increment(1);
            }
        }
    }
}

/// Convenience: create a no-op event bus.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
