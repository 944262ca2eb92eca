//! Creation and approval of notifications by upstream producers.

use crate::state_machine::{NotificationStateMachine, Transition, TransitionOutcome};
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::queue::JobQueue;
use notify_core::store::NotificationStore;
use notify_core::types::{Channel, Notification, NotificationId, NotificationState, SendJob};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Producer input for a new notification.
#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub channel: Channel,
    pub recipient: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NewNotification {
    pub fn new(channel: Channel, recipient: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel,
            recipient: recipient.into(),
            subject: None,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn validate(&self) -> NotifyResult<()> {
        if self.recipient.trim().is_empty() {
            return Err(NotifyError::Validation("recipient is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(NotifyError::Validation("message is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApproveOutcome {
    Approved(Notification),
    NotPermitted(NotificationState),
}

pub struct Submitter {
    store: Arc<dyn NotificationStore>,
    queue: Arc<dyn JobQueue>,
    state_machine: NotificationStateMachine,
}

impl Submitter {
    pub fn new(store: Arc<dyn NotificationStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            store,
            queue,
            state_machine: NotificationStateMachine::new(),
        }
    }

    /// Persist a new draft. With `auto_approve` it is approved and a send job
    /// enqueued straight away.
    pub async fn submit(&self, new: NewNotification, auto_approve: bool) -> NotifyResult<Notification> {
        new.validate()?;

        let mut notification = Notification::new(new.channel, new.recipient, new.message);
        notification.subject = new.subject;
        notification.metadata = new.metadata;
        self.store.save(&notification).await?;

        info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            "Notification created"
        );
        metrics::counter!("submission.created", "channel" => notification.channel.as_str())
            .increment(1);

        if auto_approve {
            let _ = self
                .state_machine
                .apply(&mut notification, Transition::Approve);
            self.store.save(&notification).await?;
            self.queue.enqueue(SendJob::new(notification.id)).await?;
        }
        Ok(notification)
    }

    /// Approve an existing draft and enqueue it for sending.
    pub async fn approve(&self, id: NotificationId) -> NotifyResult<ApproveOutcome> {
        let mut notification = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(NotifyError::NotFound(id))?;

        match self.state_machine.apply(&mut notification, Transition::Approve) {
            TransitionOutcome::Applied { .. } => {
                self.store.save(&notification).await?;
                self.queue.enqueue(SendJob::new(id)).await?;
                Ok(ApproveOutcome::Approved(notification))
            }
            TransitionOutcome::NotPermitted { state } => Ok(ApproveOutcome::NotPermitted(state)),
        }
    }
}
