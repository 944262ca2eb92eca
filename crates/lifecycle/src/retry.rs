//! Retry sweep — periodically re-admits failed notifications that still have
//! retries left.

use crate::state_machine::{NotificationStateMachine, Transition};
use notify_core::error::NotifyResult;
use notify_core::queue::JobQueue;
use notify_core::store::NotificationStore;
use notify_core::types::{NotificationState, SendJob, NON_RETRYABLE_KEY};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Shortest schedule period; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct RetrySweep {
    store: Arc<dyn NotificationStore>,
    queue: Arc<dyn JobQueue>,
    state_machine: NotificationStateMachine,
}

impl RetrySweep {
    pub fn new(store: Arc<dyn NotificationStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            store,
            queue,
            state_machine: NotificationStateMachine::new(),
        }
    }

    pub fn with_state_machine(mut self, state_machine: NotificationStateMachine) -> Self {
        self.state_machine = state_machine;
        self
    }

    /// One level-triggered pass over `failed`. Returns how many notifications
    /// were re-admitted.
    pub async fn run(&self) -> NotifyResult<usize> {
        let failed = self.store.find_by_state(NotificationState::Failed).await?;
        let max_retries = self.state_machine.max_retries();
        let mut readmitted = 0;

        for mut notification in failed {
            if notification.retry_count >= max_retries {
                debug!(
                    notification_id = %notification.id,
                    retry_count = notification.retry_count,
                    "Retries exhausted"
                );
                continue;
            }
            if notification.metadata_flag(NON_RETRYABLE_KEY) {
                debug!(notification_id = %notification.id, "Skipping non-retryable failure");
                continue;
            }
            if !self.state_machine.can(&notification, Transition::Retry) {
                continue;
            }

            let _ = self.state_machine.apply(&mut notification, Transition::Retry);
            self.store.save(&notification).await?;
            self.queue.enqueue(SendJob::new(notification.id)).await?;
            readmitted += 1;
        }

        metrics::counter!("retry.readmitted").increment(readmitted as u64);
        info!(readmitted, "Retry sweep complete");
        Ok(readmitted)
    }

    /// Run the sweep on a fixed interval until the task is aborted.
    pub fn spawn_schedule(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.run().await {
                    error!(error = %e, "Retry sweep failed");
                }
            }
        })
    }
}
