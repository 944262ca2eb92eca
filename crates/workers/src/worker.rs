//! Send worker — a Tokio task that pulls send jobs from the transport and
//! runs each through the send pipeline.

use crate::local::LocalJobQueue;
use notify_core::types::SendJob;
use notify_lifecycle::{SendOutcome, SendPipeline};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SendWorker {
    pub worker_id: String,
    pipeline: Arc<SendPipeline>,
}

impl SendWorker {
    pub fn new(worker_id: impl Into<String>, pipeline: Arc<SendPipeline>) -> Self {
        Self {
            worker_id: worker_id.into(),
            pipeline,
        }
    }

    /// Process one job. Failures are already recorded on the notification, so
    /// here they are only classified for operators.
    pub async fn handle(&self, job: SendJob) {
        let id = job.notification_id;
        match self.pipeline.process_send(id).await {
            Ok(SendOutcome::Sent) => {
                debug!(worker_id = %self.worker_id, notification_id = %id, "Job complete");
            }
            Ok(outcome) => {
                debug!(worker_id = %self.worker_id, notification_id = %id, ?outcome, "Job dropped");
            }
            Err(e) if e.is_fatal() => {
                error!(
                    worker_id = %self.worker_id,
                    notification_id = %id,
                    error = %e,
                    "Send job failed with a configuration error"
                );
                metrics::counter!("worker.fatal_errors").increment(1);
            }
            Err(e) => {
                warn!(
                    worker_id = %self.worker_id,
                    notification_id = %id,
                    error = %e,
                    "Send job failed"
                );
                metrics::counter!("worker.failed_jobs").increment(1);
            }
        }
    }

    /// Run every job already queued, then return how many were handled.
    pub async fn drain(&self, queue: &LocalJobQueue) -> usize {
        let mut handled = 0;
        while let Some(job) = queue.try_next().await {
            self.handle(job).await;
            handled += 1;
        }
        handled
    }

    /// Spawn this worker against the in-process queue.
    pub fn spawn_local(self, queue: LocalJobQueue) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(worker_id = %self.worker_id, "Worker started on local queue");
            while let Some(job) = queue.next().await {
                self.handle(job).await;
            }
            warn!(worker_id = %self.worker_id, "Local job queue closed");
        })
    }

    /// Spawn this worker as a member of a NATS queue group.
    pub fn spawn_nats(
        self,
        nats_client: async_nats::Client,
        subject: String,
        queue_group: String,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                worker_id = %self.worker_id,
                subject = %subject,
                queue_group = %queue_group,
                "Worker started, subscribing to NATS queue"
            );

            let subscriber = match nats_client.queue_subscribe(subject, queue_group).await {
                Ok(sub) => sub,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Failed to subscribe to NATS");
                    return;
                }
            };

            self.process_messages(subscriber).await;
        })
    }

    async fn process_messages(self, mut subscriber: async_nats::Subscriber) {
        while let Some(msg) = subscriber.next().await {
            let job: SendJob = match serde_json::from_slice(&msg.payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!(
                        worker_id = %self.worker_id,
                        error = %e,
                        "Failed to deserialize send job"
                    );
                    metrics::counter!("worker.deserialize_errors").increment(1);
                    continue;
                }
            };
            self.handle(job).await;
        }

        warn!(worker_id = %self.worker_id, "NATS subscription ended");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use notify_cache::{LocalLockManager, MemoryStore};
    use notify_channels::{Dispatcher, LogBackend, WebhookSender};
    use notify_core::event_bus::noop_sink;
    use notify_core::queue::JobQueue;
    use notify_core::store::NotificationStore;
    use notify_core::types::{Channel, Notification, NotificationState};
    use std::time::Duration;

    fn worker(store: &MemoryStore) -> SendWorker {
        let sender = WebhookSender::new(Arc::new(LogBackend::new("webhook")));
        let pipeline = SendPipeline::new(
            Arc::new(store.clone()),
            Dispatcher::new(vec![Arc::new(sender)]),
            Arc::new(LocalLockManager::new()),
            noop_sink(),
        );
        SendWorker::new("test-worker-00", Arc::new(pipeline))
    }

    async fn approved(store: &MemoryStore, channel: Channel) -> Notification {
        let mut n = Notification::new(channel, "https://hooks.example.com/in", "hi");
        n.state = NotificationState::Approved;
        store.save(&n).await.unwrap();
        n
    }

    #[tokio::test]
    async fn test_drain_handles_every_job() {
        let store = MemoryStore::new();
        let queue = LocalJobQueue::new();
        let ok = approved(&store, Channel::Webhook).await;
        let unroutable = approved(&store, Channel::Sms).await;
        queue.enqueue(SendJob::new(ok.id)).await.unwrap();
        queue.enqueue(SendJob::new(unroutable.id)).await.unwrap();

        assert_eq!(worker(&store).drain(&queue).await, 2);

        let sent = store.find_by_id(ok.id).await.unwrap().unwrap();
        assert_eq!(sent.state, NotificationState::Sent);
        let failed = store.find_by_id(unroutable.id).await.unwrap().unwrap();
        assert_eq!(failed.state, NotificationState::Failed);
    }

    #[tokio::test]
    async fn test_spawned_worker_consumes_queue() {
        let store = MemoryStore::new();
        let queue = LocalJobQueue::new();
        let handle = worker(&store).spawn_local(queue.clone());

        let n = approved(&store, Channel::Webhook).await;
        queue.enqueue(SendJob::new(n.id)).await.unwrap();

        let mut state = NotificationState::Approved;
        for _ in 0..100 {
            state = store.find_by_id(n.id).await.unwrap().unwrap().state;
            if state == NotificationState::Sent {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(state, NotificationState::Sent);
    }
}
