//! In-process job transport: an unbounded channel shared by all workers on
//! this node.

use async_trait::async_trait;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::queue::JobQueue;
use notify_core::types::SendJob;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct LocalJobQueue {
    tx: mpsc::UnboundedSender<SendJob>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<SendJob>>>,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next job. Workers take turns on the shared receiver.
    pub async fn next(&self) -> Option<SendJob> {
        self.rx.lock().await.recv().await
    }

    /// Take a job if one is ready, without waiting.
    pub async fn try_next(&self) -> Option<SendJob> {
        self.rx.lock().await.try_recv().ok()
    }
}

impl Default for LocalJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue(&self, job: SendJob) -> NotifyResult<()> {
        debug!(notification_id = %job.notification_id, "Enqueue send job");
        self.tx
            .send(job)
            .map_err(|_| NotifyError::Queue("local job queue closed".into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use notify_core::types::{Channel, Notification};

    #[tokio::test]
    async fn test_fifo_and_try_next() {
        let queue = LocalJobQueue::new();
        assert!(queue.try_next().await.is_none());

        let a = SendJob::new(Notification::new(Channel::Email, "a@x.com", "1").id);
        let b = SendJob::new(Notification::new(Channel::Email, "b@x.com", "2").id);
        queue.enqueue(a).await.unwrap();
        queue.clone().enqueue(b).await.unwrap();

        assert_eq!(queue.next().await, Some(a));
        assert_eq!(queue.try_next().await, Some(b));
        assert!(queue.try_next().await.is_none());
    }
}
