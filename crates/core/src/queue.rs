//! Job transport contract.

use crate::error::NotifyResult;
use crate::types::SendJob;
use async_trait::async_trait;

/// Producer side of the send-job transport. Delivery to workers is
/// at-least-once; duplicate jobs are safe.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: SendJob) -> NotifyResult<()>;
}
