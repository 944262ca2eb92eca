//! Durable notification store contract.

use crate::error::NotifyResult;
use crate::types::{Notification, NotificationId, NotificationState, NotificationStats};
use async_trait::async_trait;

/// Persistence for notification records. Implementations must give
/// read-after-write consistency within a single process.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn find_by_id(&self, id: NotificationId) -> NotifyResult<Option<Notification>>;

    /// All notifications currently in `state`, newest first.
    async fn find_by_state(&self, state: NotificationState) -> NotifyResult<Vec<Notification>>;

    /// Insert or overwrite the record with the same id.
    async fn save(&self, notification: &Notification) -> NotifyResult<()>;

    /// The `limit` most recently created notifications, newest first.
    async fn recent(&self, limit: usize) -> NotifyResult<Vec<Notification>>;

    async fn stats(&self) -> NotifyResult<NotificationStats>;
}
