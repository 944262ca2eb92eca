//! Lease-based mutual exclusion contract.

use crate::error::NotifyResult;
use crate::types::NotificationId;
use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

/// Proof of ownership returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keyed exclusive locks with a bounded lease.
///
/// `try_acquire` never waits: it returns `None` when another holder owns a
/// live lease. A lease that outlives its TTL may be taken over, which is how a
/// crashed holder's lock is reclaimed.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> NotifyResult<Option<LockToken>>;

    /// Release `key` if `token` still owns it; otherwise a no-op.
    async fn release(&self, key: &str, token: &LockToken) -> NotifyResult<()>;
}

/// Lock key guarding one notification's send attempt.
pub fn notification_lock_key(id: NotificationId) -> String {
    format!("notification:{id}")
}
