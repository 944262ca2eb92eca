//! Keyed lease table for single-process deployments.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notify_core::error::NotifyResult;
use notify_core::lock::{LockManager, LockToken};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

struct Lease {
    token: LockToken,
    expires_at: Instant,
}

/// In-process `LockManager`. An expired lease may be taken over by the next
/// caller, which reclaims locks of tasks that panicked or were aborted.
#[derive(Clone, Default)]
pub struct LocalLockManager {
    leases: Arc<DashMap<String, Lease>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.leases
            .get(key)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }

    /// Remove expired leases. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| lease.expires_at > now);
        before - self.leases.len()
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> NotifyResult<Option<LockToken>> {
        let now = Instant::now();
        let token = LockToken::generate();
        let lease = Lease {
            token: token.clone(),
            expires_at: now + ttl,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(lease);
                Ok(Some(token))
            }
            Entry::Occupied(mut slot) => {
                if slot.get().expires_at > now {
                    return Ok(None);
                }
                warn!(key = %key, "Taking over expired lock lease");
                metrics::counter!("lock.lease_takeovers").increment(1);
                slot.insert(lease);
                Ok(Some(token))
            }
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> NotifyResult<()> {
        self.leases.remove_if(key, |_, lease| lease.token == *token);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_exclusive_until_released() {
        let locks = LocalLockManager::new();
        let token = locks.try_acquire("notification:1", TTL).await.unwrap().unwrap();

        assert!(locks.try_acquire("notification:1", TTL).await.unwrap().is_none());
        assert!(locks.try_acquire("notification:2", TTL).await.unwrap().is_some());

        locks.release("notification:1", &token).await.unwrap();
        assert!(!locks.is_held("notification:1"));
        assert!(locks.try_acquire("notification:1", TTL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_token_cannot_release() {
        let locks = LocalLockManager::new();
        let stale = locks
            .try_acquire("k", Duration::from_millis(0))
            .await
            .unwrap()
            .unwrap();

        // Expired lease is taken over by a new holder.
        let current = locks.try_acquire("k", TTL).await.unwrap().unwrap();
        assert_ne!(stale, current);

        locks.release("k", &stale).await.unwrap();
        assert!(locks.is_held("k"));

        locks.release("k", &current).await.unwrap();
        assert!(!locks.is_held("k"));
    }

    #[tokio::test]
    async fn test_evict_expired() {
        let locks = LocalLockManager::new();
        locks.try_acquire("a", Duration::from_millis(0)).await.unwrap();
        locks.try_acquire("b", TTL).await.unwrap();
        assert_eq!(locks.evict_expired(), 1);
    }
}
