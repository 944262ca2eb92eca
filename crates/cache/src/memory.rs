//! In-process notification store backed by DashMap for lock-free concurrent access.

use async_trait::async_trait;
use dashmap::DashMap;
use notify_core::error::NotifyResult;
use notify_core::store::NotificationStore;
use notify_core::types::{Notification, NotificationId, NotificationState, NotificationStats};
use std::sync::Arc;

/// Single-process store. Every read reflects the latest `save`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<NotificationId, Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn newest_first(mut items: Vec<Notification>) -> Vec<Notification> {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn find_by_id(&self, id: NotificationId) -> NotifyResult<Option<Notification>> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn find_by_state(&self, state: NotificationState) -> NotifyResult<Vec<Notification>> {
        let matching = self
            .records
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.value().clone())
            .collect();
        Ok(Self::newest_first(matching))
    }

    async fn save(&self, notification: &Notification) -> NotifyResult<()> {
        self.records.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> NotifyResult<Vec<Notification>> {
        let all = self.records.iter().map(|r| r.value().clone()).collect();
        let mut sorted = Self::newest_first(all);
        sorted.truncate(limit);
        Ok(sorted)
    }

    async fn stats(&self) -> NotifyResult<NotificationStats> {
        let snapshot: Vec<Notification> = self.records.iter().map(|r| r.value().clone()).collect();
        Ok(NotificationStats::tally(&snapshot))
    }
}
