//! Send pipeline — drives one send attempt for a notification id to `sent`
//! or `failed` under a per-id lease lock.

use crate::state_machine::{NotificationStateMachine, Transition};
use chrono::Utc;
use notify_channels::Dispatcher;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::event_bus::{EventSink, NotificationEvent};
use notify_core::lock::{notification_lock_key, LockManager, LockToken};
use notify_core::store::NotificationStore;
use notify_core::types::{
    Notification, NotificationId, NotificationState, NON_RETRYABLE_KEY,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

/// How a `process_send` call ended when it did not propagate a delivery error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Another caller holds the lock for this id.
    SkippedInProgress,
    NotFound,
    /// The notification's state does not allow a send attempt.
    NotPermitted(NotificationState),
}

pub struct SendPipeline {
    store: Arc<dyn NotificationStore>,
    dispatcher: Dispatcher,
    locks: Arc<dyn LockManager>,
    state_machine: NotificationStateMachine,
    events: Arc<dyn EventSink>,
    lock_ttl: Duration,
}

impl SendPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        dispatcher: Dispatcher,
        locks: Arc<dyn LockManager>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            locks,
            state_machine: NotificationStateMachine::new(),
            events,
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_state_machine(mut self, state_machine: NotificationStateMachine) -> Self {
        self.state_machine = state_machine;
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Run one send attempt. Delivery failures are recorded on the
    /// notification and then returned so the job transport may retry.
    pub async fn process_send(&self, id: NotificationId) -> NotifyResult<SendOutcome> {
        let key = notification_lock_key(id);

        let Some(token) = self.locks.try_acquire(&key, self.lock_ttl).await? else {
            info!(notification_id = %id, "Send already in progress, skipping");
            metrics::counter!("pipeline.skipped").increment(1);
            return Ok(SendOutcome::SkippedInProgress);
        };

        let lease = Lease {
            locks: self.locks.clone(),
            key,
            token: Some(token),
        };
        let result = self.send_locked(id).await;
        lease.release().await;
        result
    }

    async fn send_locked(&self, id: NotificationId) -> NotifyResult<SendOutcome> {
        let Some(mut notification) = self.store.find_by_id(id).await? else {
            warn!(notification_id = %id, "Notification not found, dropping job");
            return Ok(SendOutcome::NotFound);
        };

        match notification.state {
            NotificationState::Approved => {
                if !self
                    .state_machine
                    .apply(&mut notification, Transition::Send)
                    .is_applied()
                {
                    return Ok(SendOutcome::NotPermitted(notification.state));
                }
                self.store.save(&notification).await?;
            }
            // Holding the lock while the record says `sending` means the
            // previous holder's lease expired mid-attempt.
            NotificationState::Sending => {
                warn!(
                    notification_id = %id,
                    "Resuming send attempt left in sending by an expired lease"
                );
            }
            state => {
                info!(notification_id = %id, state = %state, "Send not permitted in current state");
                return Ok(SendOutcome::NotPermitted(state));
            }
        }

        match self.dispatcher.dispatch(&notification).await {
            Ok(()) => self.on_sent(notification).await,
            Err(e) => self.on_failed(notification, e).await,
        }
    }

    async fn on_sent(&self, mut notification: Notification) -> NotifyResult<SendOutcome> {
        notification.sent_at = Some(Utc::now());
        let _ = self
            .state_machine
            .apply(&mut notification, Transition::MarkAsSent);
        if let Err(e) = self.store.save(&notification).await {
            // The record stays in `sending`; a redelivery resumes and sends again.
            error!(
                notification_id = %notification.id,
                channel = %notification.channel,
                error = %e,
                "Notification delivered but the sent state could not be saved"
            );
            metrics::counter!("pipeline.save_failed", "outcome" => "sent").increment(1);
            return Err(e);
        }

        let duration_seconds = notification.delivery_seconds().unwrap_or_default();
        info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            duration_seconds,
            "Notification sent"
        );
        metrics::counter!("pipeline.sent", "channel" => notification.channel.as_str()).increment(1);

        self.events.emit(NotificationEvent::Sent {
            id: notification.id,
            channel: notification.channel,
            duration_seconds,
        });
        Ok(SendOutcome::Sent)
    }

    async fn on_failed(&self, mut notification: Notification, err: NotifyError) -> NotifyResult<SendOutcome> {
        let description = err.to_string();
        notification.record_failure(Utc::now(), description.as_str());
        let _ = self
            .state_machine
            .apply(&mut notification, Transition::MarkAsFailed);

        if err.is_fatal() {
            notification.add_metadata(NON_RETRYABLE_KEY, serde_json::Value::Bool(true));
            error!(
                notification_id = %notification.id,
                channel = %notification.channel,
                error = %description,
                "Notification failed with a non-retryable error"
            );
        } else {
            warn!(
                notification_id = %notification.id,
                channel = %notification.channel,
                error = %description,
                retry_count = notification.retry_count,
                "Notification send failed"
            );
        }

        if let Err(e) = self.store.save(&notification).await {
            error!(
                notification_id = %notification.id,
                channel = %notification.channel,
                delivery_error = %description,
                error = %e,
                "Failed delivery could not be recorded"
            );
            metrics::counter!("pipeline.save_failed", "outcome" => "failed").increment(1);
            return Err(e);
        }
        metrics::counter!("pipeline.failed", "channel" => notification.channel.as_str()).increment(1);

        self.events.emit(NotificationEvent::Failed {
            id: notification.id,
            channel: notification.channel,
            error: description,
            retry_count: notification.retry_count,
        });
        Err(err)
    }
}

/// Lock held for one send attempt. Dropping it without `release`, as a
/// cancelled or panicking attempt does, hands the release to the runtime.
struct Lease {
    locks: Arc<dyn LockManager>,
    key: String,
    token: Option<LockToken>,
}

impl Lease {
    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            release_lock(self.locks.as_ref(), &self.key, &token).await;
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let locks = self.locks.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "Send attempt abandoned, releasing lock");
                handle.spawn(async move {
                    release_lock(locks.as_ref(), &key, &token).await;
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime to release abandoned lock; the lease TTL will reclaim it");
            }
        }
    }
}

async fn release_lock(locks: &dyn LockManager, key: &str, token: &LockToken) {
    if let Err(e) = locks.release(key, token).await {
        // The lease TTL reclaims the lock if release fails.
        warn!(key = %key, error = %e, "Failed to release notification lock");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notify_cache::{LocalLockManager, MemoryStore};
    use notify_channels::NotificationSender;
    use notify_core::event_bus::capture_sink;
    use notify_core::types::{Channel, NotificationStats};

    struct Fixed(Option<&'static str>);

    #[async_trait]
    impl NotificationSender for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn supports(&self, channel: Channel) -> bool {
            channel == Channel::Email
        }

        async fn send(&self, _n: &Notification) -> NotifyResult<()> {
            match self.0 {
                None => Ok(()),
                Some(msg) => Err(NotifyError::Delivery(msg.to_string())),
            }
        }
    }

    struct Slow(Duration);

    #[async_trait]
    impl NotificationSender for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn supports(&self, channel: Channel) -> bool {
            channel == Channel::Email
        }

        async fn send(&self, _n: &Notification) -> NotifyResult<()> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    /// Store that refuses to persist terminal states.
    struct TerminalSaveFails(MemoryStore);

    #[async_trait]
    impl NotificationStore for TerminalSaveFails {
        async fn find_by_id(&self, id: NotificationId) -> NotifyResult<Option<Notification>> {
            self.0.find_by_id(id).await
        }

        async fn find_by_state(&self, state: NotificationState) -> NotifyResult<Vec<Notification>> {
            self.0.find_by_state(state).await
        }

        async fn save(&self, notification: &Notification) -> NotifyResult<()> {
            match notification.state {
                NotificationState::Sent | NotificationState::Failed => {
                    Err(NotifyError::Store("write rejected".into()))
                }
                _ => self.0.save(notification).await,
            }
        }

        async fn recent(&self, limit: usize) -> NotifyResult<Vec<Notification>> {
            self.0.recent(limit).await
        }

        async fn stats(&self) -> NotifyResult<NotificationStats> {
            self.0.stats().await
        }
    }

    async fn seeded(state: NotificationState, channel: Channel) -> (MemoryStore, NotificationId) {
        let store = MemoryStore::new();
        let mut n = Notification::new(channel, "a@x.com", "hi");
        n.state = state;
        store.save(&n).await.unwrap();
        (store, n.id)
    }

    fn pipeline(store: &MemoryStore, locks: &LocalLockManager, sender: Fixed) -> SendPipeline {
        SendPipeline::new(
            Arc::new(store.clone()),
            Dispatcher::new(vec![Arc::new(sender)]),
            Arc::new(locks.clone()),
            capture_sink(),
        )
    }

    #[tokio::test]
    async fn test_success_releases_lock() {
        let (store, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(None));

        assert_eq!(p.process_send(id).await.unwrap(), SendOutcome::Sent);
        assert!(!locks.is_held(&notification_lock_key(id)));

        let n = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Sent);
        assert!(n.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_releases_lock_and_propagates() {
        let (store, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(Some("timeout")));

        let err = p.process_send(id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!locks.is_held(&notification_lock_key(id)));
    }

    #[tokio::test]
    async fn test_held_lock_skips() {
        let (store, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        locks
            .try_acquire(&notification_lock_key(id), DEFAULT_LOCK_TTL)
            .await
            .unwrap();
        let p = pipeline(&store, &locks, Fixed(None));

        assert_eq!(p.process_send(id).await.unwrap(), SendOutcome::SkippedInProgress);
        let n = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Approved);
    }

    #[tokio::test]
    async fn test_missing_notification() {
        let store = MemoryStore::new();
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(None));
        let id = Notification::new(Channel::Email, "a@x.com", "hi").id;

        assert_eq!(p.process_send(id).await.unwrap(), SendOutcome::NotFound);
        assert!(!locks.is_held(&notification_lock_key(id)));
    }

    #[tokio::test]
    async fn test_redelivery_after_sent_is_noop() {
        let (store, id) = seeded(NotificationState::Sent, Channel::Email).await;
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(Some("must not be called")));

        assert_eq!(
            p.process_send(id).await.unwrap(),
            SendOutcome::NotPermitted(NotificationState::Sent)
        );
        assert!(!locks.is_held(&notification_lock_key(id)));
    }

    #[tokio::test]
    async fn test_draft_is_not_sent() {
        let (store, id) = seeded(NotificationState::Draft, Channel::Email).await;
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(None));

        assert_eq!(
            p.process_send(id).await.unwrap(),
            SendOutcome::NotPermitted(NotificationState::Draft)
        );
        assert!(!locks.is_held(&notification_lock_key(id)));
    }

    #[tokio::test]
    async fn test_expired_lease_resumes_sending() {
        let (store, id) = seeded(NotificationState::Sending, Channel::Email).await;
        let locks = LocalLockManager::new();
        let p = pipeline(&store, &locks, Fixed(None));

        assert_eq!(p.process_send(id).await.unwrap(), SendOutcome::Sent);
        let n = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Sent);
    }

    #[tokio::test]
    async fn test_missing_sender_marks_non_retryable() {
        let (store, id) = seeded(NotificationState::Approved, Channel::Sms).await;
        let locks = LocalLockManager::new();
        let events = capture_sink();
        let p = SendPipeline::new(
            Arc::new(store.clone()),
            Dispatcher::new(vec![Arc::new(Fixed(None))]),
            Arc::new(locks.clone()),
            events.clone(),
        );

        let err = p.process_send(id).await.unwrap_err();
        assert!(matches!(err, NotifyError::NoSender(Channel::Sms)));

        let n = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Failed);
        assert_eq!(n.retry_count, 1);
        assert!(n.metadata_flag(NON_RETRYABLE_KEY));
        assert_eq!(
            n.last_error.as_deref(),
            Some("No sender found for channel: sms")
        );
        assert_eq!(events.failures(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_attempt_releases_lock() {
        let (store, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        let key = notification_lock_key(id);
        let p = SendPipeline::new(
            Arc::new(store.clone()),
            Dispatcher::new(vec![Arc::new(Slow(Duration::from_millis(200)))]),
            Arc::new(locks.clone()),
            capture_sink(),
        );

        let attempt = tokio::time::timeout(Duration::from_millis(20), p.process_send(id)).await;
        assert!(attempt.is_err());

        for _ in 0..50 {
            if !locks.is_held(&key) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!locks.is_held(&key));

        // The abandoned attempt left the record in sending; the next one resumes it.
        let n = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Sending);
        assert_eq!(p.process_send(id).await.unwrap(), SendOutcome::Sent);
        assert!(!locks.is_held(&key));
    }

    #[tokio::test]
    async fn test_unsaved_sent_state_surfaces_store_error() {
        let (inner, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        let events = capture_sink();
        let p = SendPipeline::new(
            Arc::new(TerminalSaveFails(inner.clone())),
            Dispatcher::new(vec![Arc::new(Fixed(None))]),
            Arc::new(locks.clone()),
            events.clone(),
        );

        let err = p.process_send(id).await.unwrap_err();
        assert!(matches!(err, NotifyError::Store(_)));
        assert_eq!(events.count(), 0);
        assert!(!locks.is_held(&notification_lock_key(id)));

        let n = inner.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(n.state, NotificationState::Sending);
    }

    #[tokio::test]
    async fn test_unsaved_failure_surfaces_store_error() {
        let (inner, id) = seeded(NotificationState::Approved, Channel::Email).await;
        let locks = LocalLockManager::new();
        let events = capture_sink();
        let p = SendPipeline::new(
            Arc::new(TerminalSaveFails(inner.clone())),
            Dispatcher::new(vec![Arc::new(Fixed(Some("timeout")))]),
            Arc::new(locks.clone()),
            events.clone(),
        );

        let err = p.process_send(id).await.unwrap_err();
        assert!(matches!(err, NotifyError::Store(_)));
        assert_eq!(events.failures(), 0);
        assert!(!locks.is_held(&notification_lock_key(id)));
    }
}
