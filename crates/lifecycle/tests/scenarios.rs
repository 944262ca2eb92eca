//! End-to-end lifecycle scenarios over the in-process store and lock.

use async_trait::async_trait;
use notify_cache::{LocalLockManager, MemoryStore};
use notify_channels::{Dispatcher, EmailSender, LogBackend, NotificationSender};
use notify_core::config::{EmailChannelConfig, RateLimitPolicy};
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::event_bus::{capture_sink, CaptureSink, NotificationEvent};
use notify_core::queue::JobQueue;
use notify_core::store::NotificationStore;
use notify_core::types::{Channel, Notification, NotificationId, NotificationState, SendJob};
use notify_delivery::RecipientRateLimiter;
use notify_lifecycle::{
    NewNotification, NotificationStateMachine, RetrySweep, SendOutcome, SendPipeline, Submitter,
    Transition,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorded(Mutex<Vec<SendJob>>);

impl Recorded {
    fn jobs(&self) -> Vec<SendJob> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for Recorded {
    async fn enqueue(&self, job: SendJob) -> NotifyResult<()> {
        self.0.lock().unwrap().push(job);
        Ok(())
    }
}

/// Email sender with a fixed result that counts its invocations.
#[derive(Default)]
struct Scripted {
    fail_with: Option<&'static str>,
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl NotificationSender for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, channel: Channel) -> bool {
        channel == Channel::Email
    }

    async fn send(&self, _n: &Notification) -> NotifyResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.fail_with {
            None => Ok(()),
            Some(msg) => Err(NotifyError::Delivery(msg.to_string())),
        }
    }
}

struct Harness {
    store: MemoryStore,
    queue: Arc<Recorded>,
    events: Arc<CaptureSink>,
    pipeline: SendPipeline,
}

impl Harness {
    fn new(sender: Arc<dyn NotificationSender>) -> Self {
        let store = MemoryStore::new();
        let events = capture_sink();
        let pipeline = SendPipeline::new(
            Arc::new(store.clone()),
            Dispatcher::new(vec![sender]),
            Arc::new(LocalLockManager::new()),
            events.clone(),
        );
        Self {
            store,
            queue: Arc::new(Recorded::default()),
            events,
            pipeline,
        }
    }

    fn submitter(&self) -> Submitter {
        Submitter::new(Arc::new(self.store.clone()), self.queue.clone())
    }

    fn sweep(&self) -> RetrySweep {
        RetrySweep::new(Arc::new(self.store.clone()), self.queue.clone())
    }

    async fn approved(&self, recipient: &str) -> NotificationId {
        let draft = self
            .submitter()
            .submit(NewNotification::new(Channel::Email, recipient, "hi"), false)
            .await
            .unwrap();
        assert_eq!(draft.state, NotificationState::Draft);
        self.submitter().approve(draft.id).await.unwrap();
        draft.id
    }

    async fn load(&self, id: NotificationId) -> Notification {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn scenario_a_successful_send() {
    let h = Harness::new(Arc::new(Scripted::default()));
    let id = h.approved("a@x.com").await;
    assert_eq!(h.load(id).await.state, NotificationState::Approved);

    assert_eq!(h.pipeline.process_send(id).await.unwrap(), SendOutcome::Sent);

    let n = h.load(id).await;
    assert_eq!(n.state, NotificationState::Sent);
    assert!(n.sent_at.is_some());
    assert_eq!(n.retry_count, 0);

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], NotificationEvent::Sent { id: eid, channel: Channel::Email, .. } if eid == id));
}

#[tokio::test]
async fn scenario_b_failed_send() {
    let h = Harness::new(Arc::new(Scripted {
        fail_with: Some("timeout"),
        ..Default::default()
    }));
    let id = h.approved("a@x.com").await;

    let err = h.pipeline.process_send(id).await.unwrap_err();
    assert_eq!(err.to_string(), "timeout");

    let n = h.load(id).await;
    assert_eq!(n.state, NotificationState::Failed);
    assert_eq!(n.retry_count, 1);
    assert_eq!(n.last_error.as_deref(), Some("timeout"));
    assert!(n.failed_at.is_some());

    assert_eq!(
        h.events.events(),
        vec![NotificationEvent::Failed {
            id,
            channel: Channel::Email,
            error: "timeout".into(),
            retry_count: 1,
        }]
    );
}

#[tokio::test]
async fn scenario_c_retry_budget_is_bounded() {
    let h = Harness::new(Arc::new(Scripted {
        fail_with: Some("timeout"),
        ..Default::default()
    }));
    let mut n = Notification::new(Channel::Email, "a@x.com", "hi");
    n.state = NotificationState::Failed;
    n.retry_count = 2;
    h.store.save(&n).await.unwrap();

    assert_eq!(h.sweep().run().await.unwrap(), 1);
    assert_eq!(h.load(n.id).await.state, NotificationState::Approved);
    assert_eq!(h.queue.jobs(), vec![SendJob::new(n.id)]);

    assert!(h.pipeline.process_send(n.id).await.is_err());
    let after = h.load(n.id).await;
    assert_eq!(after.state, NotificationState::Failed);
    assert_eq!(after.retry_count, 3);

    assert_eq!(h.sweep().run().await.unwrap(), 0);
    assert_eq!(h.load(n.id).await.state, NotificationState::Failed);
    assert_eq!(h.queue.jobs().len(), 1);
}

#[tokio::test]
async fn scenario_d_concurrent_sends_are_exclusive() {
    let sender = Arc::new(Scripted {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let h = Harness::new(sender.clone());
    let id = h.approved("a@x.com").await;

    let (first, second) = tokio::join!(h.pipeline.process_send(id), h.pipeline.process_send(id));
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|o| matches!(o, SendOutcome::SkippedInProgress));

    assert_eq!(outcomes, vec![SendOutcome::Sent, SendOutcome::SkippedInProgress]);
    assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.load(id).await.state, NotificationState::Sent);
    assert_eq!(h.events.count(), 1);
}

#[tokio::test]
async fn scenario_e_rate_limit_rejection_is_retryable() {
    let limiter = Arc::new(RecipientRateLimiter::new(
        "email",
        RateLimitPolicy {
            limit: 2,
            window_secs: 3600,
        },
    ));
    let email = EmailSender::new(EmailChannelConfig::default(), Arc::new(LogBackend::new("email")))
        .with_rate_limiter(limiter);
    let h = Harness::new(Arc::new(email));

    for _ in 0..2 {
        let id = h.approved("a@x.com").await;
        assert_eq!(h.pipeline.process_send(id).await.unwrap(), SendOutcome::Sent);
    }

    let third = h.approved("a@x.com").await;
    let err = h.pipeline.process_send(third).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, NotifyError::RateLimited { ref recipient, .. } if recipient == "a@x.com"));

    let n = h.load(third).await;
    assert_eq!(n.state, NotificationState::Failed);
    assert_eq!(n.retry_count, 1);
    assert!(n
        .last_error
        .as_deref()
        .is_some_and(|e| e.starts_with("Rate limit exceeded for a@x.com")));

    // A different recipient has its own budget.
    let other = h.approved("b@x.com").await;
    assert_eq!(h.pipeline.process_send(other).await.unwrap(), SendOutcome::Sent);
}

#[test]
fn every_state_is_reachable_only_through_the_table() {
    let sm = NotificationStateMachine::new();
    let mut n = Notification::new(Channel::Email, "a@x.com", "hi");
    for t in [Transition::Approve, Transition::Send, Transition::MarkAsFailed, Transition::Retry] {
        assert!(sm.apply(&mut n, t).is_applied(), "{t}");
    }
    assert_eq!(n.state, NotificationState::Approved);
}
