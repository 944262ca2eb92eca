//! Builds the store, lock, transport, and lifecycle services from configuration.

use notify_cache::{LocalLockManager, MemoryStore, RedisLockManager, RedisStore};
use notify_channels::{senders_from_config, ChannelSenders, Dispatcher};
use notify_core::config::{AppConfig, LockBackend, QueueBackend, StoreBackend};
use notify_core::event_bus::{AnalyticsLogSink, EventSink};
use notify_core::lock::LockManager;
use notify_core::queue::JobQueue;
use notify_core::store::NotificationStore;
use notify_lifecycle::{NotificationStateMachine, RetrySweep, SendPipeline, Submitter};
use notify_workers::{nats, LocalJobQueue, NatsJobQueue, SendWorker};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub enum Transport {
    Local(LocalJobQueue),
    Nats(NatsJobQueue),
}

impl Transport {
    fn job_queue(&self) -> Arc<dyn JobQueue> {
        match self {
            Transport::Local(q) => Arc::new(q.clone()),
            Transport::Nats(q) => Arc::new(q.clone()),
        }
    }
}

pub struct Runtime {
    pub config: AppConfig,
    pub store: Arc<dyn NotificationStore>,
    pub local_locks: Option<LocalLockManager>,
    pub senders: Arc<ChannelSenders>,
    pub transport: Transport,
    pub pipeline: Arc<SendPipeline>,
    pub sweep: Arc<RetrySweep>,
    pub submitter: Arc<Submitter>,
}

impl Runtime {
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn NotificationStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Redis => Arc::new(RedisStore::new(&config.redis).await?),
        };

        let mut local_locks = None;
        let locks: Arc<dyn LockManager> = match config.lock.backend {
            LockBackend::Local => {
                let manager = LocalLockManager::new();
                local_locks = Some(manager.clone());
                Arc::new(manager)
            }
            LockBackend::Redis => Arc::new(RedisLockManager::new(&config.redis).await?),
        };

        let transport = match config.queue.backend {
            QueueBackend::Local => Transport::Local(LocalJobQueue::new()),
            QueueBackend::Nats => {
                let client = nats::connect(&config.nats).await?;
                Transport::Nats(NatsJobQueue::new(client, config.nats.subject.clone()))
            }
        };
        let queue = transport.job_queue();

        let senders = Arc::new(senders_from_config(&config.channels, &config.rate_limits)?);
        let dispatcher = Dispatcher::new(senders.senders.clone());
        let events: Arc<dyn EventSink> = Arc::new(AnalyticsLogSink);
        let state_machine = NotificationStateMachine::with_max_retries(config.retry.max_retries);

        let pipeline = SendPipeline::new(store.clone(), dispatcher, locks, events)
            .with_state_machine(state_machine.clone())
            .with_lock_ttl(Duration::from_secs(config.lock.ttl_secs));
        let sweep = RetrySweep::new(store.clone(), queue.clone()).with_state_machine(state_machine);
        let submitter = Submitter::new(store.clone(), queue);

        info!(
            store = ?config.store.backend,
            lock = ?config.lock.backend,
            queue = ?config.queue.backend,
            "Runtime initialized"
        );

        Ok(Self {
            config,
            store,
            local_locks,
            senders,
            transport,
            pipeline: Arc::new(pipeline),
            sweep: Arc::new(sweep),
            submitter: Arc::new(submitter),
        })
    }

    /// One-shot reads need a store shared with the serving process; a
    /// memory store would always start empty.
    pub fn require_shared_store(config: &AppConfig, command: &str) -> anyhow::Result<()> {
        if config.store.backend == StoreBackend::Memory {
            anyhow::bail!(
                "`{command}` needs a shared store, but store.backend is memory and starts empty \
                 in every process; set store.backend = \"redis\""
            );
        }
        Ok(())
    }

    /// Run queued jobs inline when the transport is in-process. One-shot
    /// commands have no background workers.
    pub async fn drain_local(&self) -> usize {
        match &self.transport {
            Transport::Local(queue) => {
                SendWorker::new(format!("{}-cli", self.config.node_id), self.pipeline.clone())
                    .drain(queue)
                    .await
            }
            Transport::Nats(_) => 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_reads_refuse_memory_store() {
        let mut config = AppConfig::default();
        let err = Runtime::require_shared_store(&config, "stats").unwrap_err();
        assert!(err.to_string().contains("`stats` needs a shared store"));

        config.store.backend = StoreBackend::Redis;
        Runtime::require_shared_store(&config, "stats").unwrap();
    }

    #[tokio::test]
    async fn test_memory_runtime_exposes_rate_limiters() {
        let rt = Runtime::build(AppConfig::default()).await.unwrap();
        assert_eq!(rt.senders.limiters.len(), 2);
        assert!(rt.local_locks.is_some());
        assert_eq!(rt.drain_local().await, 0);
    }
}
