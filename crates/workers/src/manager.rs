//! Worker manager — spawns and supervises N send workers per node, plus the
//! retry sweep schedule.

use crate::local::LocalJobQueue;
use crate::worker::SendWorker;
use notify_core::config::AppConfig;
use notify_lifecycle::{RetrySweep, SendPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Manages the lifecycle of all send workers on this node.
pub struct WorkerManager {
    config: AppConfig,
    pipeline: Arc<SendPipeline>,
    sweep: Arc<RetrySweep>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    pub fn new(config: AppConfig, pipeline: Arc<SendPipeline>, sweep: Arc<RetrySweep>) -> Self {
        Self {
            config,
            pipeline,
            sweep,
            handles: Vec::new(),
        }
    }

    fn workers(&self) -> impl Iterator<Item = SendWorker> + '_ {
        (0..self.config.workers.count).map(|i| {
            SendWorker::new(
                format!("{}-worker-{:02}", self.config.node_id, i),
                self.pipeline.clone(),
            )
        })
    }

    /// Spawn workers sharing the in-process queue.
    pub fn start_local(&mut self, queue: LocalJobQueue) {
        let workers: Vec<_> = self.workers().collect();
        for worker in workers {
            info!(worker_id = %worker.worker_id, "Worker spawned");
            self.handles.push(worker.spawn_local(queue.clone()));
        }
        self.start_sweep();
        self.log_started("local");
    }

    /// Spawn workers as members of the configured NATS queue group.
    pub fn start_nats(&mut self, client: async_nats::Client) {
        let subject = self.config.nats.subject.clone();
        let group = self.config.nats.queue_group.clone();

        let workers: Vec<_> = self.workers().collect();
        for worker in workers {
            info!(worker_id = %worker.worker_id, "Worker spawned");
            self.handles
                .push(worker.spawn_nats(client.clone(), subject.clone(), group.clone()));
        }
        self.start_sweep();
        self.log_started("nats");
    }

    fn start_sweep(&mut self) {
        if !self.config.retry.enabled {
            info!("Retry sweep disabled");
            return;
        }
        let interval = Duration::from_secs(self.config.retry.sweep_interval_secs);
        info!(interval_secs = interval.as_secs(), "Retry sweep scheduled");
        self.handles.push(self.sweep.clone().spawn_schedule(interval));
    }

    fn log_started(&self, transport: &str) {
        info!(
            count = self.config.workers.count,
            node = %self.config.node_id,
            transport,
            "All workers started"
        );
    }

    /// Wait for all tasks to complete (blocks until shutdown).
    pub async fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }
    }

    pub fn shutdown(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        info!(tasks = self.handles.len(), "Workers stopped");
    }

    pub fn task_count(&self) -> usize {
        self.handles.len()
    }
}
