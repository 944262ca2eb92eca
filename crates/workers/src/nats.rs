//! NATS job transport. Jobs are JSON `SendJob`s published on one subject;
//! workers share a queue group so each job reaches a single worker.

use async_trait::async_trait;
use notify_core::config::NatsConfig;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::queue::JobQueue;
use notify_core::types::SendJob;
use tracing::info;

pub async fn connect(config: &NatsConfig) -> anyhow::Result<async_nats::Client> {
    let nats_url = config
        .urls
        .first()
        .cloned()
        .unwrap_or_else(|| "nats://localhost:4222".to_string());

    info!(url = %nats_url, "Connecting to NATS");

    let client = async_nats::ConnectOptions::new()
        .max_reconnects(Some(config.max_reconnects))
        .connect(&nats_url)
        .await?;

    info!("NATS connection established");
    Ok(client)
}

#[derive(Clone)]
pub struct NatsJobQueue {
    client: async_nats::Client,
    subject: String,
}

impl NatsJobQueue {
    pub fn new(client: async_nats::Client, subject: impl Into<String>) -> Self {
        Self {
            client,
            subject: subject.into(),
        }
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn enqueue(&self, job: SendJob) -> NotifyResult<()> {
        let payload = serde_json::to_vec(&job)?;
        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Queue(e.to_string()))?;
        metrics::counter!("queue.published").increment(1);
        Ok(())
    }
}
