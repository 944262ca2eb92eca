//! Transport for a sender's final channel call.

use async_trait::async_trait;
use notify_core::error::{NotifyError, NotifyResult};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Carries a JSON payload to a channel endpoint.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    async fn deliver(&self, target: &str, payload: &serde_json::Value) -> NotifyResult<()>;
}

/// Mock backend for deployments without live integrations: logs and accepts.
pub struct LogBackend {
    channel: &'static str,
}

impl LogBackend {
    pub fn new(channel: &'static str) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl DeliveryBackend for LogBackend {
    async fn deliver(&self, target: &str, payload: &serde_json::Value) -> NotifyResult<()> {
        info!(
            channel = self.channel,
            target = %target,
            payload = %payload,
            "[mock] delivery accepted"
        );
        Ok(())
    }
}

/// JSON-over-HTTP backend.
pub struct HttpBackend {
    client: Client,
}

impl HttpBackend {
    pub fn new(timeout: Duration) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DeliveryBackend for HttpBackend {
    async fn deliver(&self, target: &str, payload: &serde_json::Value) -> NotifyResult<()> {
        let response = self
            .client
            .post(target)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Delivery("timeout".to_string())
                } else {
                    NotifyError::Delivery(format!("request to {target} failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(target = %target, status = %status, "Delivery endpoint rejected payload");
            return Err(NotifyError::Delivery(format!("{target} returned {status}: {body}")));
        }

        debug!(target = %target, status = %status, "Delivery endpoint accepted payload");
        Ok(())
    }
}
