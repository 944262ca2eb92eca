//! Redis-backed notification store.
//!
//! Layout under `{prefix}`:
//! - `{prefix}:notification:{id}`: JSON document
//! - `{prefix}:state:{state}` / `{prefix}:channel:{channel}`: id index sets
//! - `{prefix}:created`: sorted set of ids scored by creation time

use crate::redis_err;
use async_trait::async_trait;
use notify_core::config::RedisConfig;
use notify_core::error::{NotifyError, NotifyResult};
use notify_core::store::NotificationStore;
use notify_core::types::{
    Channel, Notification, NotificationId, NotificationState, NotificationStats,
};
use tracing::{info, warn};

pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    /// Connect to Redis and verify connectivity.
    pub async fn new(config: &RedisConfig) -> NotifyResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting notification store to Redis");

        let client = redis::Client::open(url.as_str()).map_err(redis_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        info!(response = %pong, "Redis store connection established");

        Ok(Self {
            client,
            prefix: config.key_prefix.clone(),
        })
    }

    fn doc_key(&self, id: NotificationId) -> String {
        format!("{}:notification:{id}", self.prefix)
    }

    fn state_key(&self, state: NotificationState) -> String {
        format!("{}:state:{state}", self.prefix)
    }

    fn channel_key(&self, channel: Channel) -> String {
        format!("{}:channel:{channel}", self.prefix)
    }

    fn created_key(&self) -> String {
        format!("{}:created", self.prefix)
    }

    async fn connection(&self) -> NotifyResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)
    }

    async fn load_many(&self, ids: &[String]) -> NotifyResult<Vec<Notification>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}:notification:{id}", self.prefix))
            .collect();

        let mut conn = self.connection().await?;
        let docs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let mut out = Vec::with_capacity(docs.len());
        for (key, doc) in keys.iter().zip(docs) {
            match doc {
                Some(json) => out.push(serde_json::from_str(&json)?),
                None => warn!(key = %key, "Index references a missing notification"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl NotificationStore for RedisStore {
    async fn find_by_id(&self, id: NotificationId) -> NotifyResult<Option<Notification>> {
        let mut conn = self.connection().await?;
        let doc: Option<String> = redis::cmd("GET")
            .arg(self.doc_key(id))
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        doc.map(|json| serde_json::from_str(&json).map_err(NotifyError::from))
            .transpose()
    }

    async fn find_by_state(&self, state: NotificationState) -> NotifyResult<Vec<Notification>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(self.state_key(state))
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let mut items = self.load_many(&ids).await?;
        // Index sets and documents are written together, but a concurrent save
        // may land between SMEMBERS and MGET.
        items.retain(|n| n.state == state);
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    async fn save(&self, notification: &Notification) -> NotifyResult<()> {
        let json = serde_json::to_string(notification)?;
        let id = notification.id.to_string();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(self.doc_key(notification.id))
            .arg(&json)
            .ignore();
        for state in NotificationState::ALL {
            let op = if state == notification.state { "SADD" } else { "SREM" };
            pipe.cmd(op).arg(self.state_key(state)).arg(&id).ignore();
        }
        pipe.cmd("SADD")
            .arg(self.channel_key(notification.channel))
            .arg(&id)
            .ignore()
            .cmd("ZADD")
            .arg(self.created_key())
            .arg(notification.created_at.timestamp_millis())
            .arg(&id)
            .ignore();

        let mut conn = self.connection().await?;
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> NotifyResult<Vec<Notification>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let ids: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(self.created_key())
            .arg(0)
            .arg(limit as isize - 1)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        self.load_many(&ids).await
    }

    async fn stats(&self) -> NotifyResult<NotificationStats> {
        let mut conn = self.connection().await?;
        let mut stats = NotificationStats::default();

        for state in NotificationState::ALL {
            let count: u64 = redis::cmd("SCARD")
                .arg(self.state_key(state))
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            if count > 0 {
                stats.by_state.insert(state.to_string(), count);
                stats.total += count;
            }
        }
        for channel in Channel::ALL {
            let count: u64 = redis::cmd("SCARD")
                .arg(self.channel_key(channel))
                .query_async(&mut conn)
                .await
                .map_err(redis_err)?;
            if count > 0 {
                stats.by_channel.insert(channel.to_string(), count);
            }
        }
        Ok(stats)
    }
}
