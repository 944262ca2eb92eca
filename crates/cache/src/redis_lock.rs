//! Redis lease locks for multi-process deployments.
//!
//! Acquire is `SET key token NX PX ttl`; release deletes the key only while it
//! still holds the caller's token, so a holder whose lease already expired
//! cannot free a lock that someone else has since taken.

use crate::redis_err;
use async_trait::async_trait;
use notify_core::config::RedisConfig;
use notify_core::error::NotifyResult;
use notify_core::lock::{LockManager, LockToken};
use std::time::Duration;
use tracing::{debug, info};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct RedisLockManager {
    client: redis::Client,
    prefix: String,
    release: redis::Script,
}

impl RedisLockManager {
    pub async fn new(config: &RedisConfig) -> NotifyResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, prefix = %config.lock_prefix, "Connecting lock manager to Redis");

        let client = redis::Client::open(url.as_str()).map_err(redis_err)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        Ok(Self {
            client,
            prefix: config.lock_prefix.clone(),
            release: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> NotifyResult<Option<LockToken>> {
        let token = LockToken::generate();
        let ttl_ms = ttl.as_millis().max(1) as u64;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        debug!(key = %key, acquired = reply.is_some(), "Redis lock acquire");
        Ok(reply.map(|_| token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> NotifyResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let removed: i64 = self
            .release
            .key(self.key(key))
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        if removed == 0 {
            debug!(key = %key, "Lock already expired or taken over at release");
        }
        Ok(())
    }
}
