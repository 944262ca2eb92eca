#![warn(clippy::unwrap_used)]

//! Storage and locking backends: in-process (DashMap) and Redis.

pub mod lock;
pub mod memory;
pub mod redis_lock;
pub mod redis_store;

pub use lock::LocalLockManager;
pub use memory::MemoryStore;
pub use redis_lock::RedisLockManager;
pub use redis_store::RedisStore;

pub(crate) fn redis_err(e: redis::RedisError) -> notify_core::NotifyError {
    notify_core::NotifyError::Store(e.to_string())
}
