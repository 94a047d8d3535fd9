//! Expiring key-value store backing the login throttle.
//!
//! Every entry carries its own TTL, so throttle state cleans itself up and
//! can be shared by any number of server instances pointed at the same store.

mod memory;
mod redis_store;

pub use self::memory::MemoryThrottleStore;
pub use self::redis_store::RedisThrottleStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Remaining time to live. `None` when the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError>;
}
