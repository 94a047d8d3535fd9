use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::ThrottleStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local throttle store for single-instance deployments and tests.
/// Expiry follows the injected clock, so a `ManualClock` can fast-forward windows.
/// Expired entries are purged on every write, so the map never outgrows the
/// set of keys that are still live.
pub struct MemoryThrottleStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryThrottleStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    async fn live_entry(&self, key: &str) -> Option<Entry> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.get(key).filter(|e| e.expires_at > now).cloned()
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryThrottleStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl ThrottleStore for MemoryThrottleStore {
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .live_entry(key)
            .await
            .and_then(|e| (e.expires_at - now).to_std().ok()))
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.live_entry(key)
            .await
            .map(|e| {
                e.value.parse::<i64>().map_err(|err| StoreError::Decode {
                    key: key.to_string(),
                    reason: err.to_string(),
                })
            })
            .transpose()
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| StoreError::Command(format!("TTL out of range: {:?}", ttl)))?;
        let entry = Entry {
            value: value.to_string(),
            expires_at,
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store() -> (MemoryThrottleStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MemoryThrottleStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_and_ttl() {
        let (store, clock) = store();
        store
            .set_with_ttl("login_attempt:a@x.com", "3", Duration::from_secs(900))
            .await
            .unwrap();

        assert_eq!(store.get_int("login_attempt:a@x.com").await.unwrap(), Some(3));
        assert_eq!(
            store.ttl("login_attempt:a@x.com").await.unwrap(),
            Some(Duration::from_secs(900))
        );

        clock.advance(chrono::Duration::seconds(600));
        assert_eq!(
            store.ttl("login_attempt:a@x.com").await.unwrap(),
            Some(Duration::from_secs(300))
        );
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let (store, clock) = store();
        store
            .set_with_ttl("login_blocked:a@x.com", "blocked", Duration::from_secs(300))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(300));
        assert_eq!(store.ttl("login_blocked:a@x.com").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_writes_purge_expired_entries() {
        let (store, clock) = store();
        for i in 0..1000 {
            let key = format!("login_attempt:user{}@x.com", i);
            store.set_with_ttl(&key, "1", Duration::from_secs(900)).await.unwrap();
        }
        assert_eq!(store.entries.read().await.len(), 1000);

        clock.advance(chrono::Duration::days(1));
        store
            .set_with_ttl("login_attempt:late@x.com", "1", Duration::from_secs(900))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.entries.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl() {
        let (store, _) = store();
        let result = store
            .set_with_ttl("login_blocked:a@x.com", "blocked", Duration::from_secs(10_000_000_000_000))
            .await;

        assert!(matches!(result, Err(StoreError::Command(_))));
        assert!(store.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (store, _) = store();
        assert_eq!(store.get_int("nope").await.unwrap(), None);
        assert_eq!(store.ttl("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_integer_value() {
        let (store, _) = store();
        store
            .set_with_ttl("login_blocked:a@x.com", "blocked", Duration::from_secs(300))
            .await
            .unwrap();

        let result = store.get_int("login_blocked:a@x.com").await;
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_delete_many() {
        let (store, _) = store();
        for key in ["a", "b", "c"] {
            store.set_with_ttl(key, "1", Duration::from_secs(60)).await.unwrap();
        }

        store.delete(&["a".to_string(), "b".to_string()]).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get_int("c").await.unwrap(), Some(1));
    }
}
