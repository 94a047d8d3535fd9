use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::info;

use super::ThrottleStore;
use crate::error::StoreError;

/// Throttle store on Redis. `ConnectionManager` reconnects on its own and is cheap to clone.
#[derive(Clone)]
pub struct RedisThrottleStore {
    conn: ConnectionManager,
}

impl RedisThrottleStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to throttle store at {}", url);
        Ok(Self { conn })
    }

}

/// `PTTL` answers -2 for a missing key and -1 for a key without expiry.
/// Neither counts as a live TTL.
fn remaining_ttl(millis: i64) -> Option<Duration> {
    u64::try_from(millis)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// `SET ... PX` rejects zero, so sub-millisecond TTLs round up to 1ms.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn parse_int(key: &str, raw: Option<String>) -> Result<Option<i64>, StoreError> {
    raw.map(|value| {
        value.parse::<i64>().map_err(|e| StoreError::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

#[async_trait]
impl ThrottleStore for RedisThrottleStore {
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(remaining_ttl(millis))
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        parse_int(key, raw)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(px_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_ttl() {
        assert_eq!(remaining_ttl(-2), None);
        assert_eq!(remaining_ttl(-1), None);
        assert_eq!(remaining_ttl(0), None);
        assert_eq!(remaining_ttl(299_400), Some(Duration::from_millis(299_400)));
    }

    #[test]
    fn test_px_millis() {
        assert_eq!(px_millis(Duration::from_secs(300)), 300_000);
        assert_eq!(px_millis(Duration::from_micros(10)), 1);
        assert_eq!(px_millis(Duration::ZERO), 1);
        assert_eq!(px_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("k", None).unwrap(), None);
        assert_eq!(parse_int("k", Some("6".into())).unwrap(), Some(6));
        assert!(matches!(
            parse_int("login_blocked:a@x.com", Some("blocked".into())),
            Err(StoreError::Decode { .. })
        ));
    }

    // Needs a live Redis: REDIS_URL=redis://... cargo test -- --ignored
    async fn setup_test_store() -> (RedisThrottleStore, String) {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisThrottleStore::connect(&url)
            .await
            .expect("Failed to connect to test redis");
        (store, format!("authgate_test:{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    #[ignore]
    async fn test_ttl_states() {
        let (store, prefix) = setup_test_store().await;
        let missing = format!("{}:missing", prefix);
        let persistent = format!("{}:persistent", prefix);
        let live = format!("{}:live", prefix);

        assert_eq!(store.ttl(&missing).await.unwrap(), None);

        let mut conn = store.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(&persistent)
            .arg("1")
            .query_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(store.ttl(&persistent).await.unwrap(), None);

        store
            .set_with_ttl(&live, "blocked", Duration::from_secs(300))
            .await
            .unwrap();
        let remaining = store.ttl(&live).await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(300));
        assert!(remaining > Duration::from_secs(290));

        store.delete(&[persistent, live]).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_get_int_and_delete_many() {
        let (store, prefix) = setup_test_store().await;
        let counter = format!("{}:counter", prefix);
        let marker = format!("{}:marker", prefix);

        store
            .set_with_ttl(&counter, "3", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set_with_ttl(&marker, "blocked", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.get_int(&counter).await.unwrap(), Some(3));
        assert!(matches!(
            store.get_int(&marker).await,
            Err(StoreError::Decode { .. })
        ));

        store.delete(&[counter.clone(), marker.clone()]).await.unwrap();
        assert_eq!(store.get_int(&counter).await.unwrap(), None);
        assert_eq!(store.ttl(&marker).await.unwrap(), None);
        store.delete(&[]).await.unwrap();
    }
}
