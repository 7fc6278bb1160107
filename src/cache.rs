//! Read-through cache over redis.
//!
//! Every failure here degrades to a miss: a broken or absent redis must never
//! fail a request, only slow it down.

use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// TTL bound for memoized lookups.
pub const CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct Cache {
    client: Option<redis::Client>,
}

impl Cache {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: Some(redis::Client::open(url)?),
        })
    }

    /// No-op cache; every read is a miss, every write is dropped.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub fn wallet_key(id: i64) -> String {
        format!("wallet:{id}")
    }

    pub fn discount_key(code: &str) -> String {
        format!("wallets:discount:{code}")
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let client = self.client.as_ref()?;
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("cache unavailable, treating {key} as a miss: {e}");
                return None;
            }
        };
        let raw: Option<String> = match conn.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("cache read for {key} failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw?) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("cache entry for {key} is malformed, ignoring: {e}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("cache write for {key} skipped, serialization failed: {e}");
                return;
            }
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<(), _> = redis::cmd("SETEX")
                    .arg(key)
                    .arg(ttl.as_secs())
                    .arg(payload)
                    .query_async(&mut conn)
                    .await;
                if let Err(e) = result {
                    tracing::warn!("cache write for {key} failed: {e}");
                }
            }
            Err(e) => tracing::warn!("cache unavailable, write for {key} dropped: {e}"),
        }
    }

    pub async fn delete(&self, keys: &[String]) {
        let Some(client) = self.client.as_ref() else {
            return;
        };
        if keys.is_empty() {
            return;
        }
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<i64, _> = conn.del(keys).await;
                if let Err(e) = result {
                    tracing::warn!("cache eviction for {keys:?} failed: {e}");
                }
            }
            Err(e) => tracing::warn!("cache unavailable, eviction for {keys:?} dropped: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(Cache::wallet_key(42), "wallet:42");
        assert_eq!(Cache::discount_key("WELCOME10"), "wallets:discount:WELCOME10");
    }

    #[tokio::test]
    async fn test_disabled_cache_is_a_miss() {
        let cache = Cache::disabled();
        let hit: Option<i64> = cache.get_json("wallet:1").await;
        assert!(hit.is_none());

        // writes and evictions are dropped without error
        cache.set_json("wallet:1", &1i64, CACHE_TTL).await;
        cache.delete(&["wallet:1".to_string()]).await;
    }
}
