use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TimedEntry {
    pub value: Value,
    pub expires_at: Instant,
}

impl TimedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, TimedEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| !e.is_expired(Instant::now()))
            .map(|e| e.value.clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = TimedEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl).await,
            Err(e) => warn!("Not caching unserializable value: {}", e),
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }
}

pub fn connection_identity(url: &str, credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(b"\0");
    hasher.update(credential.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

pub fn cache_key(service: &str, operation: &str, identity: &str, bounds: &[i64]) -> String {
    let mut key = format!("{service}:{operation}:{identity}");
    for b in bounds {
        key.push(':');
        key.push_str(&b.to_string());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test(start_paused = true)]
    async fn entry_is_visible_until_ttl_passes() {
        let cache = ResponseCache::new();
        cache.set("k", json!([1, 2]), TTL).await;
        assert_eq!(cache.get("k").await, Some(json!([1, 2])));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let cache = ResponseCache::new();
        cache.set("old", json!(1), Duration::from_secs(10)).await;
        cache.set("new", json!(2), Duration::from_secs(100)).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("new").await, Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_own_timer() {
        let cache = Arc::new(ResponseCache::new());
        cache.set("k", json!("v"), Duration::from_secs(5)).await;
        let handle = cache.spawn_sweeper(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn typed_round_trip_and_clear() {
        let cache = ResponseCache::new();
        cache.set_as("list", &vec!["a".to_string()], TTL).await;
        let back: Option<Vec<String>> = cache.get_as("list").await;
        assert_eq!(back, Some(vec!["a".to_string()]));
        let wrong: Option<u32> = cache.get_as("list").await;
        assert_eq!(wrong, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn keys_separate_instances_without_leaking_credentials() {
        let a = connection_identity("http://sonarr:8989", "key-one");
        let b = connection_identity("http://sonarr:8989", "key-two");
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
        let key = cache_key("sonarr", "calendar", &a, &[100, 200]);
        assert_eq!(key, format!("sonarr:calendar:{a}:100:200"));
        assert!(!key.contains("key-one"));
    }
}
