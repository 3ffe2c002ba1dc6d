//! Shared key/value store contract.
//!
//! Keys arrive fully namespaced (`"<slug>:<key>"`); namespacing itself is the
//! plugin context's job. Values are plain text.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{CoreError, CoreResult};

/// Durable plugin state shared across invocations.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Returns the value at `key`, or `None` if it was never set.
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Unconditionally overwrites `key`.
    async fn set(&self, key: &str, value: String) -> CoreResult<()>;

    /// Removes `key`. Returns `true` iff a value existed.
    async fn delete(&self, key: &str) -> CoreResult<bool>;

    /// Atomically increments the integer at `key`, creating it at `0` first
    /// if absent. Returns the new value.
    async fn incr(&self, key: &str) -> CoreResult<i64>;
}

/// In-memory [`KeyValueStore`] backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> CoreResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoreResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> CoreResult<i64> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current: i64 =
                    occupied
                        .get()
                        .trim()
                        .parse()
                        .map_err(|_| CoreError::NotAnInteger {
                            key: key.to_string(),
                        })?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| CoreError::Store(format!("increment overflow at '{key}'")))?;
                occupied.insert(next.to_string());
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert("1".to_string());
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        store.set("vote:state", "open".into()).await.unwrap();
        assert_eq!(store.get("vote:state").await.unwrap().as_deref(), Some("open"));

        store.set("vote:state", "closed".into()).await.unwrap();
        assert_eq!(store.get("vote:state").await.unwrap().as_deref(), Some("closed"));

        assert!(store.delete("vote:state").await.unwrap());
        assert!(!store.delete("vote:state").await.unwrap());
        assert!(store.get("vote:state").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incr_creates_key() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter:hits").await.unwrap(), 1);
        assert_eq!(store.incr("counter:hits").await.unwrap(), 2);
        assert_eq!(store.get("counter:hits").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_incr_rejects_text() {
        let store = MemoryStore::new();
        store.set("counter:hits", "many".into()).await.unwrap();
        let err = store.incr("counter:hits").await.unwrap_err();
        assert!(matches!(err, CoreError::NotAnInteger { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_keeps_namespaces_apart() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for _ in 0..50 {
            for key in ["a:count", "b:count"] {
                let store = store.clone();
                handles.push(tokio::spawn(async move { store.incr(key).await }));
            }
        }
        for handle in futures::future::join_all(handles).await {
            handle.unwrap().unwrap();
        }

        assert_eq!(store.get("a:count").await.unwrap().as_deref(), Some("50"));
        assert_eq!(store.get("b:count").await.unwrap().as_deref(), Some("50"));
    }
}
