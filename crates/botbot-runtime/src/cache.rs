//! Short-lived memoization of identity lookups.

use std::sync::Arc;
use std::time::Duration;

use botbot_core::{ChannelIdentity, IdentityStore, NetworkId, NetworkIdentity};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// How long a resolved identity is reused before the store is asked again.
pub const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self, now: Instant) -> Option<T> {
        (self.expires_at > now).then(|| self.value.clone())
    }
}

/// TTL cache in front of an [`IdentityStore`].
///
/// Only hits are cached; a miss is asked again on the next event. Entries
/// past their TTL are treated as absent, so the store stays the source of
/// truth.
pub struct IdentityCache {
    store: Arc<dyn IdentityStore>,
    ttl: Duration,
    networks: DashMap<NetworkId, Cached<NetworkIdentity>>,
    channels: DashMap<(NetworkId, String), Cached<ChannelIdentity>>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            networks: DashMap::new(),
            channels: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolves a network connection. Never fails: store errors and misses
    /// are logged and reported as absent.
    pub async fn resolve_network(&self, id: NetworkId) -> Option<NetworkIdentity> {
        let now = Instant::now();
        if let Some(hit) = self.networks.get(&id).and_then(|entry| entry.fresh(now)) {
            trace!(chatbot_id = id, "Network cache hit");
            return Some(hit);
        }

        match self.store.network(id).await {
            Ok(Some(network)) => {
                self.networks.insert(
                    id,
                    Cached {
                        value: network.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                Some(network)
            }
            Ok(None) => {
                self.networks.remove(&id);
                warn!(chatbot_id = id, "Network lookup failed: no such network");
                None
            }
            Err(e) => {
                warn!(chatbot_id = id, error = %e, "Network lookup failed");
                None
            }
        }
    }

    /// Resolves a channel by network and name. Never fails.
    ///
    /// A miss logs the channels the network *is* configured for at debug
    /// level.
    pub async fn resolve_channel(&self, network_id: NetworkId, name: &str) -> Option<ChannelIdentity> {
        let key = (network_id, name.to_string());
        let now = Instant::now();
        if let Some(hit) = self.channels.get(&key).and_then(|entry| entry.fresh(now)) {
            trace!(chatbot_id = network_id, channel = name, "Channel cache hit");
            return Some(hit);
        }

        match self.store.channel(network_id, name).await {
            Ok(Some(channel)) => {
                self.channels.insert(
                    key,
                    Cached {
                        value: channel.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                Some(channel)
            }
            Ok(None) => {
                self.channels.remove(&key);
                warn!(chatbot_id = network_id, channel = name, "Channel lookup failed: no such channel");
                match self.store.channel_names(network_id).await {
                    Ok(names) => debug!(
                        chatbot_id = network_id,
                        channel = name,
                        configured = ?names,
                        "Channel not among configured channels"
                    ),
                    Err(e) => debug!(chatbot_id = network_id, error = %e, "Could not list configured channels"),
                }
                None
            }
            Err(e) => {
                warn!(chatbot_id = network_id, channel = name, error = %e, "Channel lookup failed");
                None
            }
        }
    }

    /// Drops every expired entry.
    pub fn prune(&self) {
        let now = Instant::now();
        self.networks.retain(|_, entry| entry.expires_at > now);
        self.channels.retain(|_, entry| entry.expires_at > now);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.networks.clear();
        self.channels.clear();
    }

    /// Number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.networks.len() + self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("ttl", &self.ttl)
            .field("networks", &self.networks.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use botbot_core::{CoreError, CoreResult, MemoryIdentityStore};

    fn seeded() -> Arc<MemoryIdentityStore> {
        let store = Arc::new(MemoryIdentityStore::new());
        store.add_network(NetworkIdentity {
            id: 1,
            nick: "botbot".into(),
            server: None,
        });
        store.add_channel(ChannelIdentity::new(1, "#rust").with_plugin("motivate"));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn test_hits_are_cached_until_ttl() {
        let store = seeded();
        let cache = IdentityCache::new(store.clone(), Duration::from_secs(60));

        assert!(cache.resolve_network(1).await.is_some());
        assert!(cache.resolve_channel(1, "#rust").await.is_some());
        assert_eq!(store.lookup_count(), 2);

        cache.resolve_network(1).await;
        cache.resolve_channel(1, "#rust").await;
        assert_eq!(store.lookup_count(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.resolve_channel(1, "#rust").await;
        assert_eq!(store.lookup_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_sees_store_changes() {
        let store = seeded();
        let cache = IdentityCache::new(store.clone(), Duration::from_secs(60));
        assert!(cache.resolve_channel(1, "#rust").await.is_some());

        store.remove_channel(1, "#rust");
        assert!(cache.resolve_channel(1, "#rust").await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.resolve_channel(1, "#rust").await.is_none());
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let store = seeded();
        let cache = IdentityCache::new(store.clone(), DEFAULT_IDENTITY_TTL);

        assert!(cache.resolve_network(9).await.is_none());
        assert!(cache.resolve_network(9).await.is_none());
        assert!(cache.resolve_channel(1, "#nope").await.is_none());
        assert_eq!(store.lookup_count(), 3);
        assert!(cache.is_empty());

        store.add_channel(ChannelIdentity::new(1, "#nope"));
        assert!(cache.resolve_channel(1, "#nope").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_expired() {
        let cache = IdentityCache::new(seeded(), Duration::from_secs(5));
        cache.resolve_network(1).await;
        cache.resolve_channel(1, "#rust").await;
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.prune();
        assert!(cache.is_empty());
    }

    struct Unreachable;

    #[async_trait]
    impl IdentityStore for Unreachable {
        async fn network(&self, _id: NetworkId) -> CoreResult<Option<NetworkIdentity>> {
            Err(CoreError::Identity("connection refused".into()))
        }

        async fn channel(&self, _network_id: NetworkId, _name: &str) -> CoreResult<Option<ChannelIdentity>> {
            Err(CoreError::Identity("connection refused".into()))
        }

        async fn channel_names(&self, _network_id: NetworkId) -> CoreResult<Vec<String>> {
            Err(CoreError::Identity("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_store_errors_read_as_absent() {
        let cache = IdentityCache::new(Arc::new(Unreachable), DEFAULT_IDENTITY_TTL);
        assert!(cache.resolve_network(1).await.is_none());
        assert!(cache.resolve_channel(1, "#rust").await.is_none());
    }
}
