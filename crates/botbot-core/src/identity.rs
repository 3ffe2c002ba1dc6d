//! Chat network and channel identities.
//!
//! The ground-truth records live in an external store (the web application's
//! database). The runner only ever *reads* them, through [`IdentityStore`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;

/// Opaque id of a chat network connection (one bot on one network).
pub type NetworkId = i64;

/// A chat network connection as configured by the operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    /// Connection id, matches `ChatBotId` on the wire.
    pub id: NetworkId,
    /// The bot's own nickname on this network.
    pub nick: String,
    /// Server address, informational only.
    #[serde(default)]
    pub server: Option<String>,
}

/// A channel the bot listens to, with its enabled plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelIdentity {
    /// Owning network connection.
    pub chatbot_id: NetworkId,
    /// Channel name, e.g. `#rust`.
    pub name: String,
    /// Enabled plugin slugs mapped to their per-channel configuration.
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}

impl ChannelIdentity {
    /// Creates a channel with no plugins enabled.
    pub fn new(chatbot_id: NetworkId, name: impl Into<String>) -> Self {
        Self {
            chatbot_id,
            name: name.into(),
            plugins: BTreeMap::new(),
        }
    }

    /// Enables `slug` on this channel with an empty configuration.
    pub fn with_plugin(self, slug: impl Into<String>) -> Self {
        self.with_plugin_config(slug, Value::Object(Default::default()))
    }

    /// Enables `slug` on this channel with the given configuration table.
    pub fn with_plugin_config(mut self, slug: impl Into<String>, config: Value) -> Self {
        self.plugins.insert(slug.into(), config);
        self
    }

    /// Returns `true` if `slug` is enabled here.
    pub fn is_plugin_enabled(&self, slug: &str) -> bool {
        self.plugins.contains_key(slug)
    }

    /// The set of enabled plugin slugs.
    pub fn active_plugin_slugs(&self) -> BTreeSet<String> {
        self.plugins.keys().cloned().collect()
    }

    /// The configuration table for `slug`, if enabled.
    pub fn plugin_config(&self, slug: &str) -> Option<&Value> {
        self.plugins.get(slug)
    }
}

/// Read access to the ground-truth identity records.
///
/// `Ok(None)` is a plain miss. `Err(_)` means the store itself could not be
/// reached.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    /// Looks up a network connection by id.
    async fn network(&self, id: NetworkId) -> CoreResult<Option<NetworkIdentity>>;

    /// Looks up a channel by network id and name.
    async fn channel(&self, network_id: NetworkId, name: &str)
    -> CoreResult<Option<ChannelIdentity>>;

    /// Names of every channel configured for a network.
    async fn channel_names(&self, network_id: NetworkId) -> CoreResult<Vec<String>>;
}

#[derive(Debug, Default)]
struct NetworkEntry {
    identity: Option<NetworkIdentity>,
    channels: BTreeMap<String, ChannelIdentity>,
}

/// In-memory [`IdentityStore`], seeded from configuration or by tests.
///
/// Counts every lookup so callers can observe cache behaviour.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    networks: RwLock<HashMap<NetworkId, NetworkEntry>>,
    lookups: AtomicUsize,
}

impl MemoryIdentityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a network record.
    pub fn add_network(&self, network: NetworkIdentity) {
        let id = network.id;
        let mut networks = self.networks.write();
        networks.entry(id).or_default().identity = Some(network);
    }

    /// Inserts or replaces a channel record.
    pub fn add_channel(&self, channel: ChannelIdentity) {
        let mut networks = self.networks.write();
        networks
            .entry(channel.chatbot_id)
            .or_default()
            .channels
            .insert(channel.name.clone(), channel);
    }

    /// Removes a channel record, returning it if it existed.
    pub fn remove_channel(&self, network_id: NetworkId, name: &str) -> Option<ChannelIdentity> {
        self.networks
            .write()
            .get_mut(&network_id)
            .and_then(|entry| entry.channels.remove(name))
    }

    /// Number of `network`/`channel` lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn network(&self, id: NetworkId) -> CoreResult<Option<NetworkIdentity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .networks
            .read()
            .get(&id)
            .and_then(|entry| entry.identity.clone()))
    }

    async fn channel(
        &self,
        network_id: NetworkId,
        name: &str,
    ) -> CoreResult<Option<ChannelIdentity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .networks
            .read()
            .get(&network_id)
            .and_then(|entry| entry.channels.get(name).cloned()))
    }

    async fn channel_names(&self, network_id: NetworkId) -> CoreResult<Vec<String>> {
        Ok(self
            .networks
            .read()
            .get(&network_id)
            .map(|entry| entry.channels.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_plugins() {
        let channel = ChannelIdentity::new(1, "#rust")
            .with_plugin("motivate")
            .with_plugin_config("vote", json!({"options_separator": ";"}));

        assert!(channel.is_plugin_enabled("motivate"));
        assert!(!channel.is_plugin_enabled("metabrain"));
        assert_eq!(
            channel.active_plugin_slugs().into_iter().collect::<Vec<_>>(),
            vec!["motivate".to_string(), "vote".to_string()]
        );
        assert_eq!(
            channel.plugin_config("vote").unwrap()["options_separator"],
            json!(";")
        );
    }

    #[tokio::test]
    async fn test_memory_store_lookups() {
        let store = MemoryIdentityStore::new();
        store.add_network(NetworkIdentity {
            id: 1,
            nick: "botbot".into(),
            server: None,
        });
        store.add_channel(ChannelIdentity::new(1, "#rust"));
        store.add_channel(ChannelIdentity::new(1, "#python"));

        assert_eq!(store.network(1).await.unwrap().unwrap().nick, "botbot");
        assert!(store.network(2).await.unwrap().is_none());
        assert!(store.channel(1, "#rust").await.unwrap().is_some());
        assert!(store.channel(1, "#go").await.unwrap().is_none());
        assert_eq!(
            store.channel_names(1).await.unwrap(),
            vec!["#python".to_string(), "#rust".to_string()]
        );
        assert_eq!(store.lookup_count(), 4);

        store.remove_channel(1, "#rust");
        assert!(store.channel(1, "#rust").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_network_replaces_record_and_keeps_channels() {
        let store = MemoryIdentityStore::new();
        store.add_channel(ChannelIdentity::new(7, "#rust"));
        store.add_network(NetworkIdentity {
            id: 7,
            nick: "botbot".into(),
            server: None,
        });
        store.add_network(NetworkIdentity {
            id: 7,
            nick: "botbot2".into(),
            server: Some("irc.libera.chat".into()),
        });

        let network = store.network(7).await.unwrap().unwrap();
        assert_eq!(network.nick, "botbot2");
        assert_eq!(network.server.as_deref(), Some("irc.libera.chat"));
        assert!(store.channel(7, "#rust").await.unwrap().is_some());
    }
}
