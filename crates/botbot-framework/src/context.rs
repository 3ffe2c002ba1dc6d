//! Per-invocation plugin context.

use std::sync::Arc;

use botbot_core::{ChannelIdentity, KeyValueStore, NetworkId};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{FrameworkError, FrameworkResult};
use crate::plugin::ConfigField;

/// Binds a stateless plugin to one channel for the duration of one call.
///
/// The context owns no state of its own. All store operations are scoped to
/// the `"<slug>:<key>"` namespace, with surrounding whitespace stripped from
/// `key`.
#[derive(Clone)]
pub struct PluginContext {
    slug: Arc<str>,
    channel: Arc<ChannelIdentity>,
    chatbot_id: NetworkId,
    command_prefix: Arc<str>,
    schema: Arc<[ConfigField]>,
    store: Arc<dyn KeyValueStore>,
}

impl PluginContext {
    pub fn new(
        slug: Arc<str>,
        channel: Arc<ChannelIdentity>,
        chatbot_id: NetworkId,
        command_prefix: Arc<str>,
        schema: Arc<[ConfigField]>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            slug,
            channel,
            chatbot_id,
            command_prefix,
            schema,
            store,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn channel(&self) -> &ChannelIdentity {
        &self.channel
    }

    pub fn chatbot_id(&self) -> NetworkId {
        self.chatbot_id
    }

    /// The configured command prefix, e.g. `"!"`.
    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    fn unique_key(&self, key: &str) -> String {
        format!("{}:{}", self.slug, key.trim())
    }

    /// Overwrites `key` with `value`.
    pub async fn store(&self, key: &str, value: impl Into<String>) -> FrameworkResult<()> {
        Ok(self.store.set(&self.unique_key(key), value.into()).await?)
    }

    /// Reads `key`, `None` if never stored.
    pub async fn retrieve(&self, key: &str) -> FrameworkResult<Option<String>> {
        Ok(self.store.get(&self.unique_key(key)).await?)
    }

    /// Deletes `key`. Returns `true` iff it existed.
    pub async fn delete(&self, key: &str) -> FrameworkResult<bool> {
        Ok(self.store.delete(&self.unique_key(key)).await?)
    }

    /// Atomically increments the counter at `key`, starting from zero.
    pub async fn incr(&self, key: &str) -> FrameworkResult<i64> {
        Ok(self.store.incr(&self.unique_key(key)).await?)
    }

    /// The channel's configuration for this plugin, merged over the declared
    /// defaults.
    ///
    /// Fields the plugin does not declare are passed through untouched.
    pub fn config(&self) -> FrameworkResult<Map<String, Value>> {
        let mut merged = match self.channel.plugin_config(&self.slug) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        for field in self.schema.iter() {
            let present = merged.get(&field.name).is_some_and(|v| !v.is_null());
            if present {
                continue;
            }
            match &field.default {
                Some(default) => {
                    merged.insert(field.name.clone(), default.clone());
                }
                None if field.required => {
                    return Err(FrameworkError::MissingConfigField {
                        plugin: self.slug.to_string(),
                        field: field.name.clone(),
                    });
                }
                None => {}
            }
        }

        Ok(merged)
    }

    /// [`config`](Self::config) deserialized into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> FrameworkResult<T> {
        serde_json::from_value(Value::Object(self.config()?)).map_err(|source| {
            FrameworkError::InvalidConfig {
                plugin: self.slug.to_string(),
                source,
            }
        })
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("slug", &self.slug)
            .field("channel", &self.channel.name)
            .field("chatbot_id", &self.chatbot_id)
            .finish()
    }
}
