//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use botbot_core::{ChannelIdentity, MemoryIdentityStore, NetworkId, NetworkIdentity};
use botbot_framework::{DEFAULT_COMMAND_PREFIX, ExecutionMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotbotConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingestion loop settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Networks and channels used to seed the in-memory identity store.
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
}

impl BotbotConfig {
    /// An in-memory identity store holding every configured network and
    /// channel.
    pub fn identity_store(&self) -> MemoryIdentityStore {
        let store = MemoryIdentityStore::new();
        for network in &self.networks {
            store.add_network(network.identity());
            for channel in network.channel_identities() {
                store.add_channel(channel);
            }
        }
        store
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Write to `logging.file_path`.
    File,
}

/// Log file rollover period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG` when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in every line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line number in every line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, used when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// How often the log file is rolled over.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Rolled-over files to keep; older ones are deleted.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `botbot_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Runner
// =============================================================================

/// Ingestion loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Prefix that marks a command, e.g. `!` in `!m bob`.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Queue key the bridge pushes packets onto.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Upper bound on one blocking pop.
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,

    /// `inline` or `task`.
    #[serde(default)]
    pub execution: ExecutionMode,

    /// Lifetime of a cached identity lookup.
    #[serde(default = "default_identity_cache_ttl_secs")]
    pub identity_cache_ttl_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            queue_key: default_queue_key(),
            pop_timeout_ms: default_pop_timeout_ms(),
            execution: ExecutionMode::default(),
            identity_cache_ttl_secs: default_identity_cache_ttl_secs(),
        }
    }
}

impl RunnerConfig {
    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn identity_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_cache_ttl_secs)
    }
}

fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}

fn default_queue_key() -> String {
    "q".to_string()
}

fn default_pop_timeout_ms() -> u64 {
    1000
}

fn default_identity_cache_ttl_secs() -> u64 {
    2 * 60 * 60
}

// =============================================================================
// Identity seed data
// =============================================================================

/// One network connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Matches `ChatBotId` on incoming packets.
    pub id: NetworkId,

    /// The bot's nick on this network.
    pub nick: String,

    #[serde(default)]
    pub server: Option<String>,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl NetworkConfig {
    pub fn identity(&self) -> NetworkIdentity {
        NetworkIdentity {
            id: self.id,
            nick: self.nick.clone(),
            server: self.server.clone(),
        }
    }

    /// Channel identities with their enabled plugins.
    pub fn channel_identities(&self) -> impl Iterator<Item = ChannelIdentity> + '_ {
        self.channels.iter().map(|channel| {
            channel
                .plugins
                .iter()
                .fold(ChannelIdentity::new(self.id, channel.name.clone()), |identity, (slug, config)| {
                    match config {
                        Value::Object(_) => identity.with_plugin_config(slug.clone(), config.clone()),
                        _ => identity.with_plugin(slug.clone()),
                    }
                })
        })
    }
}

/// One channel and its enabled plugins.
///
/// ```toml
/// [[networks.channels]]
/// name = "#rust"
/// plugins = { motivate = {}, vote = { username_separator = ";" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,

    /// Enabled plugin slugs mapped to their channel configuration.
    #[serde(default)]
    pub plugins: BTreeMap<String, Value>,
}
