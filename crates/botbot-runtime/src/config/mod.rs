//! Configuration for the plugin runner.
//!
//! Layered figment loading (defaults, files, `BOTBOT_*` environment,
//! programmatic overrides) plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotbotConfig, ChannelConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    NetworkConfig, RunnerConfig, SpanEventConfig,
};
pub use validation::validate_config;
