//! # BotBot Runtime
//!
//! Everything needed to turn a queue of raw packets into plugin invocations:
//!
//! - [`config`]: layered figment configuration and validation
//! - [`logging`]: `tracing-subscriber` setup driven by that configuration
//! - [`IdentityCache`]: TTL memoization of network/channel lookups
//! - [`Normalizer`]: raw packet to [`Line`](botbot_core::Line)
//! - [`PluginRunner`]: the ingestion loop
//!
//! ```rust,ignore
//! use botbot_runtime::{PluginRunner, config::load_config, logging, shutdown_on_signal};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//!
//! let runner = PluginRunner::from_config(
//!     &config.runner,
//!     queue,
//!     Arc::new(config.identity_store()),
//!     Arc::new(registry),
//!     store,
//!     sink,
//! );
//! runner.run(shutdown_on_signal()).await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod normalizer;
pub mod runner;

pub use cache::{DEFAULT_IDENTITY_TTL, IdentityCache};
pub use config::{BotbotConfig, ConfigError, ConfigLoader, ConfigResult, RunnerConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use normalizer::Normalizer;
pub use runner::{
    PluginRunner, ProcessOutcome, RunnerStats, RunnerStatsSnapshot, shutdown_on_signal,
    wait_for_shutdown,
};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
