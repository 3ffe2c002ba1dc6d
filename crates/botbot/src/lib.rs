//! # BotBot
//!
//! A plugin runner for chat bots. A bridge pushes every channel message onto
//! a queue as a JSON packet; the runner pops packets, resolves the network
//! and channel they belong to, and hands them to the plugins enabled on that
//! channel. Replies go back through a response sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐   ┌──────┐
//! │ Queue │──▶│ Normalizer │──▶│ Dispatcher │──▶│ Executor │──▶│ Sink │
//! └───────┘   └────────────┘   └────────────┘   └──────────┘   └──────┘
//!                   │                                 │
//!             IdentityCache                        KV store
//! ```
//!
//! - **Core** ([`core`]): packets, lines, collaborator contracts
//! - **Framework** ([`framework`]): routes, registry, dispatcher, executors
//! - **Runtime** ([`runtime`]): config, logging, identity cache, the loop
//! - **Plugins** ([`plugins`]): the bundled plugins
//!
//! ## Writing a plugin
//!
//! ```rust,ignore
//! use botbot::prelude::*;
//!
//! struct Shout;
//!
//! impl Shout {
//!     async fn shout(self: Arc<Self>, _ctx: PluginContext, line: Arc<Line>, _args: RouteArgs) -> HandlerResult {
//!         Ok(Some(Reply::from(line.text.to_uppercase())))
//!     }
//! }
//!
//! impl Plugin for Shout {
//!     fn slug(&self) -> &'static str {
//!         "shout"
//!     }
//!
//!     fn routes(self: Arc<Self>) -> Vec<Route> {
//!         vec![listens_to_mentions("(?P<what>.*)").bind("shout", &self, Self::shout)]
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use botbot_core as core;
pub use botbot_framework as framework;
pub use botbot_plugins as plugins;
pub use botbot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use botbot::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Events and replies
    pub use botbot_core::{AddressingMode, Line, Reply};

    // Plugin authoring
    pub use botbot_framework::{
        ConfigField, HandlerResult, Plugin, PluginContext, Route, RouteArgs, firehose,
        listens_to_all, listens_to_command, listens_to_mentions, listens_to_regex_command,
        module_slug,
    };

    // Wiring
    pub use botbot_framework::{ExecutionMode, PluginRegistry};
    pub use botbot_runtime::{ConfigLoader, PluginRunner, shutdown_on_signal};
}
