//! # BotBot Framework
//!
//! Routing and execution for the BotBot plugin runner.
//!
//! This layer provides:
//! - The [`Plugin`] trait and explicit [`Route`] declarations
//! - The [`PluginRegistry`], a static table of routes per [`Category`]
//! - The [`Dispatcher`], which matches a [`Line`](botbot_core::Line) against
//!   the routes of the plugins enabled on its channel
//! - The execution sandbox: [`Invocation`], [`PluginContext`] and the
//!   [`Executor`] implementations
//! - [`TestApp`](testing::TestApp) for testing a plugin in isolation

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod plugin;
pub mod registry;
pub mod routing;
pub mod testing;

pub use context::PluginContext;
pub use dispatcher::{DEFAULT_COMMAND_PREFIX, Dispatcher};
pub use error::{FrameworkError, FrameworkResult};
pub use executor::{
    ExecutionMode, Executor, InlineExecutor, Invocation, InvocationOutcome, TaskExecutor,
};
pub use plugin::{ConfigField, Plugin, module_slug};
pub use registry::{PluginEntry, PluginRegistry, PluginRoutes, RouteMatcher, RouteRecord};
pub use routing::{
    BoxedHandler, Category, HandlerResult, Route, RouteArgs, RouteRule, UnboundRoute,
    compile_pattern, firehose, listens_to_all, listens_to_command, listens_to_mentions,
    listens_to_regex_command, match_pattern,
};
