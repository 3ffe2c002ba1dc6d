//! Error types for the routing and execution layer.

use botbot_core::CoreError;
use thiserror::Error;

/// Errors raised while registering plugins or serving a plugin invocation.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// A route's regular expression failed to compile.
    #[error("plugin '{plugin}' route '{route}' has an invalid pattern: {source}")]
    InvalidPattern {
        /// Owning plugin slug.
        plugin: String,
        /// Route name.
        route: String,
        #[source]
        source: regex::Error,
    },

    /// Two plugins share the same slug.
    #[error("plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    /// One plugin declared two routes under the same name.
    #[error("plugin '{plugin}' declares route '{route}' more than once")]
    DuplicateRoute {
        /// Owning plugin slug.
        plugin: String,
        /// Route name.
        route: String,
    },

    /// A command route was declared with an empty or multi-word command.
    #[error("plugin '{plugin}' route '{route}' has an invalid command word '{command}'")]
    InvalidCommand {
        plugin: String,
        route: String,
        command: String,
    },

    /// A required configuration field has no value on this channel.
    #[error("plugin '{plugin}' requires config field '{field}'")]
    MissingConfigField {
        /// Plugin slug.
        plugin: String,
        /// Field name.
        field: String,
    },

    /// The merged channel config did not fit the plugin's config type.
    #[error("plugin '{plugin}' config is invalid: {source}")]
    InvalidConfig {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    /// A store operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;
