//! Error types shared by the core collaborators.

use thiserror::Error;

/// Errors raised by the external collaborators (store, queue, identity
/// lookups, response delivery).
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The key/value store could not complete an operation.
    #[error("store error: {0}")]
    Store(String),

    /// `incr` was applied to a value that is not an integer.
    #[error("value at '{key}' is not an integer")]
    NotAnInteger {
        /// The fully namespaced key.
        key: String,
    },

    /// The inbound queue could not be read.
    #[error("queue error: {0}")]
    Queue(String),

    /// The ground-truth identity store failed (as opposed to a plain miss).
    #[error("identity lookup failed: {0}")]
    Identity(String),

    /// A reply could not be handed to the response sink.
    #[error("failed to deliver reply: {0}")]
    Delivery(String),
}

/// Result type for core collaborator operations.
pub type CoreResult<T> = Result<T, CoreError>;
