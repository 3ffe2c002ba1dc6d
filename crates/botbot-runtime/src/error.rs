//! Runtime error types.

use thiserror::Error;

/// Why one popped payload could not be processed.
///
/// Collaborator failures never show up here: unresolvable identities drop
/// the line and handler failures stay inside the sandbox.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The payload is not a valid packet (bad JSON, missing field, bad timestamp).
    #[error("Malformed packet: {0}")]
    MalformedPacket(#[from] serde_json::Error),

    /// Processing panicked.
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_packet_from_json_error() {
        let err: RuntimeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, RuntimeError::MalformedPacket(_)));
        assert!(err.to_string().starts_with("Malformed packet: "));
    }
}
