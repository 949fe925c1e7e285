//! Error types for the call-tree profiler.

use thiserror::Error;

/// Errors surfaced by the profiler.
///
/// Only clearly invalid API usage is reported; everything else the profiler
/// can absorb is a defined no-op.
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// `stop` was called with no region open
    #[error("Unbalanced stop: no region is open")]
    UnbalancedStop,

    /// A flat-API handle that was never issued or has been released
    #[error("Unknown profiler handle: {0}")]
    UnknownHandle(u64),

    /// Gathering trees from other processes failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Failed to encode or decode a tree snapshot
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for profiler operations.
pub type ProfilerResult<T> = Result<T, ProfilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProfilerError::UnbalancedStop;
        assert_eq!(err.to_string(), "Unbalanced stop: no region is open");

        let err = ProfilerError::UnknownHandle(7);
        assert_eq!(err.to_string(), "Unknown profiler handle: 7");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err: Result<(), serde_json::Error> = serde_json::from_str::<()>("not json");
        let err: ProfilerError = json_err.unwrap_err().into();
        assert!(matches!(err, ProfilerError::Serialization(_)));
    }
}
