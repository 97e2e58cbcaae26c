//! Error types for BucketDS
//!
//! This module defines the error taxonomy shared by the datastore, its
//! remote collaborators and the CLI.

use crate::types::KeyError;
use thiserror::Error;

/// Boxed source error carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Common result type for BucketDS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for BucketDS
#[derive(Debug, Error)]
pub enum Error {
    /// Key absent from the index, or confirmed absent at the remote store
    #[error("key not found: {key}")]
    NotFound { key: String },

    /// Remote I/O failure (network, auth, quota), propagated verbatim
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    #[error("remote {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),
}

impl Error {
    /// Create a not found error for a key or path
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Wrap a remote failure
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unsupported query error
    pub fn unsupported_query(msg: impl Into<String>) -> Self {
        Self::UnsupportedQuery(msg.into())
    }

    /// Check if this is a not found error
    ///
    /// Not found is an expected outcome, not a fault.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the caller may retry the operation
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::transport("connection reset").is_retryable());
        assert!(Error::Timeout { operation: "read" }.is_retryable());
        assert!(!Error::not_found("/k").is_retryable());
        assert!(!Error::configuration("bad").is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::not_found("/k").is_not_found());
        assert!(!Error::unsupported_query("orders").is_not_found());
    }

    #[test]
    fn test_transport_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "quota exceeded");
        let err = Error::transport(io);
        assert_eq!(err.to_string(), "transport error: quota exceeded");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "quota exceeded");
    }

    #[test]
    fn test_invalid_key_from() {
        let err: Error = KeyError::Empty.into();
        assert!(matches!(err, Error::InvalidKey(KeyError::Empty)));
    }
}
