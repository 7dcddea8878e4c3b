//! Unified error system for collective signing rounds
//!
//! A single error type shared by every crate in the workspace. Variants carry
//! a human-readable message; verification failures additionally name the
//! node where the aggregate check broke.

use serde::{Deserialize, Serialize};

/// Unified error type for all round operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TreeSignError {
    /// Invalid input, state or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// A deadline passed before the awaited message arrived
    #[error("Timeout: {message}")]
    Timeout {
        /// What was being waited for
        message: String,
    },

    /// The aggregate ElGamal relation did not hold
    #[error("Verifying ElGamal Collective Signature failed in {node}")]
    VerificationFailed {
        /// Name of the node whose check failed
        node: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl TreeSignError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a verification failure for the named node
    pub fn verification_failed(node: impl Into<String>) -> Self {
        Self::VerificationFailed { node: node.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for round operations
pub type Result<T> = std::result::Result<T, TreeSignError>;

impl From<bincode::Error> for TreeSignError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for TreeSignError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TreeSignError::invalid("test message");
        assert!(matches!(err, TreeSignError::Invalid { .. }));
        assert_eq!(err.to_string(), "Invalid: test message");
    }

    #[test]
    fn test_verification_failure_names_node() {
        let err = TreeSignError::verification_failed("node-3");
        assert_eq!(
            err.to_string(),
            "Verifying ElGamal Collective Signature failed in node-3"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = TreeSignError::from(io_err);
        assert!(matches!(err, TreeSignError::Internal { .. }));
    }
}
