//! Error types for rate limiting operations.
//!
//! The engine surfaces two kinds of failures: storage backend errors
//! (network, pool, scripting) and configuration errors raised while a
//! policy is validated. Neither is recovered internally; callers decide
//! whether to fail open or fail closed when a check errors out.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for rate limiting operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Policy configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A backend operation failed. Carries the operation name so callers
    /// can tell which step of a multi-operation check went wrong.
    #[error("{op}: {message}")]
    OperationFailed {
        /// Name of the failing operation (e.g. `INCR`, `ZADD`).
        op: &'static str,
        /// Backend error message.
        message: String,
    },

    /// Failed to establish a backend connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection pool exhausted.
    #[error("connection pool exhausted")]
    PoolExhausted,
}

impl StorageError {
    /// Create a new operation failure for the named operation.
    pub fn operation_failed(op: &'static str, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            op,
            message: message.into(),
        }
    }
}

/// Configuration errors raised while validating and compiling a policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Algorithm string is not one of the known identifiers.
    #[error("unknown algorithm: {0:?}")]
    UnknownAlgorithm(String),

    /// Limit dimension string is not one of the known identifiers.
    #[error("unknown limit dimension: {0:?}")]
    UnknownDimension(String),

    /// A rule failed validation.
    #[error("rule[{index}]: {message}")]
    InvalidRule {
        /// Position of the rule in the configured list.
        index: usize,
        /// What was wrong with it.
        message: String,
    },

    /// The global limit section failed validation.
    #[error("global limit: {0}")]
    InvalidGlobal(String),

    /// The auto-ban section failed validation.
    #[error("auto-ban: {0}")]
    InvalidAutoBan(String),

    /// A duration string did not parse (`<decimal><s|m|h>`).
    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    /// A rate string did not parse (`N/<s|m|h>`).
    #[error("invalid rate: {0:?}")]
    InvalidRate(String),

    /// Failed to read a policy file.
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize a policy document.
    #[error("failed to parse policy: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn invalid_rule(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            index,
            message: message.into(),
        }
    }
}
