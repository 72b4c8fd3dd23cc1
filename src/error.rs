//! Error types for Quotagate.

use thiserror::Error;

/// Main error type for Quotagate operations.
///
/// Quota exhaustion is not an error; it is reported through
/// [`Decision::allowed`](crate::ratelimit::Decision).
#[derive(Error, Debug)]
pub enum QuotaGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy definition that can never admit a request
    #[error("Invalid policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },

    /// A policy name that is not in the policy table
    #[error("Unknown policy '{0}'")]
    UnknownPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Quotagate operations.
pub type Result<T> = std::result::Result<T, QuotaGateError>;
