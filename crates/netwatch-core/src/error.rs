//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Stored or transmitted state text was not `true`/`false`
    #[error("Invalid state encoding: {value:?} (expected \"true\" or \"false\")")]
    InvalidState { value: String },

    /// Timestamp text was not a decimal count of seconds
    #[error("Invalid timestamp: {value:?}")]
    InvalidTimestamp { value: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
