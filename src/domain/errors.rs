//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for source and rule definitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid source category: {category}")]
    InvalidCategory { category: String },

    #[error("Invalid sync cadence: {cadence}")]
    InvalidCadence { cadence: String },

    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },
}
