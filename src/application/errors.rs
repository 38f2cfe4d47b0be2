//! Application layer error types

use crate::domain::{DomainError, SourceCategory, SourceId};
use thiserror::Error;

/// Application-level errors surfaced by the integration service
#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Resource not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    #[error("Sync already in progress for source {source_id}")]
    SyncInProgress { source_id: SourceId },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl IntegrationError {
    pub fn source_not_found(id: &SourceId) -> Self {
        IntegrationError::NotFound {
            resource: "source".to_string(),
            id: id.to_string(),
        }
    }

    pub fn rule_not_found(id: impl ToString) -> Self {
        IntegrationError::NotFound {
            resource: "rule".to_string(),
            id: id.to_string(),
        }
    }

    /// Get the error type as a string for status reporting
    pub fn error_type(&self) -> &'static str {
        match self {
            IntegrationError::Domain(_) => "domain_error",
            IntegrationError::Sync(_) => "sync_error",
            IntegrationError::Store(_) => "store_error",
            IntegrationError::NotFound { .. } => "not_found",
            IntegrationError::SyncInProgress { .. } => "sync_in_progress",
            IntegrationError::Configuration { .. } => "configuration_error",
        }
    }
}

/// Failures of a single call against an external feed
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Rate limit exceeded for {source_id}")]
    RateLimit { source_id: String },

    #[error("Unsupported data source category: {category}")]
    UnsupportedCategory { category: SourceCategory },

    #[error("Invalid payload from {source_id}: {message}")]
    InvalidPayload { source_id: String, message: String },

    #[error("{message}")]
    Other { message: String },
}

impl SyncError {
    pub fn other(message: impl Into<String>) -> Self {
        SyncError::Other {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Authentication failed")]
    Authentication,

    #[error("Service unavailable")]
    ServiceUnavailable,
}

/// Failures of the source/rule persistence store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
