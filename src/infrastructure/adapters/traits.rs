//! Traits for external feed adapters

use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Normalized outcome of one fetch against a feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub record_count: u64,
    /// Record-level problems that did not abort the sync
    pub partial_errors: Vec<String>,
}

/// Trait for category-specific feed adapters
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Category this adapter is registered under
    fn category(&self) -> SourceCategory;

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError>;

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError>;
}
