//! Compliance framework adapter

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["controls", "safeguards", "requirements"];
const ID_FIELDS: &[&str] = &["controlId", "id", "title"];

/// Adapter for control catalogues such as CIS or NIST frameworks
pub struct ComplianceAdapter {
    client: Arc<FeedClient>,
}

impl ComplianceAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for ComplianceAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::Compliance
    }

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, |record| require_any(record, ID_FIELDS))
            .await?;
        debug!(source = %source.id, records = batch.record_count, "Fetched compliance controls");
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}
