//! Performance monitoring adapter (Prometheus-style query API)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["data.result", "metrics", "series"];
const SAMPLE_FIELDS: &[&str] = &["metric", "value", "values", "name"];

pub struct PerformanceAdapter {
    client: Arc<FeedClient>,
}

impl PerformanceAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for PerformanceAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::PerformanceMonitoring
    }

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, |record| require_any(record, SAMPLE_FIELDS))
            .await?;
        debug!(source = %source.id, series = batch.record_count, "Fetched metric series");
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}
