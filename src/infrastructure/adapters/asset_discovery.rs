//! Asset discovery adapter (network scanners, inventory services)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["hosts", "assets", "devices"];
const ID_FIELDS: &[&str] = &["assetId", "id", "ip", "ipAddress", "hostname"];

pub struct AssetDiscoveryAdapter {
    client: Arc<FeedClient>,
}

impl AssetDiscoveryAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for AssetDiscoveryAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::AssetDiscovery
    }

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, |record| require_any(record, ID_FIELDS))
            .await?;
        debug!(source = %source.id, records = batch.record_count, "Fetched discovered assets");
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}
