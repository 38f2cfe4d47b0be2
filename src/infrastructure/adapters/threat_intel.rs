//! Threat intelligence adapter (STIX-style object feeds)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["objects", "threats", "indicators"];
const ID_FIELDS: &[&str] = &["id", "indicator", "pattern"];

pub struct ThreatIntelAdapter {
    client: Arc<FeedClient>,
}

impl ThreatIntelAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for ThreatIntelAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::ThreatIntelligence
    }

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, |record| require_any(record, ID_FIELDS))
            .await?;
        debug!(source = %source.id, records = batch.record_count, "Fetched threat indicators");
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::{test_client, test_source};
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_accepts_top_level_array() {
        let mut server = Server::new_async().await;
        let body = json!([
            { "id": "indicator--1", "pattern": "[ipv4-addr:value = '10.0.0.1']" },
            { "id": "indicator--2" },
            "garbage"
        ]);
        let _mock = server
            .mock("GET", "/taxii")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let source = test_source(
            SourceCategory::ThreatIntelligence,
            &format!("{}/taxii", server.url()),
        );
        let batch = ThreatIntelAdapter::new(test_client())
            .sync(&source)
            .await
            .unwrap();

        assert_eq!(batch.record_count, 2);
        assert_eq!(batch.partial_errors, vec!["record 2: not a JSON object".to_string()]);
    }
}
