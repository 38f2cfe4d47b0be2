//! Vulnerability database adapter (NVD-style CVE feeds)

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["vulnerabilities", "vulns", "cves"];
const ID_FIELDS: &[&str] = &["cve.id", "cveId", "id"];

/// Adapter for CVE/vulnerability feeds
pub struct VulnerabilityAdapter {
    client: Arc<FeedClient>,
}

impl VulnerabilityAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceAdapter for VulnerabilityAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::Vulnerability
    }

    #[instrument(skip(self, source), fields(source = %source.id))]
    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, |record| require_any(record, ID_FIELDS))
            .await?;
        debug!(
            records = batch.record_count,
            rejected = batch.partial_errors.len(),
            "Fetched vulnerability records"
        );
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Credential;
    use crate::infrastructure::adapters::{test_client, test_source};
    use mockito::Server;
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_counts_nvd_records() {
        let mut server = Server::new_async().await;
        let body = json!({
            "resultsPerPage": 3,
            "vulnerabilities": [
                { "cve": { "id": "CVE-2024-0001" } },
                { "cve": { "id": "CVE-2024-0002" } },
                { "cve": { "descriptions": [] } }
            ]
        });
        let mock = server
            .mock("GET", "/rest/json/cves/2.0")
            .match_header("authorization", "Bearer nvd-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let mut source = test_source(
            SourceCategory::Vulnerability,
            &format!("{}/rest/json/cves/2.0", server.url()),
        );
        source.credential = Some(Credential::new("nvd-key"));

        let adapter = VulnerabilityAdapter::new(test_client());
        let batch = adapter.sync(&source).await.unwrap();

        mock.assert_async().await;
        assert_eq!(batch.record_count, 2);
        assert_eq!(batch.partial_errors.len(), 1);
        assert!(batch.partial_errors[0].contains("record 2"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/cves")
            .with_status(503)
            .create_async()
            .await;

        let source = test_source(SourceCategory::Vulnerability, &format!("{}/cves", server.url()));
        let adapter = VulnerabilityAdapter::new(test_client());
        let result = adapter.test_connection(&source).await;
        assert!(matches!(
            result,
            Err(SyncError::Api(crate::application::errors::ApiError::Http { status: 503, .. }))
        ));
    }
}
