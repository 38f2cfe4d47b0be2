//! Cloud cost adapter

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::http::{FeedClient, require_any};
use super::traits::{SourceAdapter, SyncBatch};
use crate::application::errors::SyncError;
use crate::domain::{ExternalSource, SourceCategory};

const RECORD_PATHS: &[&str] = &["ResultsByTime", "costs", "line_items"];
const AMOUNT_FIELDS: &[&str] = &["Total", "amount", "cost", "Groups"];

/// Adapter for billing feeds; each period or line item counts as one record
pub struct CostAnalysisAdapter {
    client: Arc<FeedClient>,
}

impl CostAnalysisAdapter {
    pub fn new(client: Arc<FeedClient>) -> Self {
        Self { client }
    }
}

fn validate_cost(record: &Map<String, Value>) -> Result<(), String> {
    require_any(record, AMOUNT_FIELDS)?;
    match record.get("amount") {
        Some(Value::String(amount)) if amount.parse::<f64>().is_err() => {
            Err(format!("amount '{}' is not numeric", amount))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl SourceAdapter for CostAnalysisAdapter {
    fn category(&self) -> SourceCategory {
        SourceCategory::CostAnalysis
    }

    async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        let batch = self
            .client
            .fetch_records(source, RECORD_PATHS, validate_cost)
            .await?;
        debug!(source = %source.id, records = batch.record_count, "Fetched cost entries");
        Ok(batch)
    }

    async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.client.ping(source).await
    }
}
