//! Sync history and the integration status roll-up

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::scheduler::calculate_next_sync;
use crate::domain::{ExternalSource, IntegrationResult, IntegrationStatus, SourceId};

/// Bounded record of the most recent sync results, oldest first
pub struct SyncHistory {
    limit: usize,
    results: RwLock<VecDeque<IntegrationResult>>,
}

impl SyncHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            results: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, result: IntegrationResult) {
        let mut results = self.results.write().await;
        if results.len() == self.limit {
            results.pop_front();
        }
        results.push_back(result);
    }

    /// Up to `count` results, newest first
    pub async fn recent(&self, count: usize) -> Vec<IntegrationResult> {
        self.results
            .read()
            .await
            .iter()
            .rev()
            .take(count)
            .cloned()
            .collect()
    }

    pub async fn latest_for(&self, id: &SourceId) -> Option<IntegrationResult> {
        self.results
            .read()
            .await
            .iter()
            .rev()
            .find(|result| &result.source_id == id)
            .cloned()
    }

    /// Number of unsuccessful results currently retained
    pub async fn error_count(&self) -> usize {
        self.results
            .read()
            .await
            .iter()
            .filter(|result| !result.success)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

/// Folds the source catalogue and sync history into an [`IntegrationStatus`]
pub struct IntegrationStatusAggregator {
    history: Arc<SyncHistory>,
}

impl IntegrationStatusAggregator {
    pub fn new(history: Arc<SyncHistory>) -> Self {
        Self { history }
    }

    pub async fn status(&self, sources: &[ExternalSource], now: DateTime<Utc>) -> IntegrationStatus {
        IntegrationStatus {
            total_sources: sources.len(),
            active_sources: sources.iter().filter(|source| source.active).count(),
            last_sync: sources.iter().filter_map(|source| source.last_sync).max(),
            next_sync: sources
                .iter()
                .map(|source| calculate_next_sync(source, now))
                .min(),
            sync_errors: self.history.error_count().await,
        }
    }
}
