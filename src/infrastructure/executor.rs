//! Dispatch of sync calls to the adapter registered for a source category

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::adapters::{
    AssetDiscoveryAdapter, ComplianceAdapter, CostAnalysisAdapter, FeedClient, PerformanceAdapter,
    SourceAdapter, SyncBatch, ThreatIntelAdapter, VulnerabilityAdapter,
};
use crate::application::errors::SyncError;
use crate::config::HttpConfig;
use crate::domain::{ExternalSource, SourceCategory};

/// Category-keyed adapter table
#[derive(Default, Clone)]
pub struct SyncExecutor {
    adapters: HashMap<SourceCategory, Arc<dyn SourceAdapter>>,
}

impl SyncExecutor {
    /// Executor with no adapters; every category is unsupported until registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// Executor wired with the built-in adapter for every category
    pub fn with_default_adapters(config: &HttpConfig) -> Result<Self, SyncError> {
        let client = Arc::new(FeedClient::new(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_seconds),
        )?);

        let mut executor = Self::empty();
        executor.register(Arc::new(VulnerabilityAdapter::new(client.clone())));
        executor.register(Arc::new(ThreatIntelAdapter::new(client.clone())));
        executor.register(Arc::new(ComplianceAdapter::new(client.clone())));
        executor.register(Arc::new(AssetDiscoveryAdapter::new(client.clone())));
        executor.register(Arc::new(CostAnalysisAdapter::new(client.clone())));
        executor.register(Arc::new(PerformanceAdapter::new(client)));
        Ok(executor)
    }

    /// Register an adapter, replacing any previous one for its category
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        debug!(category = %adapter.category(), "Registering source adapter");
        self.adapters.insert(adapter.category(), adapter);
    }

    pub fn adapter_for(&self, category: SourceCategory) -> Result<Arc<dyn SourceAdapter>, SyncError> {
        self.adapters
            .get(&category)
            .cloned()
            .ok_or(SyncError::UnsupportedCategory { category })
    }

    pub async fn sync(&self, source: &ExternalSource) -> Result<SyncBatch, SyncError> {
        self.adapter_for(source.category)?.sync(source).await
    }

    pub async fn test_connection(&self, source: &ExternalSource) -> Result<(), SyncError> {
        self.adapter_for(source.category)?
            .test_connection(source)
            .await
    }
}
