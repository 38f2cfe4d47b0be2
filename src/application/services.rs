//! Integration service facade

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::defaults::{default_rules, default_sources};
use super::enrichment::{EnrichmentRuleEngine, LookupProvider};
use super::errors::IntegrationError;
use super::registry::{RuleRegistry, SourceRegistry};
use super::scheduler::SyncScheduler;
use super::status::{IntegrationStatusAggregator, SyncHistory};
use super::sync::SyncPipeline;
use crate::config::{Config, SchedulerConfig};
use crate::domain::{
    AssetRecord, ConnectionTestResult, EnrichmentData, EnrichmentRule, ExternalSource,
    IntegrationResult, IntegrationStatus, NetworkStatus, RuleDefinition, RuleId, RuleUpdate,
    SourceDefinition, SourceId, SourceUpdate,
};
use crate::infrastructure::{
    HttpConnectivityProbe, InMemoryIntegrationStore, IntegrationStore, JsonFileIntegrationStore,
    ResilienceManager, ResiliencePolicy, SyncExecutor,
};

/// Supplier of the domain records to enrich
#[async_trait]
pub trait RecordProvider: Send + Sync {
    async fn records(&self) -> Result<Vec<AssetRecord>, IntegrationError>;
}

/// Operations exposed to callers of the engine
#[async_trait]
pub trait IntegrationService: Send + Sync {
    async fn add_source(&self, definition: SourceDefinition) -> Result<ExternalSource, IntegrationError>;

    async fn update_source(
        &self,
        id: &SourceId,
        update: SourceUpdate,
    ) -> Result<ExternalSource, IntegrationError>;

    async fn delete_source(&self, id: &SourceId) -> Result<(), IntegrationError>;

    async fn list_sources(&self) -> Vec<ExternalSource>;

    async fn get_source(&self, id: &SourceId) -> Option<ExternalSource>;

    async fn add_rule(&self, definition: RuleDefinition) -> Result<EnrichmentRule, IntegrationError>;

    async fn update_rule(
        &self,
        id: &RuleId,
        update: RuleUpdate,
    ) -> Result<EnrichmentRule, IntegrationError>;

    async fn delete_rule(&self, id: &RuleId) -> Result<(), IntegrationError>;

    async fn list_rules(&self) -> Vec<EnrichmentRule>;

    async fn get_rule(&self, id: &RuleId) -> Option<EnrichmentRule>;

    async fn trigger_sync(&self, id: &SourceId) -> Result<IntegrationResult, IntegrationError>;

    async fn test_connection(&self, id: &SourceId) -> ConnectionTestResult;

    async fn get_integration_status(&self) -> IntegrationStatus;

    async fn enrich_records(&self, records: &[AssetRecord]) -> HashMap<String, EnrichmentData>;

    async fn enrich_from_provider(
        &self,
        provider: &dyn RecordProvider,
    ) -> Result<HashMap<String, EnrichmentData>, IntegrationError>;

    async fn network_status(&self) -> NetworkStatus;
}

/// Service implementation wiring registries, scheduler, resilience and enrichment
pub struct IntegrationServiceImpl {
    sources: Arc<SourceRegistry>,
    rules: Arc<RuleRegistry>,
    executor: Arc<SyncExecutor>,
    resilience: Arc<ResilienceManager>,
    pipeline: Arc<SyncPipeline>,
    scheduler: SyncScheduler,
    engine: EnrichmentRuleEngine,
    status: IntegrationStatusAggregator,
    history: Arc<SyncHistory>,
    monitor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    /// Serializes registry changes with the matching schedule transition
    lifecycle: Mutex<()>,
    seed_defaults: bool,
}

impl IntegrationServiceImpl {
    pub fn new(
        store: Arc<dyn IntegrationStore>,
        executor: SyncExecutor,
        resilience: Arc<ResilienceManager>,
        config: &SchedulerConfig,
    ) -> Self {
        let sources = Arc::new(SourceRegistry::new(store.clone()));
        let rules = Arc::new(RuleRegistry::new(store));
        let executor = Arc::new(executor);
        let history = Arc::new(SyncHistory::new(config.history_limit));
        let pipeline = Arc::new(SyncPipeline::new(
            sources.clone(),
            executor.clone(),
            resilience.clone(),
            history.clone(),
        ));

        Self {
            sources,
            rules,
            executor,
            scheduler: SyncScheduler::new(pipeline.clone()),
            pipeline,
            engine: EnrichmentRuleEngine::new(resilience.clone()),
            status: IntegrationStatusAggregator::new(history.clone()),
            history,
            resilience,
            monitor: Mutex::new(None),
            lifecycle: Mutex::new(()),
            seed_defaults: config.seed_defaults,
        }
    }

    /// Build the service from configuration with the HTTP adapters and probe
    pub async fn from_config(config: &Config) -> Result<Self, IntegrationError> {
        if config.resilience.max_consecutive_failures == 0 {
            return Err(IntegrationError::Configuration {
                message: "resilience.max_consecutive_failures must be at least 1".to_string(),
            });
        }
        if config.resilience.probe_interval_seconds == 0 {
            return Err(IntegrationError::Configuration {
                message: "resilience.probe_interval_seconds must be at least 1".to_string(),
            });
        }

        let store: Arc<dyn IntegrationStore> = match &config.store.path {
            Some(path) => Arc::new(JsonFileIntegrationStore::open(path).await?),
            None => Arc::new(InMemoryIntegrationStore::new()),
        };

        let executor = SyncExecutor::with_default_adapters(&config.http)?;
        let probe = HttpConnectivityProbe::new(
            config.resilience.probe_url.clone(),
            Duration::from_millis(config.resilience.probe_timeout_ms),
        )?;
        let resilience = Arc::new(ResilienceManager::new(
            ResiliencePolicy::from(&config.resilience),
            Arc::new(probe),
        ));

        Ok(Self::new(store, executor, resilience, &config.scheduler))
    }

    /// Route `lookup` transformations through `provider`
    pub fn with_lookup(mut self, provider: Arc<dyn LookupProvider>) -> Self {
        self.engine = EnrichmentRuleEngine::new(self.resilience.clone()).with_lookup(provider);
        self
    }

    pub fn resilience(&self) -> &Arc<ResilienceManager> {
        &self.resilience
    }

    pub fn history(&self) -> &Arc<SyncHistory> {
        &self.history
    }

    /// Load the catalogue, seed defaults into an empty store, schedule active
    /// sources and start the connectivity probe
    pub async fn bootstrap(&self) -> Result<(), IntegrationError> {
        let _lifecycle = self.lifecycle.lock().await;
        let source_count = self.sources.load().await?;
        let rule_count = self.rules.load().await?;

        if source_count == 0 && rule_count == 0 && self.seed_defaults {
            info!("Catalogue is empty, seeding default sources and rules");
            for (id, definition) in default_sources() {
                self.sources
                    .insert(ExternalSource::new(id, definition)?)
                    .await?;
            }
            for (id, definition) in default_rules() {
                self.rules.add_with_id(id, definition).await?;
            }
        }

        let mut scheduled = 0;
        for source in self.sources.list().await {
            if source.active {
                self.scheduler.start_sync(&source.id, source.cadence).await;
                scheduled += 1;
            }
        }

        self.start_monitoring().await;

        let sources = self.sources.list().await.len();
        let rules = self.rules.list().await.len();
        info!(sources, rules, scheduled, "Integration service bootstrapped");
        Ok(())
    }

    /// Start the periodic connectivity probe; a running probe is left untouched
    pub async fn start_monitoring(&self) {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_none() {
            let cancel = CancellationToken::new();
            let handle = self.resilience.start_monitoring(cancel.clone());
            *monitor = Some((cancel, handle));
        }
    }

    pub async fn scheduled_sources(&self) -> Vec<SourceId> {
        self.scheduler.scheduled_sources().await
    }

    /// Stop every schedule and the connectivity probe
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        if let Some((cancel, handle)) = self.monitor.lock().await.take() {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "Connectivity monitor ended abnormally");
            }
        }
        info!("Integration service stopped");
    }
}

#[async_trait]
impl IntegrationService for IntegrationServiceImpl {
    async fn add_source(&self, definition: SourceDefinition) -> Result<ExternalSource, IntegrationError> {
        let _lifecycle = self.lifecycle.lock().await;
        let source = self.sources.add(definition).await?;
        if source.active {
            self.scheduler.start_sync(&source.id, source.cadence).await;
        }
        Ok(source)
    }

    async fn update_source(
        &self,
        id: &SourceId,
        update: SourceUpdate,
    ) -> Result<ExternalSource, IntegrationError> {
        let _lifecycle = self.lifecycle.lock().await;
        let change = self.sources.update(id, update).await?;
        if change.needs_restart() {
            self.scheduler.start_sync(id, change.after.cadence).await;
        } else if change.deactivated() {
            self.scheduler.stop_sync(id).await;
        }
        Ok(change.after)
    }

    async fn delete_source(&self, id: &SourceId) -> Result<(), IntegrationError> {
        let _lifecycle = self.lifecycle.lock().await;
        // a failed store delete keeps the source and its schedule
        self.sources.delete(id).await?;
        self.scheduler.stop_sync(id).await;
        Ok(())
    }

    async fn list_sources(&self) -> Vec<ExternalSource> {
        self.sources.list().await
    }

    async fn get_source(&self, id: &SourceId) -> Option<ExternalSource> {
        self.sources.get(id).await
    }

    async fn add_rule(&self, definition: RuleDefinition) -> Result<EnrichmentRule, IntegrationError> {
        self.rules.add(definition).await
    }

    async fn update_rule(
        &self,
        id: &RuleId,
        update: RuleUpdate,
    ) -> Result<EnrichmentRule, IntegrationError> {
        self.rules.update(id, update).await
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<(), IntegrationError> {
        self.rules.delete(id).await?;
        Ok(())
    }

    async fn list_rules(&self) -> Vec<EnrichmentRule> {
        self.rules.list().await
    }

    async fn get_rule(&self, id: &RuleId) -> Option<EnrichmentRule> {
        self.rules.get(id).await
    }

    async fn trigger_sync(&self, id: &SourceId) -> Result<IntegrationResult, IntegrationError> {
        self.pipeline.sync_source(id).await
    }

    #[instrument(skip(self), fields(source = %id))]
    async fn test_connection(&self, id: &SourceId) -> ConnectionTestResult {
        let Some(source) = self.sources.get(id).await else {
            return ConnectionTestResult {
                success: false,
                message: "Data source not found".to_string(),
                latency_ms: 0,
            };
        };

        if !self.resilience.is_service_available().await {
            return ConnectionTestResult {
                success: false,
                message: "Network unavailable. Cannot test connection.".to_string(),
                latency_ms: 0,
            };
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.resilience.policy().call_timeout,
            self.executor.test_connection(&source),
        )
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(())) => ConnectionTestResult {
                success: true,
                message: "Connection successful".to_string(),
                latency_ms,
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Connection test failed");
                ConnectionTestResult {
                    success: false,
                    message: e.to_string(),
                    latency_ms,
                }
            }
            Err(_) => ConnectionTestResult {
                success: false,
                message: format!("Connection timed out after {}ms", latency_ms),
                latency_ms,
            },
        }
    }

    async fn get_integration_status(&self) -> IntegrationStatus {
        let sources = self.sources.list().await;
        self.status.status(&sources, Utc::now()).await
    }

    async fn enrich_records(&self, records: &[AssetRecord]) -> HashMap<String, EnrichmentData> {
        let rules = self.rules.list().await;
        self.engine.enrich_records(records, &rules).await
    }

    async fn enrich_from_provider(
        &self,
        provider: &dyn RecordProvider,
    ) -> Result<HashMap<String, EnrichmentData>, IntegrationError> {
        let records = provider.records().await?;
        Ok(self.enrich_records(&records).await)
    }

    async fn network_status(&self) -> NetworkStatus {
        self.resilience.network_status().await
    }
}
