//! Single-source sync pipeline: executor call under the resilience layer,
//! result assembly and bookkeeping

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::errors::IntegrationError;
use super::registry::SourceRegistry;
use super::scheduler::{SyncRunner, calculate_next_sync};
use super::status::SyncHistory;
use crate::domain::{IntegrationResult, SourceId};
use crate::infrastructure::{Fallback, ResilienceManager, SyncExecutor, is_network_error};

/// Warning attached to results of syncs that could not reach the feed
pub const SERVICE_UNAVAILABLE_WARNING: &str =
    "External service unavailable. Data sync skipped. Will retry when service is available.";

pub struct SyncPipeline {
    sources: Arc<SourceRegistry>,
    executor: Arc<SyncExecutor>,
    resilience: Arc<ResilienceManager>,
    history: Arc<SyncHistory>,
    in_flight: Mutex<HashSet<SourceId>>,
}

/// Marks a source as syncing until dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<SourceId>>,
    id: SourceId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

impl SyncPipeline {
    pub fn new(
        sources: Arc<SourceRegistry>,
        executor: Arc<SyncExecutor>,
        resilience: Arc<ResilienceManager>,
        history: Arc<SyncHistory>,
    ) -> Self {
        Self {
            sources,
            executor,
            resilience,
            history,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, id: &SourceId) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    fn begin(&self, id: &SourceId) -> Result<InFlightGuard<'_>, IntegrationError> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| IntegrationError::SyncInProgress { source_id: id.clone() })?;
        if !set.insert(id.clone()) {
            return Err(IntegrationError::SyncInProgress {
                source_id: id.clone(),
            });
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            id: id.clone(),
        })
    }

    /// Sync one source and record the outcome.
    ///
    /// Feed failures are reported inside the returned result; `Err` is
    /// reserved for an unknown source or a sync already running.
    #[instrument(skip(self), fields(source = %id))]
    pub async fn sync_source(&self, id: &SourceId) -> Result<IntegrationResult, IntegrationError> {
        let source = self
            .sources
            .get(id)
            .await
            .ok_or_else(|| IntegrationError::source_not_found(id))?;
        let _guard = self.begin(id)?;

        let started = Instant::now();
        let synced_at = Utc::now();
        let mut result =
            IntegrationResult::begin(&source, synced_at, calculate_next_sync(&source, synced_at));

        let executor = &self.executor;
        let source_ref = &source;
        let outcome = self
            .resilience
            .execute_with_fallback(
                || async move { executor.sync(source_ref).await.map(Some) },
                Fallback::value(None),
                &format!("sync:{}", source.id),
                self.resilience.default_options().throwing(),
            )
            .await;

        match outcome {
            Ok(Some(batch)) => {
                result.record_count = batch.record_count;
                result.errors.extend(batch.partial_errors);
                if let Err(e) = self.sources.record_sync(id, synced_at).await {
                    warn!(error = %e, "Failed to persist last sync time");
                    result.warn(format!("Failed to persist last sync time: {}", e));
                }
            }
            Ok(None) => {
                warn!("Sync skipped, external service unavailable");
                result.fail("Sync skipped: network unavailable or too many consecutive failures");
                result.warn(SERVICE_UNAVAILABLE_WARNING);
            }
            Err(e) => {
                error!(error = %e, "Sync failed");
                let unavailable =
                    is_network_error(&e) || !self.resilience.is_service_available().await;
                result.fail(e.to_string());
                if unavailable {
                    result.warn(SERVICE_UNAVAILABLE_WARNING);
                }
            }
        }

        result.metadata.processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            success = result.success,
            records = result.record_count,
            processing_time_ms = result.metadata.processing_time_ms,
            "Sync attempt finished"
        );

        self.history.record(result.clone()).await;
        Ok(result)
    }
}

#[async_trait]
impl SyncRunner for SyncPipeline {
    async fn run_sync(&self, id: &SourceId) -> Result<IntegrationResult, IntegrationError> {
        self.sync_source(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::{ApiError, SyncError};
    use crate::domain::{
        ExternalSource, RateLimit, RatePeriod, SourceCategory, SourceDefinition, SyncCadence,
    };
    use crate::infrastructure::{
        AssumeOnline, InMemoryIntegrationStore, ResiliencePolicy, SourceAdapter, SyncBatch,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    enum Behaviour {
        Records(u64, Vec<String>),
        Unauthorized,
        Network,
        Block(Arc<Notify>),
    }

    struct ScriptedAdapter {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn category(&self) -> SourceCategory {
            SourceCategory::Vulnerability
        }

        async fn sync(&self, _source: &ExternalSource) -> Result<SyncBatch, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Records(count, errors) => Ok(SyncBatch {
                    record_count: *count,
                    partial_errors: errors.clone(),
                }),
                Behaviour::Unauthorized => Err(ApiError::Authentication.into()),
                Behaviour::Network => Err(SyncError::other("connection refused")),
                Behaviour::Block(release) => {
                    release.notified().await;
                    Ok(SyncBatch::default())
                }
            }
        }

        async fn test_connection(&self, _source: &ExternalSource) -> Result<(), SyncError> {
            Ok(())
        }
    }

    struct Fixture {
        pipeline: Arc<SyncPipeline>,
        sources: Arc<SourceRegistry>,
        resilience: Arc<ResilienceManager>,
        history: Arc<SyncHistory>,
        adapter: Arc<ScriptedAdapter>,
    }

    fn definition(category: SourceCategory) -> SourceDefinition {
        SourceDefinition {
            name: "Scripted".to_string(),
            description: String::new(),
            category,
            endpoint: "https://feed.example.com".to_string(),
            credential: None,
            active: true,
            cadence: SyncCadence::Daily,
            rate_limit: RateLimit::new(100, RatePeriod::Minute),
            version: "1.0".to_string(),
            supported_features: vec![],
            config: Default::default(),
        }
    }

    fn fixture(behaviour: Behaviour) -> Fixture {
        let adapter = Arc::new(ScriptedAdapter {
            behaviour,
            calls: AtomicUsize::new(0),
        });
        let mut executor = SyncExecutor::empty();
        executor.register(adapter.clone());

        let mut policy = ResiliencePolicy::default();
        policy.default_options.retry_delay = Duration::from_millis(1);
        let resilience = Arc::new(ResilienceManager::new(policy, Arc::new(AssumeOnline)));
        let sources = Arc::new(SourceRegistry::new(Arc::new(InMemoryIntegrationStore::new())));
        let history = Arc::new(SyncHistory::new(10));

        let pipeline = Arc::new(SyncPipeline::new(
            sources.clone(),
            Arc::new(executor),
            resilience.clone(),
            history.clone(),
        ));
        Fixture {
            pipeline,
            sources,
            resilience,
            history,
            adapter,
        }
    }

    #[tokio::test]
    async fn test_successful_sync_updates_last_sync() {
        let fx = fixture(Behaviour::Records(12, vec!["record 3: missing id".to_string()]));
        let source = fx.sources.add(definition(SourceCategory::Vulnerability)).await.unwrap();

        let result = fx.pipeline.sync_source(&source.id).await.unwrap();
        assert!(result.success);
        assert_eq!(result.record_count, 12);
        assert_eq!(result.errors, vec!["record 3: missing id".to_string()]);
        assert_eq!(result.metadata.source_name, "Scripted");
        assert_eq!(result.next_sync - result.synced_at, chrono::Duration::days(1));

        let stored = fx.sources.get(&source.id).await.unwrap();
        assert_eq!(stored.last_sync, Some(result.synced_at));
        assert_eq!(fx.history.len().await, 1);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_retried() {
        let fx = fixture(Behaviour::Unauthorized);
        let source = fx.sources.add(definition(SourceCategory::Vulnerability)).await.unwrap();

        let result = fx.pipeline.sync_source(&source.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.errors, vec!["API error: Authentication failed".to_string()]);
        assert!(result.warnings.is_empty());
        assert_eq!(fx.adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.resilience.network_status().await.consecutive_failures, 0);
        assert!(fx.sources.get(&source.id).await.unwrap().last_sync.is_none());
    }

    #[tokio::test]
    async fn test_network_error_retries_then_warns() {
        let fx = fixture(Behaviour::Network);
        let source = fx.sources.add(definition(SourceCategory::Vulnerability)).await.unwrap();

        let result = fx.pipeline.sync_source(&source.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.warnings, vec![SERVICE_UNAVAILABLE_WARNING.to_string()]);
        assert_eq!(fx.adapter.calls.load(Ordering::SeqCst), 3);
        assert_eq!(fx.history.error_count().await, 1);
    }

    #[tokio::test]
    async fn test_offline_skips_call() {
        let fx = fixture(Behaviour::Records(1, vec![]));
        let source = fx.sources.add(definition(SourceCategory::Vulnerability)).await.unwrap();
        fx.resilience.set_online(false).await;

        let result = fx.pipeline.sync_source(&source.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.warnings, vec![SERVICE_UNAVAILABLE_WARNING.to_string()]);
        assert_eq!(fx.adapter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_category_fails_only_that_sync() {
        let fx = fixture(Behaviour::Records(1, vec![]));
        let source = fx.sources.add(definition(SourceCategory::CostAnalysis)).await.unwrap();

        let result = fx.pipeline.sync_source(&source.id).await.unwrap();
        assert!(!result.success);
        assert_eq!(
            result.errors,
            vec!["Unsupported data source category: cost_analysis".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unknown_source_is_not_found() {
        let fx = fixture(Behaviour::Records(1, vec![]));
        let err = fx
            .pipeline
            .sync_source(&SourceId::new("source-missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_sync_of_same_source_is_rejected() {
        let release = Arc::new(Notify::new());
        let fx = fixture(Behaviour::Block(release.clone()));
        let source = fx.sources.add(definition(SourceCategory::Vulnerability)).await.unwrap();

        let pipeline = fx.pipeline.clone();
        let id = source.id.clone();
        let first = tokio::spawn(async move { pipeline.sync_source(&id).await });

        while !fx.pipeline.is_in_flight(&source.id) {
            tokio::task::yield_now().await;
        }
        let second = fx.pipeline.sync_source(&source.id).await;
        assert!(matches!(second, Err(IntegrationError::SyncInProgress { .. })));

        release.notify_one();
        assert!(first.await.unwrap().unwrap().success);
        assert!(!fx.pipeline.is_in_flight(&source.id));
    }
}
