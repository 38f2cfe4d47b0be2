//! In-memory registries for sources and rules, written through to the store

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::errors::IntegrationError;
use crate::domain::{
    EnrichmentRule, ExternalSource, RuleDefinition, RuleId, RuleUpdate, SourceDefinition,
    SourceId, SourceUpdate,
};
use crate::infrastructure::IntegrationStore;

/// Source state before and after an update
#[derive(Debug, Clone)]
pub struct SourceChange {
    pub before: ExternalSource,
    pub after: ExternalSource,
}

impl SourceChange {
    /// The schedule must be (re)started: newly active, or active with a new cadence
    pub fn needs_restart(&self) -> bool {
        self.after.active && (!self.before.active || self.before.cadence != self.after.cadence)
    }

    pub fn deactivated(&self) -> bool {
        self.before.active && !self.after.active
    }
}

/// Registry of configured external sources, ordered by id
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<SourceId, ExternalSource>>,
    store: Arc<dyn IntegrationStore>,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn IntegrationStore>) -> Self {
        Self {
            sources: RwLock::new(BTreeMap::new()),
            store,
        }
    }

    /// Replace the registry contents with what the store holds
    pub async fn load(&self) -> Result<usize, IntegrationError> {
        let loaded = self.store.load_sources().await?;
        let mut sources = self.sources.write().await;
        sources.clear();
        for source in loaded {
            sources.insert(source.id.clone(), source);
        }
        debug!(count = sources.len(), "Loaded sources from store");
        Ok(sources.len())
    }

    pub async fn add(&self, definition: SourceDefinition) -> Result<ExternalSource, IntegrationError> {
        let source = ExternalSource::new(SourceId::generate(), definition)?;
        self.insert(source).await
    }

    /// Store a fully formed source under its own id
    pub async fn insert(&self, source: ExternalSource) -> Result<ExternalSource, IntegrationError> {
        source.validate()?;
        let mut sources = self.sources.write().await;
        self.store.save_source(&source).await?;
        sources.insert(source.id.clone(), source.clone());
        info!(source = %source.id, name = %source.name, category = %source.category, "Added data source");
        Ok(source)
    }

    pub async fn update(
        &self,
        id: &SourceId,
        update: SourceUpdate,
    ) -> Result<SourceChange, IntegrationError> {
        let mut sources = self.sources.write().await;
        let before = sources
            .get(id)
            .cloned()
            .ok_or_else(|| IntegrationError::source_not_found(id))?;

        let mut after = before.clone();
        after.apply(update)?;
        self.store.save_source(&after).await?;
        sources.insert(id.clone(), after.clone());

        debug!(source = %id, "Updated data source");
        Ok(SourceChange { before, after })
    }

    pub async fn delete(&self, id: &SourceId) -> Result<ExternalSource, IntegrationError> {
        let mut sources = self.sources.write().await;
        if !sources.contains_key(id) {
            return Err(IntegrationError::source_not_found(id));
        }
        self.store.delete_source(id).await?;
        let removed = sources
            .remove(id)
            .ok_or_else(|| IntegrationError::source_not_found(id))?;
        info!(source = %id, "Deleted data source");
        Ok(removed)
    }

    pub async fn get(&self, id: &SourceId) -> Option<ExternalSource> {
        self.sources.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<ExternalSource> {
        self.sources.read().await.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }

    /// Stamp a successful sync; a source deleted meanwhile is ignored
    pub async fn record_sync(&self, id: &SourceId, at: DateTime<Utc>) -> Result<(), IntegrationError> {
        let mut sources = self.sources.write().await;
        let Some(current) = sources.get(id) else {
            debug!(source = %id, "Source removed during sync, not recording");
            return Ok(());
        };

        let mut updated = current.clone();
        updated.last_sync = Some(at);
        self.store.save_source(&updated).await?;
        sources.insert(id.clone(), updated);
        Ok(())
    }
}

/// Registry of enrichment rules, ordered by id
pub struct RuleRegistry {
    rules: RwLock<BTreeMap<RuleId, EnrichmentRule>>,
    store: Arc<dyn IntegrationStore>,
}

impl RuleRegistry {
    pub fn new(store: Arc<dyn IntegrationStore>) -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
            store,
        }
    }

    pub async fn load(&self) -> Result<usize, IntegrationError> {
        let loaded = self.store.load_rules().await?;
        let mut rules = self.rules.write().await;
        rules.clear();
        for rule in loaded {
            rules.insert(rule.id.clone(), rule);
        }
        Ok(rules.len())
    }

    pub async fn add(&self, definition: RuleDefinition) -> Result<EnrichmentRule, IntegrationError> {
        self.add_with_id(RuleId::generate(), definition).await
    }

    pub async fn add_with_id(
        &self,
        id: RuleId,
        definition: RuleDefinition,
    ) -> Result<EnrichmentRule, IntegrationError> {
        let rule = EnrichmentRule::new(id, definition, Utc::now())?;
        let mut rules = self.rules.write().await;
        self.store.save_rule(&rule).await?;
        rules.insert(rule.id.clone(), rule.clone());
        info!(rule = %rule.id, name = %rule.name, "Added enrichment rule");
        Ok(rule)
    }

    pub async fn update(
        &self,
        id: &RuleId,
        update: RuleUpdate,
    ) -> Result<EnrichmentRule, IntegrationError> {
        let mut rules = self.rules.write().await;
        let mut rule = rules
            .get(id)
            .cloned()
            .ok_or_else(|| IntegrationError::rule_not_found(id))?;
        rule.apply(update, Utc::now())?;
        self.store.save_rule(&rule).await?;
        rules.insert(id.clone(), rule.clone());
        Ok(rule)
    }

    pub async fn delete(&self, id: &RuleId) -> Result<EnrichmentRule, IntegrationError> {
        let mut rules = self.rules.write().await;
        if !rules.contains_key(id) {
            return Err(IntegrationError::rule_not_found(id));
        }
        self.store.delete_rule(id).await?;
        rules
            .remove(id)
            .ok_or_else(|| IntegrationError::rule_not_found(id))
    }

    pub async fn get(&self, id: &RuleId) -> Option<EnrichmentRule> {
        self.rules.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<EnrichmentRule> {
        self.rules.read().await.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}
