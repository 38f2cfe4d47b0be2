//! Persistence for configured sources and rules

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::application::errors::StoreError;
use crate::domain::{EnrichmentRule, ExternalSource, RuleId, SourceId};

/// Store for the source and rule catalogue
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    async fn load_sources(&self) -> Result<Vec<ExternalSource>, StoreError>;

    async fn save_source(&self, source: &ExternalSource) -> Result<(), StoreError>;

    async fn delete_source(&self, id: &SourceId) -> Result<(), StoreError>;

    async fn load_rules(&self) -> Result<Vec<EnrichmentRule>, StoreError>;

    async fn save_rule(&self, rule: &EnrichmentRule) -> Result<(), StoreError>;

    async fn delete_rule(&self, id: &RuleId) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    sources: BTreeMap<SourceId, ExternalSource>,
    #[serde(default)]
    rules: BTreeMap<RuleId, EnrichmentRule>,
}

/// Process-local store; contents are lost on restart
#[derive(Default)]
pub struct InMemoryIntegrationStore {
    snapshot: RwLock<Snapshot>,
}

impl InMemoryIntegrationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn load_sources(&self) -> Result<Vec<ExternalSource>, StoreError> {
        Ok(self.snapshot.read().await.sources.values().cloned().collect())
    }

    async fn save_source(&self, source: &ExternalSource) -> Result<(), StoreError> {
        self.snapshot
            .write()
            .await
            .sources
            .insert(source.id.clone(), source.clone());
        Ok(())
    }

    async fn delete_source(&self, id: &SourceId) -> Result<(), StoreError> {
        self.snapshot.write().await.sources.remove(id);
        Ok(())
    }

    async fn load_rules(&self) -> Result<Vec<EnrichmentRule>, StoreError> {
        Ok(self.snapshot.read().await.rules.values().cloned().collect())
    }

    async fn save_rule(&self, rule: &EnrichmentRule) -> Result<(), StoreError> {
        self.snapshot
            .write()
            .await
            .rules
            .insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<(), StoreError> {
        self.snapshot.write().await.rules.remove(id);
        Ok(())
    }
}

/// Store persisting the whole catalogue to a single JSON document.
///
/// Every mutation rewrites the document through a temporary file and a
/// rename, so readers never observe a partial write.
pub struct JsonFileIntegrationStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl JsonFileIntegrationStore {
    /// Open the store at `path`, starting empty when the file does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No catalogue file yet, starting empty");
                Snapshot::default()
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read catalogue file");
                return Err(e.into());
            }
        };

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content).await.map_err(|e| {
            error!("Failed to write temporary catalogue file: {}", e);
            e
        })?;
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            error!("Failed to rename catalogue file: {}", e);
            e
        })?;

        debug!(
            path = %self.path.display(),
            sources = snapshot.sources.len(),
            rules = snapshot.rules.len(),
            "Persisted catalogue"
        );
        Ok(())
    }

    async fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Snapshot) + Send,
    {
        let mut snapshot = self.snapshot.lock().await;
        let mut next = snapshot.clone();
        change(&mut next);
        self.persist(&next).await?;
        *snapshot = next;
        Ok(())
    }
}

#[async_trait]
impl IntegrationStore for JsonFileIntegrationStore {
    async fn load_sources(&self) -> Result<Vec<ExternalSource>, StoreError> {
        Ok(self.snapshot.lock().await.sources.values().cloned().collect())
    }

    async fn save_source(&self, source: &ExternalSource) -> Result<(), StoreError> {
        let source = source.clone();
        self.mutate(move |s| {
            s.sources.insert(source.id.clone(), source);
        })
        .await
    }

    async fn delete_source(&self, id: &SourceId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.sources.remove(id);
        })
        .await
    }

    async fn load_rules(&self) -> Result<Vec<EnrichmentRule>, StoreError> {
        Ok(self.snapshot.lock().await.rules.values().cloned().collect())
    }

    async fn save_rule(&self, rule: &EnrichmentRule) -> Result<(), StoreError> {
        let rule = rule.clone();
        self.mutate(move |s| {
            s.rules.insert(rule.id.clone(), rule);
        })
        .await
    }

    async fn delete_rule(&self, id: &RuleId) -> Result<(), StoreError> {
        self.mutate(|s| {
            s.rules.remove(id);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Condition, ConditionOperator, Credential, RuleDefinition, SourceCategory, Transformation,
        TransformationKind,
    };
    use crate::infrastructure::adapters::test_source;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn rule(source: &SourceId) -> EnrichmentRule {
        EnrichmentRule::new(
            RuleId::new("rule-os"),
            RuleDefinition {
                name: "OS tag".to_string(),
                description: String::new(),
                source: source.clone(),
                target_field: "tags.os".to_string(),
                condition: Condition::new("os", ConditionOperator::Contains, json!("linux")),
                transformation: Transformation::new(TransformationKind::Direct)
                    .with("value", json!("linux")),
                active: true,
                priority: 1,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryIntegrationStore::new();
        let source = test_source(SourceCategory::Vulnerability, "https://nvd.example.com");
        store.save_source(&source).await.unwrap();
        store.save_rule(&rule(&source.id)).await.unwrap();

        assert_eq!(store.load_sources().await.unwrap().len(), 1);
        assert_eq!(store.load_rules().await.unwrap().len(), 1);

        store.delete_source(&source.id).await.unwrap();
        store.delete_rule(&RuleId::new("rule-os")).await.unwrap();
        assert!(store.load_sources().await.unwrap().is_empty());
        assert!(store.load_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("catalogue.json");

        let mut source = test_source(SourceCategory::ThreatIntelligence, "https://otx.example.com");
        source.credential = Some(Credential::new("otx-key"));
        {
            let store = JsonFileIntegrationStore::open(&path).await.unwrap();
            store.save_source(&source).await.unwrap();
            store.save_rule(&rule(&source.id)).await.unwrap();
        }

        let reopened = JsonFileIntegrationStore::open(&path).await.unwrap();
        let sources = reopened.load_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, source.id);
        assert_eq!(
            sources[0].credential.as_ref().map(Credential::expose),
            Some("otx-key")
        );
        assert_eq!(reopened.load_rules().await.unwrap()[0].target_field, "tags.os");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_json_store_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileIntegrationStore::open(temp_dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(store.load_sources().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalogue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = JsonFileIntegrationStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
