//! Domain entities representing core business concepts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::value_objects::*;

/// Caller-supplied definition of an external source, before an id is assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: SourceCategory,
    pub endpoint: String,
    #[serde(default)]
    pub credential: Option<Credential>,
    #[serde(default)]
    pub active: bool,
    pub cadence: SyncCadence,
    pub rate_limit: RateLimit,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub supported_features: Vec<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// A configured external data feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSource {
    pub id: SourceId,
    pub name: String,
    pub description: String,
    pub category: SourceCategory,
    pub endpoint: String,
    pub credential: Option<Credential>,
    pub active: bool,
    pub cadence: SyncCadence,
    pub last_sync: Option<DateTime<Utc>>,
    pub rate_limit: RateLimit,
    pub version: String,
    pub supported_features: Vec<String>,
    pub config: Map<String, Value>,
}

impl ExternalSource {
    /// Create a new source with validation
    pub fn new(id: SourceId, definition: SourceDefinition) -> Result<Self, DomainError> {
        let source = ExternalSource {
            id,
            name: definition.name.trim().to_string(),
            description: definition.description,
            category: definition.category,
            endpoint: definition.endpoint.trim().to_string(),
            credential: definition.credential,
            active: definition.active,
            cadence: definition.cadence,
            last_sync: None,
            rate_limit: definition.rate_limit,
            version: definition.version,
            supported_features: definition.supported_features,
            config: definition.config,
        };
        source.validate()?;
        Ok(source)
    }

    /// Check the invariants every stored source must satisfy
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidInput {
                field: "name".to_string(),
                message: "Source name cannot be empty".to_string(),
            });
        }

        let parsed = url::Url::parse(&self.endpoint).map_err(|e| DomainError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(DomainError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: "endpoint must be an absolute URL".to_string(),
            });
        }

        if self.rate_limit.requests == 0 {
            return Err(DomainError::InvalidInput {
                field: "rate_limit.requests".to_string(),
                message: "Rate limit must allow at least one request".to_string(),
            });
        }

        Ok(())
    }

    /// Merge a partial update into this source, validating the result.
    ///
    /// The source is left untouched when the merged result is invalid.
    pub fn apply(&mut self, update: SourceUpdate) -> Result<(), DomainError> {
        let mut merged = self.clone();
        if let Some(name) = update.name {
            merged.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            merged.description = description;
        }
        if let Some(category) = update.category {
            merged.category = category;
        }
        if let Some(endpoint) = update.endpoint {
            merged.endpoint = endpoint.trim().to_string();
        }
        if let Some(credential) = update.credential {
            merged.credential = credential;
        }
        if let Some(active) = update.active {
            merged.active = active;
        }
        if let Some(cadence) = update.cadence {
            merged.cadence = cadence;
        }
        if let Some(rate_limit) = update.rate_limit {
            merged.rate_limit = rate_limit;
        }
        if let Some(version) = update.version {
            merged.version = version;
        }
        if let Some(features) = update.supported_features {
            merged.supported_features = features;
        }
        if let Some(config) = update.config {
            merged.config = config;
        }

        merged.validate()?;
        *self = merged;
        Ok(())
    }
}

/// Partial update for a source; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<SourceCategory>,
    pub endpoint: Option<String>,
    /// `Some(None)` removes the stored credential
    pub credential: Option<Option<Credential>>,
    pub active: Option<bool>,
    pub cadence: Option<SyncCadence>,
    pub rate_limit: Option<RateLimit>,
    pub version: Option<String>,
    pub supported_features: Option<Vec<String>>,
    pub config: Option<Map<String, Value>>,
}

impl SourceUpdate {
    pub fn activation(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Default::default()
        }
    }
}

/// Caller-supplied definition of an enrichment rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: SourceId,
    pub target_field: String,
    pub condition: Condition,
    pub transformation: Transformation,
    #[serde(default = "default_rule_active")]
    pub active: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_rule_active() -> bool {
    true
}

/// Declarative condition + transformation pair applied to records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRule {
    pub id: RuleId,
    pub name: String,
    pub description: String,
    pub source: SourceId,
    pub target_field: String,
    pub condition: Condition,
    pub transformation: Transformation,
    /// Lower values are applied first
    pub priority: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentRule {
    pub fn new(
        id: RuleId,
        definition: RuleDefinition,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let rule = EnrichmentRule {
            id,
            name: definition.name.trim().to_string(),
            description: definition.description,
            source: definition.source,
            target_field: definition.target_field.trim().to_string(),
            condition: definition.condition,
            transformation: definition.transformation,
            priority: definition.priority,
            active: definition.active,
            created_at: now,
            updated_at: now,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.is_empty() {
            return Err(DomainError::InvalidInput {
                field: "name".to_string(),
                message: "Rule name cannot be empty".to_string(),
            });
        }
        if self.target_field.is_empty() {
            return Err(DomainError::InvalidInput {
                field: "target_field".to_string(),
                message: "Rule target field cannot be empty".to_string(),
            });
        }
        if self.condition.field.trim().is_empty() {
            return Err(DomainError::InvalidInput {
                field: "condition.field".to_string(),
                message: "Condition field path cannot be empty".to_string(),
            });
        }
        if self.condition.operator == ConditionOperator::Regex {
            if let Err(e) = self.condition.pattern() {
                return Err(DomainError::InvalidInput {
                    field: "condition.value".to_string(),
                    message: format!("Invalid regex pattern: {}", e),
                });
            }
        }
        Ok(())
    }

    /// Merge a partial update, bumping `updated_at`
    pub fn apply(&mut self, update: RuleUpdate, now: DateTime<Utc>) -> Result<(), DomainError> {
        let mut merged = self.clone();
        if let Some(name) = update.name {
            merged.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            merged.description = description;
        }
        if let Some(source) = update.source {
            merged.source = source;
        }
        if let Some(target_field) = update.target_field {
            merged.target_field = target_field.trim().to_string();
        }
        if let Some(condition) = update.condition {
            merged.condition = condition;
        }
        if let Some(transformation) = update.transformation {
            merged.transformation = transformation;
        }
        if let Some(priority) = update.priority {
            merged.priority = priority;
        }
        if let Some(active) = update.active {
            merged.active = active;
        }
        merged.validate()?;
        merged.updated_at = now;
        *self = merged;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<SourceId>,
    pub target_field: Option<String>,
    pub condition: Option<Condition>,
    pub transformation: Option<Transformation>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

/// Timing metadata attached to every sync attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub source_name: String,
    pub version: String,
    pub processing_time_ms: u64,
}

/// Outcome of one sync attempt against one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub source_id: SourceId,
    pub success: bool,
    pub record_count: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub synced_at: DateTime<Utc>,
    pub next_sync: DateTime<Utc>,
    pub metadata: SyncMetadata,
}

impl IntegrationResult {
    /// Start a result for an attempt against `source`; it is successful until marked otherwise
    pub fn begin(source: &ExternalSource, synced_at: DateTime<Utc>, next_sync: DateTime<Utc>) -> Self {
        Self {
            source_id: source.id.clone(),
            success: true,
            record_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            synced_at,
            next_sync,
            metadata: SyncMetadata {
                source_name: source.name.clone(),
                version: source.version.clone(),
                processing_time_ms: 0,
            },
        }
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Connectivity state shared by every resilience-wrapped call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub last_check: DateTime<Utc>,
    pub consecutive_failures: u32,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            last_check: Utc::now(),
            consecutive_failures: 0,
        }
    }
}

/// A domain record (asset) handed to the enrichment engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl AssetRecord {
    pub fn new(id: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    /// Build a record from a JSON object carrying a string `id`
    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        let Value::Object(mut attributes) = value else {
            return Err(DomainError::InvalidInput {
                field: "record".to_string(),
                message: "Record must be a JSON object".to_string(),
            });
        };
        let id = match attributes.remove("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(DomainError::InvalidInput {
                    field: "id".to_string(),
                    message: "Record must carry a non-empty id".to_string(),
                });
            }
        };
        Ok(Self { id, attributes })
    }
}

/// What happened when a matching rule was considered for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    /// A value was written to the rule's target field
    Applied,
    /// The transformation kind has no handler; the rule was considered only
    Deferred,
    /// The external lookup returned nothing (or fell back)
    LookupMiss,
    /// The rule matched but had nothing to write
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub source: SourceId,
    pub target_field: String,
    pub kind: TransformationKind,
    pub outcome: RuleOutcome,
}

/// Enrichment output for a single record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentData {
    pub record_id: String,
    pub fields: Map<String, Value>,
    /// Matching rules in the order they were applied
    pub applied_rules: Vec<AppliedRule>,
    pub enriched_at: Option<DateTime<Utc>>,
}

impl EnrichmentData {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            fields: Map::new(),
            applied_rules: Vec::new(),
            enriched_at: Some(Utc::now()),
        }
    }
}

/// Aggregated view over every configured source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    pub total_sources: usize,
    pub active_sources: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub next_sync: Option<DateTime<Utc>>,
    pub sync_errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub latency_ms: u64,
}
