//! Domain value objects representing immutable concepts

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use super::errors::DomainError;

/// Identifier of a configured external source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a newly registered source
    pub fn generate() -> Self {
        Self(format!("source-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of an enrichment rule
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("rule-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of data an external source provides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Vulnerability,
    ThreatIntelligence,
    Compliance,
    AssetDiscovery,
    CostAnalysis,
    PerformanceMonitoring,
}

impl SourceCategory {
    /// Get all supported categories
    pub fn all() -> [SourceCategory; 6] {
        [
            SourceCategory::Vulnerability,
            SourceCategory::ThreatIntelligence,
            SourceCategory::Compliance,
            SourceCategory::AssetDiscovery,
            SourceCategory::CostAnalysis,
            SourceCategory::PerformanceMonitoring,
        ]
    }

    /// Canonical tag used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Vulnerability => "vulnerability",
            SourceCategory::ThreatIntelligence => "threat_intelligence",
            SourceCategory::Compliance => "compliance",
            SourceCategory::AssetDiscovery => "asset_discovery",
            SourceCategory::CostAnalysis => "cost_analysis",
            SourceCategory::PerformanceMonitoring => "performance_monitoring",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceCategory::all()
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::InvalidCategory {
                category: s.to_string(),
            })
    }
}

/// How often a source is synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCadence {
    Realtime,
    Hourly,
    Daily,
    Weekly,
}

impl SyncCadence {
    /// Fixed period between two scheduled syncs
    pub fn interval(&self) -> Duration {
        match self {
            SyncCadence::Realtime => Duration::from_secs(60),
            SyncCadence::Hourly => Duration::from_secs(60 * 60),
            SyncCadence::Daily => Duration::from_secs(24 * 60 * 60),
            SyncCadence::Weekly => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Same period as [`SyncCadence::interval`], for wall-clock arithmetic
    pub fn as_chrono(&self) -> chrono::Duration {
        match self {
            SyncCadence::Realtime => chrono::Duration::minutes(1),
            SyncCadence::Hourly => chrono::Duration::hours(1),
            SyncCadence::Daily => chrono::Duration::days(1),
            SyncCadence::Weekly => chrono::Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCadence::Realtime => "realtime",
            SyncCadence::Hourly => "hourly",
            SyncCadence::Daily => "daily",
            SyncCadence::Weekly => "weekly",
        }
    }
}

impl fmt::Display for SyncCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncCadence {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realtime" => Ok(SyncCadence::Realtime),
            "hourly" => Ok(SyncCadence::Hourly),
            "daily" => Ok(SyncCadence::Daily),
            "weekly" => Ok(SyncCadence::Weekly),
            _ => Err(DomainError::InvalidCadence {
                cadence: s.to_string(),
            }),
        }
    }
}

/// Window over which a rate limit is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatePeriod {
    Minute,
    Hour,
    Day,
}

impl RatePeriod {
    pub fn window(&self) -> Duration {
        match self {
            RatePeriod::Minute => Duration::from_secs(60),
            RatePeriod::Hour => Duration::from_secs(60 * 60),
            RatePeriod::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Maximum number of requests a source accepts per period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u32,
    pub period: RatePeriod,
}

impl RateLimit {
    pub fn new(requests: u32, period: RatePeriod) -> Self {
        Self { requests, period }
    }
}

/// Opaque credential attached to outgoing requests.
///
/// Never rendered by `Debug` so it cannot leak through logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Comparison applied by a rule condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    In,
    NotIn,
}

/// Predicate over one field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the record, e.g. `network.segment`
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(skip)]
    compiled: CompiledPattern,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        operator: ConditionOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            compiled: CompiledPattern::default(),
        }
    }

    /// Pattern of a `regex` condition, compiled once per condition
    pub fn pattern(&self) -> Result<Cow<'_, Regex>, regex::Error> {
        self.compiled
            .get_or_compile(&super::services::stringify(&self.value))
    }
}

/// Lazily compiled regex of a condition, keyed by the pattern it was built from
#[derive(Clone, Default)]
struct CompiledPattern(OnceLock<(String, Option<Regex>)>);

impl CompiledPattern {
    fn get_or_compile(&self, pattern: &str) -> Result<Cow<'_, Regex>, regex::Error> {
        let (cached_pattern, cached) = self
            .0
            .get_or_init(|| (pattern.to_string(), Regex::new(pattern).ok()));
        match cached {
            Some(regex) if cached_pattern == pattern => Ok(Cow::Borrowed(regex)),
            _ => Regex::new(pattern).map(Cow::Owned),
        }
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledPattern")
    }
}

// Derived cache state never affects equality
impl PartialEq for CompiledPattern {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// How a matching rule derives its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationKind {
    Direct,
    Mapping,
    Calculation,
    Lookup,
}

impl TransformationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformationKind::Direct => "direct",
            TransformationKind::Mapping => "mapping",
            TransformationKind::Calculation => "calculation",
            TransformationKind::Lookup => "lookup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub kind: TransformationKind,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Transformation {
    pub fn new(kind: TransformationKind) -> Self {
        Self {
            kind,
            config: serde_json::Map::new(),
        }
    }

    /// Add a config entry, builder style
    pub fn with(mut self, key: &str, value: serde_json::Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    /// Read a string entry from the config map
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}
