//! Category-specific adapters for external data feeds

pub mod asset_discovery;
pub mod compliance;
pub mod cost_analysis;
pub mod http;
pub mod performance;
pub mod threat_intel;
pub mod traits;
pub mod vulnerability;

pub use asset_discovery::AssetDiscoveryAdapter;
pub use compliance::ComplianceAdapter;
pub use cost_analysis::CostAnalysisAdapter;
pub use http::{FeedClient, RateLimiter, extract_records, require_any};
pub use performance::PerformanceAdapter;
pub use threat_intel::ThreatIntelAdapter;
pub use traits::{SourceAdapter, SyncBatch};
pub use vulnerability::VulnerabilityAdapter;

#[cfg(test)]
pub(crate) fn test_source(
    category: crate::domain::SourceCategory,
    endpoint: &str,
) -> crate::domain::ExternalSource {
    use crate::domain::*;

    ExternalSource::new(
        SourceId::new(format!("source-{}", category)),
        SourceDefinition {
            name: format!("{} feed", category),
            description: String::new(),
            category,
            endpoint: endpoint.to_string(),
            credential: None,
            active: true,
            cadence: SyncCadence::Daily,
            rate_limit: RateLimit::new(100, RatePeriod::Hour),
            version: "1.0".to_string(),
            supported_features: Vec::new(),
            config: serde_json::Map::new(),
        },
    )
    .expect("test source should be valid")
}

#[cfg(test)]
pub(crate) fn test_client() -> std::sync::Arc<FeedClient> {
    std::sync::Arc::new(
        FeedClient::new("asset-enrichment-test", std::time::Duration::from_secs(5))
            .expect("client should build"),
    )
}
