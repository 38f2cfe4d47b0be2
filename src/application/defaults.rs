//! Built-in catalogue seeded into an empty store

use serde_json::{Map, Value, json};

use crate::domain::{
    Condition, ConditionOperator, RateLimit, RatePeriod, RuleDefinition, RuleId, SourceCategory,
    SourceDefinition, SourceId, SyncCadence, Transformation, TransformationKind,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[allow(clippy::too_many_arguments)]
fn source(
    name: &str,
    description: &str,
    category: SourceCategory,
    endpoint: &str,
    active: bool,
    cadence: SyncCadence,
    rate_limit: RateLimit,
    version: &str,
    features: &[&str],
    config: Value,
) -> SourceDefinition {
    SourceDefinition {
        name: name.to_string(),
        description: description.to_string(),
        category,
        endpoint: endpoint.to_string(),
        credential: None,
        active,
        cadence,
        rate_limit,
        version: version.to_string(),
        supported_features: features.iter().map(|f| f.to_string()).collect(),
        config: object(config),
    }
}

/// Default sources keyed by their well-known ids
pub fn default_sources() -> Vec<(SourceId, SourceDefinition)> {
    vec![
        (
            SourceId::new("nvd"),
            source(
                "National Vulnerability Database",
                "NIST National Vulnerability Database for CVE data",
                SourceCategory::Vulnerability,
                "https://services.nvd.nist.gov/rest/json/cves/2.0",
                true,
                SyncCadence::Daily,
                RateLimit::new(50, RatePeriod::Minute),
                "2.0",
                &["cve_search", "cve_history", "cpe_matching"],
                json!({ "query": { "resultsPerPage": 1000, "noRejected": "" } }),
            ),
        ),
        (
            SourceId::new("mitre_attack"),
            source(
                "MITRE ATT&CK",
                "MITRE ATT&CK framework for threat intelligence",
                SourceCategory::ThreatIntelligence,
                "https://attack.mitre.org/api",
                true,
                SyncCadence::Weekly,
                RateLimit::new(100, RatePeriod::Hour),
                "1.0",
                &["techniques", "tactics", "mitigations", "groups"],
                json!({ "include_deprecated": false, "include_revoked": false }),
            ),
        ),
        (
            SourceId::new("cis_controls"),
            source(
                "CIS Controls",
                "Center for Internet Security Controls",
                SourceCategory::Compliance,
                "https://api.cisecurity.org",
                true,
                SyncCadence::Weekly,
                RateLimit::new(1000, RatePeriod::Day),
                "8.0",
                &["controls", "safeguards", "implementation_guides"],
                json!({ "query": { "version": "8.0" }, "include_implementation": true }),
            ),
        ),
        (
            SourceId::new("nmap_scanner"),
            source(
                "Nmap Network Scanner",
                "Network discovery and port scanning",
                SourceCategory::AssetDiscovery,
                "http://localhost:8080/api",
                false,
                SyncCadence::Daily,
                RateLimit::new(10, RatePeriod::Minute),
                "1.0",
                &["port_scan", "os_detection", "service_detection"],
                json!({ "scan_range": "192.168.1.0/24", "scan_type": "syn_scan", "port_range": "1-65535" }),
            ),
        ),
        (
            SourceId::new("aws_cost_explorer"),
            source(
                "AWS Cost Explorer",
                "AWS cost and usage data",
                SourceCategory::CostAnalysis,
                "https://ce.us-east-1.amazonaws.com",
                false,
                SyncCadence::Daily,
                RateLimit::new(100, RatePeriod::Hour),
                "1.0",
                &["cost_analysis", "usage_reports", "forecasting"],
                json!({ "region": "us-east-1", "granularity": "DAILY", "metrics": ["BlendedCost", "UnblendedCost"] }),
            ),
        ),
        (
            SourceId::new("prometheus"),
            source(
                "Prometheus Monitoring",
                "System and application performance metrics",
                SourceCategory::PerformanceMonitoring,
                "http://localhost:9090/api/v1/query",
                false,
                SyncCadence::Realtime,
                RateLimit::new(1000, RatePeriod::Minute),
                "2.0",
                &["metrics_query", "alerts", "recording_rules"],
                json!({ "query": { "query": "up" }, "retention_period": "30d" }),
            ),
        ),
    ]
}

/// Default rules keyed by their well-known ids
pub fn default_rules() -> Vec<(RuleId, RuleDefinition)> {
    vec![
        (
            RuleId::new("cve_enrichment"),
            RuleDefinition {
                name: "CVE Vulnerability Enrichment".to_string(),
                description: "Enrich assets with CVE data based on software versions".to_string(),
                source: SourceId::new("nvd"),
                target_field: "vulnerabilities".to_string(),
                condition: Condition::new("software", ConditionOperator::Contains, json!("")),
                transformation: Transformation::new(TransformationKind::Lookup)
                    .with("lookup_field", json!("software"))
                    .with("match_field", json!("affectedProducts")),
                active: true,
                priority: 1,
            },
        ),
        (
            RuleId::new("threat_intelligence_enrichment"),
            RuleDefinition {
                name: "Threat Intelligence Enrichment".to_string(),
                description: "Enrich assets with threat intelligence data".to_string(),
                source: SourceId::new("mitre_attack"),
                target_field: "threatIntelligence".to_string(),
                condition: Condition::new(
                    "type",
                    ConditionOperator::In,
                    json!(["server", "workstation", "network_device"]),
                ),
                transformation: Transformation::new(TransformationKind::Mapping).with(
                    "asset_type_mapping",
                    json!({
                        "server": "enterprise",
                        "workstation": "endpoint",
                        "network_device": "infrastructure"
                    }),
                ),
                active: true,
                priority: 2,
            },
        ),
        (
            RuleId::new("compliance_enrichment"),
            RuleDefinition {
                name: "Compliance Framework Enrichment".to_string(),
                description: "Enrich assets with compliance framework data".to_string(),
                source: SourceId::new("cis_controls"),
                target_field: "complianceFrameworks".to_string(),
                condition: Condition::new(
                    "criticality",
                    ConditionOperator::In,
                    json!(["critical", "high"]),
                ),
                transformation: Transformation::new(TransformationKind::Mapping).with(
                    "criticality_mapping",
                    json!({
                        "critical": ["CIS_Controls_v8"],
                        "high": ["CIS_Controls_v8", "NIST_CSF"]
                    }),
                ),
                active: true,
                priority: 3,
            },
        ),
    ]
}
