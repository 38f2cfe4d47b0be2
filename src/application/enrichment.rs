//! Declarative rule evaluation over asset records

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::errors::SyncError;
use crate::domain::{
    AppliedRule, AssetRecord, EnrichmentData, EnrichmentRule, RuleOutcome, TransformationKind,
    applicable_rules, assign_path, evaluate_condition, resolve_record_field,
};
use crate::infrastructure::{Fallback, ResilienceManager};

/// External lookup backing `lookup` transformations
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Resolve `key` for `rule`; `Ok(None)` when the source has no entry
    async fn lookup(&self, rule: &EnrichmentRule, key: &Value) -> Result<Option<Value>, SyncError>;
}

/// Evaluates active rules against records.
///
/// Conditions always read the original record, so no rule observes the
/// output of another rule within one pass.
pub struct EnrichmentRuleEngine {
    resilience: Arc<ResilienceManager>,
    lookup: Option<Arc<dyn LookupProvider>>,
}

impl EnrichmentRuleEngine {
    pub fn new(resilience: Arc<ResilienceManager>) -> Self {
        Self {
            resilience,
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, provider: Arc<dyn LookupProvider>) -> Self {
        self.lookup = Some(provider);
        self
    }

    /// Enrich every record; the result is keyed by record id (last one wins on duplicates)
    pub async fn enrich_records(
        &self,
        records: &[AssetRecord],
        rules: &[EnrichmentRule],
    ) -> HashMap<String, EnrichmentData> {
        let ordered = applicable_rules(rules);
        let mut enriched = HashMap::with_capacity(records.len());
        for record in records {
            let data = self.enrich_with(record, &ordered).await;
            enriched.insert(record.id.clone(), data);
        }
        debug!(
            records = records.len(),
            rules = ordered.len(),
            "Enrichment pass completed"
        );
        enriched
    }

    pub async fn enrich_record(&self, record: &AssetRecord, rules: &[EnrichmentRule]) -> EnrichmentData {
        self.enrich_with(record, &applicable_rules(rules)).await
    }

    async fn enrich_with(&self, record: &AssetRecord, rules: &[&EnrichmentRule]) -> EnrichmentData {
        let mut data = EnrichmentData::new(&record.id);

        for rule in rules {
            if !evaluate_condition(record, &rule.condition) {
                continue;
            }

            let written = match rule.transformation.kind {
                TransformationKind::Direct => Ok(direct_value(record, rule)),
                TransformationKind::Lookup => self.lookup_value(record, rule).await,
                TransformationKind::Mapping | TransformationKind::Calculation => {
                    Err(RuleOutcome::Deferred)
                }
            };

            let outcome = match written {
                Ok(Some(value)) => {
                    assign_path(&mut data.fields, &rule.target_field, value);
                    RuleOutcome::Applied
                }
                Ok(None) => RuleOutcome::Skipped,
                Err(outcome) => outcome,
            };

            data.applied_rules.push(AppliedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                source: rule.source.clone(),
                target_field: rule.target_field.clone(),
                kind: rule.transformation.kind,
                outcome,
            });
        }

        data
    }

    /// `Err` carries an outcome other than applied/skipped
    async fn lookup_value(
        &self,
        record: &AssetRecord,
        rule: &EnrichmentRule,
    ) -> Result<Option<Value>, RuleOutcome> {
        let Some(provider) = self.lookup.as_ref() else {
            return Err(RuleOutcome::Deferred);
        };

        let key_field = rule
            .transformation
            .config_str("lookup_field")
            .unwrap_or(&rule.condition.field);
        let Some(key) = resolve_record_field(record, key_field).map(|v| v.into_owned()) else {
            return Ok(None);
        };

        let key_ref = &key;
        let result = self
            .resilience
            .execute_with_fallback(
                || async move { provider.lookup(rule, key_ref).await },
                Fallback::value(None),
                &format!("lookup:{}", rule.id),
                self.resilience.default_options(),
            )
            .await;

        match result {
            Ok(Some(value)) => Ok(Some(value)),
            Ok(None) => Err(RuleOutcome::LookupMiss),
            Err(e) => {
                warn!(rule = %rule.id, error = %e, "Lookup failed");
                Err(RuleOutcome::LookupMiss)
            }
        }
    }
}

/// Config `value`, else the record value at `source_field`, else the condition field's value
fn direct_value(record: &AssetRecord, rule: &EnrichmentRule) -> Option<Value> {
    if let Some(value) = rule.transformation.config.get("value") {
        return Some(value.clone());
    }
    let field = rule
        .transformation
        .config_str("source_field")
        .unwrap_or(&rule.condition.field);
    resolve_record_field(record, field).map(|v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Condition, ConditionOperator, RuleDefinition, RuleId, SourceId, Transformation,
    };
    use crate::infrastructure::{AssumeOnline, ResiliencePolicy};
    use chrono::Utc;
    use serde_json::{Map, json};

    fn engine() -> EnrichmentRuleEngine {
        EnrichmentRuleEngine::new(Arc::new(ResilienceManager::new(
            ResiliencePolicy::default(),
            Arc::new(AssumeOnline),
        )))
    }

    fn rule(
        id: &str,
        priority: i32,
        condition: Condition,
        transformation: Transformation,
        target: &str,
    ) -> EnrichmentRule {
        EnrichmentRule::new(
            RuleId::new(id),
            RuleDefinition {
                name: id.to_string(),
                description: String::new(),
                source: SourceId::new("nvd"),
                target_field: target.to_string(),
                condition,
                transformation,
                active: true,
                priority,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn record(value: serde_json::Value) -> AssetRecord {
        AssetRecord::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_rules_apply_in_priority_order() {
        let rules = vec![
            rule(
                "late",
                5,
                Condition::new("name", ConditionOperator::Contains, json!("server")),
                Transformation::new(TransformationKind::Direct).with("value", json!("second")),
                "label",
            ),
            rule(
                "early",
                1,
                Condition::new("name", ConditionOperator::Contains, json!("server")),
                Transformation::new(TransformationKind::Direct).with("value", json!("first")),
                "label",
            ),
        ];

        let data = engine()
            .enrich_record(&record(json!({"id": "a-1", "name": "Prod Server"})), &rules)
            .await;
        let order: Vec<&str> = data.applied_rules.iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(order, vec!["early", "late"]);
        assert_eq!(data.fields.get("label"), Some(&json!("second")));
    }

    #[tokio::test]
    async fn test_rules_do_not_observe_each_other() {
        let rules = vec![
            rule(
                "writes-env",
                1,
                Condition::new("hostname", ConditionOperator::StartsWith, json!("prod-")),
                Transformation::new(TransformationKind::Direct).with("value", json!("production")),
                "environment",
            ),
            rule(
                "reads-env",
                2,
                Condition::new("environment", ConditionOperator::Equals, json!("production")),
                Transformation::new(TransformationKind::Direct).with("value", json!(true)),
                "critical",
            ),
        ];

        let data = engine()
            .enrich_record(&record(json!({"id": "h", "hostname": "prod-db-1"})), &rules)
            .await;
        assert_eq!(data.fields.get("environment"), Some(&json!("production")));
        assert!(data.fields.get("critical").is_none());
        assert_eq!(data.applied_rules.len(), 1);
    }

    #[tokio::test]
    async fn test_direct_copies_source_field_into_nested_target() {
        let rules = vec![rule(
            "owner",
            1,
            Condition::new("meta.owner", ConditionOperator::EndsWith, json!("@corp.io")),
            Transformation::new(TransformationKind::Direct).with("source_field", json!("meta.team")),
            "ownership.team",
        )];

        let data = engine()
            .enrich_record(
                &record(json!({"id": "x", "meta": {"owner": "ann@corp.io", "team": "sre"}})),
                &rules,
            )
            .await;
        assert_eq!(data.fields, json!({"ownership": {"team": "sre"}}).as_object().unwrap().clone());
        assert_eq!(data.applied_rules[0].outcome, RuleOutcome::Applied);
    }

    #[tokio::test]
    async fn test_mapping_is_deferred_and_inactive_rules_ignored() {
        let mut inactive = rule(
            "inactive",
            0,
            Condition::new("type", ConditionOperator::Equals, json!("server")),
            Transformation::new(TransformationKind::Direct).with("value", json!(1)),
            "x",
        );
        inactive.active = false;
        let rules = vec![
            inactive,
            rule(
                "mapping",
                2,
                Condition::new(
                    "type",
                    ConditionOperator::In,
                    json!(["server", "workstation"]),
                ),
                Transformation::new(TransformationKind::Mapping),
                "threatIntelligence",
            ),
        ];

        let data = engine()
            .enrich_record(&record(json!({"id": "s", "type": "server"})), &rules)
            .await;
        assert!(data.fields.is_empty());
        assert_eq!(data.applied_rules.len(), 1);
        assert_eq!(data.applied_rules[0].outcome, RuleOutcome::Deferred);
    }

    struct TableLookup(Map<String, Value>);

    #[async_trait]
    impl LookupProvider for TableLookup {
        async fn lookup(
            &self,
            _rule: &EnrichmentRule,
            key: &Value,
        ) -> Result<Option<Value>, SyncError> {
            match key.as_str().and_then(|k| self.0.get(k)) {
                Some(value) => Ok(Some(value.clone())),
                None => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn test_lookup_uses_provider() {
        let mut table = Map::new();
        table.insert("openssl 1.1.1".to_string(), json!(["CVE-2023-0286"]));
        let engine = engine().with_lookup(Arc::new(TableLookup(table)));

        let rules = vec![rule(
            "cve",
            1,
            Condition::new("software", ConditionOperator::Contains, json!("")),
            Transformation::new(TransformationKind::Lookup).with("lookup_field", json!("software")),
            "vulnerabilities",
        )];
        let records = vec![
            record(json!({"id": "a", "software": "openssl 1.1.1"})),
            record(json!({"id": "b", "software": "nginx"})),
            record(json!({"id": "c"})),
        ];

        let enriched = engine.enrich_records(&records, &rules).await;
        assert_eq!(enriched.len(), 3);
        assert_eq!(
            enriched["a"].fields.get("vulnerabilities"),
            Some(&json!(["CVE-2023-0286"]))
        );
        assert_eq!(enriched["b"].applied_rules[0].outcome, RuleOutcome::LookupMiss);
        assert!(enriched["c"].applied_rules.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_without_provider_is_deferred() {
        let rules = vec![rule(
            "cve",
            1,
            Condition::new("software", ConditionOperator::Contains, json!("")),
            Transformation::new(TransformationKind::Lookup),
            "vulnerabilities",
        )];
        let data = engine()
            .enrich_record(&record(json!({"id": "a", "software": "nginx"})), &rules)
            .await;
        assert_eq!(data.applied_rules[0].outcome, RuleOutcome::Deferred);
    }
}
