use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use model_governance::governance::{
    ArtifactDefinition, ArtifactId, Condition, ConditionOperator, Decision, EntityId,
    InventoryRecord, InventoryRepository, ModelClassification, ModelCriterion, PolicyId,
    PolicyRepository, PolicyStatus, PolicyVersion, RepositoryError, Rule, RuleEffects, RuleId,
    RuleSet, ScheduleUpdate, Tier, TierKey, ValidationFrequencies,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// BTreeMap-backed store; key order gives `list_chunk` its stable paging.
#[derive(Default)]
pub(crate) struct InMemoryInventoryRepository {
    records: Mutex<BTreeMap<EntityId, InventoryRecord>>,
    decisions: Mutex<Vec<(EntityId, Decision)>>,
}

impl InMemoryInventoryRepository {
    pub(crate) fn decisions(&self) -> Vec<(EntityId, Decision)> {
        self.decisions.lock().expect("decision mutex poisoned").clone()
    }
}

impl InventoryRepository for InMemoryInventoryRepository {
    fn insert(&self, record: InventoryRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("inventory mutex poisoned");
        if guard.contains_key(&record.entity_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.entity_id.clone(), record);
        Ok(())
    }

    fn update(&self, record: InventoryRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("inventory mutex poisoned");
        if !guard.contains_key(&record.entity_id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.entity_id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<InventoryRecord>, RepositoryError> {
        let guard = self.records.lock().expect("inventory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list_chunk(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<InventoryRecord>, RepositoryError> {
        let guard = self.records.lock().expect("inventory mutex poisoned");
        Ok(guard.values().skip(offset).take(limit).cloned().collect())
    }

    fn update_schedule(
        &self,
        id: &EntityId,
        update: ScheduleUpdate,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("inventory mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.validation_frequency_months = update.validation_frequency_months;
        record.next_validation_due = update.next_validation_due;
        Ok(())
    }

    fn record_decision(&self, id: &EntityId, decision: Decision) -> Result<(), RepositoryError> {
        self.decisions
            .lock()
            .expect("decision mutex poisoned")
            .push((id.clone(), decision));
        Ok(())
    }

    fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.records.lock().expect("inventory mutex poisoned").len())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryPolicyRepository {
    policies: Mutex<BTreeMap<PolicyId, PolicyVersion>>,
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn insert(&self, policy: PolicyVersion) -> Result<PolicyVersion, RepositoryError> {
        let mut guard = self.policies.lock().expect("policy mutex poisoned");
        if guard.contains_key(&policy.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    fn update(&self, policy: PolicyVersion) -> Result<(), RepositoryError> {
        let mut guard = self.policies.lock().expect("policy mutex poisoned");
        if !guard.contains_key(&policy.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(policy.id.clone(), policy);
        Ok(())
    }

    fn fetch(&self, id: &PolicyId) -> Result<Option<PolicyVersion>, RepositoryError> {
        let guard = self.policies.lock().expect("policy mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn with_status(&self, status: PolicyStatus) -> Result<Vec<PolicyVersion>, RepositoryError> {
        let guard = self.policies.lock().expect("policy mutex poisoned");
        Ok(guard
            .values()
            .filter(|policy| policy.status == status)
            .cloned()
            .collect())
    }
}

fn leaf(field: &str, operator: ConditionOperator, value: serde_json::Value) -> Condition {
    Condition::Leaf {
        field: field.to_string(),
        operator,
        value,
    }
}

fn tier(key: &str, name: &str, description: &str, severity: u8) -> Tier {
    Tier {
        key: TierKey::from(key),
        name: name.to_string(),
        description: description.to_string(),
        severity,
    }
}

/// Rule set the service boots with until a curated document is installed.
pub(crate) fn default_rule_set() -> RuleSet {
    let mut decisioning_effects = RuleEffects::default();
    decisioning_effects
        .add_required_artifacts
        .insert(ArtifactId("validation-report".to_string()));
    decisioning_effects
        .add_risk_flags
        .insert("customer-impacting".to_string());
    decisioning_effects.triggered_criteria =
        Some("automated decisioning with direct or indirect customer impact".to_string());

    let mut external_effects = RuleEffects::default();
    external_effects
        .add_risk_flags
        .insert("external-exposure".to_string());

    RuleSet {
        version: "baseline-2025".to_string(),
        tiers: vec![
            tier("T1", "Low", "Internal or advisory use only", 1),
            tier("T2", "Medium", "Material business impact", 2),
            tier("T3", "High", "Direct customer or regulatory impact", 3),
        ],
        default_tier: TierKey::from("T1"),
        rules: vec![
            Rule {
                id: RuleId("R1".to_string()),
                name: "Automated decisioning with customer impact".to_string(),
                tier: TierKey::from("T3"),
                conditions: Condition::All {
                    all: vec![
                        leaf("usageType", ConditionOperator::Eq, json!("Decisioning")),
                        leaf(
                            "customerImpact",
                            ConditionOperator::In,
                            json!(["Direct", "Indirect"]),
                        ),
                    ],
                },
                effects: decisioning_effects,
            },
            Rule {
                id: RuleId("R2".to_string()),
                name: "Externally exposed with personal data".to_string(),
                tier: TierKey::from("T2"),
                conditions: Condition::All {
                    all: vec![
                        leaf("usesPersonalData", ConditionOperator::Eq, json!(true)),
                        leaf(
                            "deployment",
                            ConditionOperator::In,
                            json!(["External", "CustomerFacing"]),
                        ),
                    ],
                },
                effects: external_effects,
            },
            Rule {
                id: RuleId("R3".to_string()),
                name: "Regulatory reporting input".to_string(),
                tier: TierKey::from("T2"),
                conditions: leaf(
                    "regulatoryReports",
                    ConditionOperator::NotEmpty,
                    serde_json::Value::Null,
                ),
                effects: RuleEffects::default(),
            },
        ],
        model_criteria: vec![
            ModelCriterion {
                condition: leaf(
                    "technique",
                    ConditionOperator::In,
                    json!(["ml", "statistical", "deep_learning"]),
                ),
                result: ModelClassification::Yes,
            },
            ModelCriterion {
                condition: leaf("usesVendorScores", ConditionOperator::Eq, json!(true)),
                result: ModelClassification::ModelLike,
            },
        ],
        artifacts: vec![
            ArtifactDefinition {
                id: ArtifactId("model-card".to_string()),
                name: "Model card".to_string(),
                category: "documentation".to_string(),
                required_for_tiers: [TierKey::from("T2"), TierKey::from("T3")]
                    .into_iter()
                    .collect(),
            },
            ArtifactDefinition {
                id: ArtifactId("validation-report".to_string()),
                name: "Independent validation report".to_string(),
                category: "validation".to_string(),
                required_for_tiers: [TierKey::from("T3")].into_iter().collect(),
            },
            ArtifactDefinition {
                id: ArtifactId("monitoring-plan".to_string()),
                name: "Ongoing monitoring plan".to_string(),
                category: "monitoring".to_string(),
                required_for_tiers: [TierKey::from("T3")].into_iter().collect(),
            },
        ],
    }
}

pub(crate) fn default_frequencies() -> ValidationFrequencies {
    [
        (TierKey::from("T1"), 36),
        (TierKey::from("T2"), 24),
        (TierKey::from("T3"), 12),
    ]
    .into_iter()
    .collect()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_set_validates() {
        assert!(default_rule_set().validate().is_ok());
    }

    #[test]
    fn default_frequencies_cover_every_tier() {
        let rule_set = default_rule_set();
        let frequencies = default_frequencies();
        for tier in &rule_set.tiers {
            assert!(frequencies.months_for(&tier.key).is_some());
        }
    }

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert!(parse_date("2025-06-01").is_ok());
        assert!(parse_date("06/01/2025").is_err());
    }
}
