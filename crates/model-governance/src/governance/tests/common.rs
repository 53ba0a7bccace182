use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::governance::classify::Decision;
use crate::governance::condition::{AttributeMap, Condition, ConditionOperator};
use crate::governance::repository::{
    EntityId, InventoryRecord, InventoryRepository, PolicyId, PolicyRepository, PolicyStatus,
    PolicyVersion, RepositoryError, ScheduleUpdate,
};
use crate::governance::ruleset::{
    ArtifactDefinition, ArtifactId, ModelClassification, ModelCriterion, Rule, RuleEffects, RuleId,
    RuleSet, Tier, TierKey, ValidationFrequencies,
};
use crate::governance::service::GovernanceService;

pub(super) fn leaf(field: &str, operator: ConditionOperator, value: Value) -> Condition {
    Condition::Leaf {
        field: field.to_string(),
        operator,
        value,
    }
}

pub(super) fn all(children: Vec<Condition>) -> Condition {
    Condition::All { all: children }
}

pub(super) fn any(children: Vec<Condition>) -> Condition {
    Condition::Any { any: children }
}

pub(super) fn attributes(entries: &[(&str, Value)]) -> AttributeMap {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub(super) fn tier(key: &str, name: &str, severity: u8) -> Tier {
    Tier {
        key: TierKey::from(key),
        name: name.to_string(),
        description: String::new(),
        severity,
    }
}

pub(super) fn rule(id: &str, name: &str, tier: &str, conditions: Condition) -> Rule {
    Rule {
        id: RuleId(id.to_string()),
        name: name.to_string(),
        tier: TierKey::from(tier),
        conditions,
        effects: RuleEffects::default(),
    }
}

pub(super) fn decisioning_rule() -> Rule {
    let mut effects = RuleEffects::default();
    effects
        .add_required_artifacts
        .insert(ArtifactId("validation-report".to_string()));
    effects
        .add_risk_flags
        .insert("customer-impacting".to_string());
    effects.triggered_criteria = Some("automated decisioning with customer impact".to_string());

    Rule {
        id: RuleId("R1".to_string()),
        name: "Automated decisioning with customer impact".to_string(),
        tier: TierKey::from("T3"),
        conditions: all(vec![
            leaf("usageType", ConditionOperator::Eq, json!("Decisioning")),
            leaf(
                "customerImpact",
                ConditionOperator::In,
                json!(["Direct", "Indirect"]),
            ),
        ]),
        effects,
    }
}

pub(super) fn base_rule_set() -> RuleSet {
    RuleSet {
        version: "2024-q3".to_string(),
        tiers: vec![
            tier("T1", "Low", 1),
            tier("T2", "Medium", 2),
            tier("T3", "High", 3),
        ],
        default_tier: TierKey::from("T1"),
        rules: vec![decisioning_rule()],
        model_criteria: vec![
            ModelCriterion {
                condition: leaf(
                    "technique",
                    ConditionOperator::In,
                    json!(["ml", "statistical"]),
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
        ],
    }
}

pub(super) fn base_frequencies() -> ValidationFrequencies {
    [
        (TierKey::from("T1"), 36),
        (TierKey::from("T2"), 24),
        (TierKey::from("T3"), 12),
    ]
    .into_iter()
    .collect()
}

pub(super) fn decisioning_attributes() -> AttributeMap {
    attributes(&[
        ("usageType", json!("Decisioning")),
        ("customerImpact", json!("Direct")),
        ("technique", json!("ml")),
    ])
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn record(entity: &str, tier_key: &str, last_validation: Option<NaiveDate>) -> InventoryRecord {
    let onboarded = date(2025, 1, 15);
    InventoryRecord {
        entity_id: EntityId(entity.to_string()),
        name: format!("Use case {entity}"),
        tier: TierKey::from(tier_key),
        validation_frequency_months: base_frequencies().months_for(&TierKey::from(tier_key)),
        onboarded_on: onboarded,
        last_validation_date: last_validation,
        next_validation_due: None,
    }
}

#[derive(Default)]
pub(super) struct MemoryInventory {
    pub(super) records: Mutex<BTreeMap<EntityId, InventoryRecord>>,
    pub(super) decisions: Mutex<Vec<(EntityId, Decision)>>,
    /// When set, `update_schedule` fails once this many calls have gone
    /// through, simulating a store outage mid-batch.
    fail_after_updates: AtomicUsize,
    update_calls: AtomicUsize,
    /// Same knob for `list_chunk`, counted in chunk listings.
    fail_after_listings: AtomicUsize,
    list_calls: AtomicUsize,
}

const NEVER_FAIL: usize = usize::MAX;

impl MemoryInventory {
    pub(super) fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            decisions: Mutex::new(Vec::new()),
            fail_after_updates: AtomicUsize::new(NEVER_FAIL),
            update_calls: AtomicUsize::new(0),
            fail_after_listings: AtomicUsize::new(NEVER_FAIL),
            list_calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn seed(&self, records: Vec<InventoryRecord>) {
        let mut guard = self.records.lock().expect("inventory mutex poisoned");
        for record in records {
            guard.insert(record.entity_id.clone(), record);
        }
    }

    pub(super) fn fail_after(&self, updates: usize) {
        self.fail_after_updates.store(updates, Ordering::SeqCst);
        self.update_calls.store(0, Ordering::SeqCst);
    }

    pub(super) fn fail_listing_after(&self, chunks: usize) {
        self.fail_after_listings.store(chunks, Ordering::SeqCst);
        self.list_calls.store(0, Ordering::SeqCst);
    }

    pub(super) fn heal(&self) {
        self.fail_after_updates.store(NEVER_FAIL, Ordering::SeqCst);
        self.fail_after_listings.store(NEVER_FAIL, Ordering::SeqCst);
    }

    pub(super) fn get(&self, entity: &str) -> Option<InventoryRecord> {
        self.records
            .lock()
            .expect("inventory mutex poisoned")
            .get(&EntityId(entity.to_string()))
            .cloned()
    }
}

impl InventoryRepository for MemoryInventory {
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
        let calls = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if calls >= self.fail_after_listings.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }

        let guard = self.records.lock().expect("inventory mutex poisoned");
        Ok(guard.values().skip(offset).take(limit).cloned().collect())
    }

    fn update_schedule(
        &self,
        id: &EntityId,
        update: ScheduleUpdate,
    ) -> Result<(), RepositoryError> {
        let calls = self.update_calls.fetch_add(1, Ordering::SeqCst);
        if calls >= self.fail_after_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }

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
pub(super) struct MemoryPolicies {
    policies: Mutex<BTreeMap<PolicyId, PolicyVersion>>,
}

impl MemoryPolicies {
    pub(super) fn get(&self, id: &PolicyId) -> Option<PolicyVersion> {
        self.policies
            .lock()
            .expect("policy mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl PolicyRepository for MemoryPolicies {
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

pub(super) fn build_service() -> (
    GovernanceService<MemoryInventory, MemoryPolicies>,
    Arc<MemoryInventory>,
    Arc<MemoryPolicies>,
) {
    let inventory = Arc::new(MemoryInventory::new());
    let policies = Arc::new(MemoryPolicies::default());
    let service = GovernanceService::new(
        base_rule_set(),
        base_frequencies(),
        inventory.clone(),
        policies.clone(),
    )
    // Small chunks so the tests exercise the streaming pass boundaries.
    .with_chunk_size(2);
    (service, inventory, policies)
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Policy document the marker parser understands: tightens T3 to 6 months.
pub(super) fn tightened_policy_document() -> String {
    [
        "Model Risk Policy, revision 4.",
        "Tier 3 use cases must be revalidated every 6 months.",
        "Updated rule: Automated decisioning with customer impact now includes indirect harm.",
        "New rule: vendor-provided scores require an annual review.",
    ]
    .join("\n")
}
