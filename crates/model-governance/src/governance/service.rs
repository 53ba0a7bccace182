//! Service facade composing the active configuration, repositories,
//! extraction pipeline, and the classification / diff / preview / apply
//! engines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::StatusCode;
use chrono::NaiveDate;
use tracing::info;

use super::active::{ActiveConfiguration, ActiveSnapshot};
use super::apply::{apply_frequencies, ApplyReport};
use super::classify::{ClassificationEngine, Decision};
use super::condition::AttributeMap;
use super::diff::{diff_policy, PolicyDiff};
use super::extraction::ExtractionPipeline;
use super::preview::{self, PreviewReport};
use super::repository::{
    EntityId, InventoryRecord, InventoryRepository, PolicyId, PolicyRepository, PolicyStatus,
    PolicyVersion, RepositoryError,
};
use super::ruleset::{RuleSet, RuleSetError, ValidationFrequencies};

static POLICY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_policy_id() -> PolicyId {
    let id = POLICY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PolicyId(format!("pol-{id:06}"))
}

/// Error raised by the governance service.
#[derive(Debug, thiserror::Error)]
pub enum GovernanceError {
    #[error("policy {0} not found")]
    PolicyNotFound(PolicyId),
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    #[error("policy {policy} cannot be {action} from status '{from}'")]
    InvalidTransition {
        policy: PolicyId,
        from: &'static str,
        action: &'static str,
    },
    #[error("policy {0} has not been analyzed; no extraction available")]
    MissingExtraction(PolicyId),
    #[error(transparent)]
    RuleSet(#[from] RuleSetError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl GovernanceError {
    /// HTTP status the router and `AppError` map this error to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GovernanceError::PolicyNotFound(_) | GovernanceError::EntityNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GovernanceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            GovernanceError::MissingExtraction(_) | GovernanceError::RuleSet(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            GovernanceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            GovernanceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            GovernanceError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Governance facade. One instance owns the active-configuration slot; the
/// apply lock makes policy application single-writer while classification
/// and previews read a consistent snapshot without blocking.
pub struct GovernanceService<I, P> {
    active: ActiveConfiguration,
    inventory: Arc<I>,
    policies: Arc<P>,
    extraction: ExtractionPipeline,
    apply_lock: Mutex<()>,
    chunk_size: usize,
}

impl<I, P> GovernanceService<I, P>
where
    I: InventoryRepository + 'static,
    P: PolicyRepository + 'static,
{
    pub fn new(
        rule_set: RuleSet,
        frequencies: ValidationFrequencies,
        inventory: Arc<I>,
        policies: Arc<P>,
    ) -> Self {
        Self::with_extraction(
            rule_set,
            frequencies,
            inventory,
            policies,
            ExtractionPipeline::deterministic(),
        )
    }

    pub fn with_extraction(
        rule_set: RuleSet,
        frequencies: ValidationFrequencies,
        inventory: Arc<I>,
        policies: Arc<P>,
        extraction: ExtractionPipeline,
    ) -> Self {
        Self {
            active: ActiveConfiguration::new(rule_set, frequencies),
            inventory,
            policies,
            extraction,
            apply_lock: Mutex::new(()),
            chunk_size: 250,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn active_snapshot(&self) -> Arc<ActiveSnapshot> {
        self.active.snapshot()
    }

    /// Validate and install a new rule set. A rejected document leaves the
    /// previously active rule set in force.
    pub fn load_rule_set(&self, source: &str) -> Result<(), GovernanceError> {
        let rule_set = RuleSet::from_json(source)?;
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        info!(version = %rule_set.version, "installing rule set");
        self.active.install_rule_set(rule_set);
        Ok(())
    }

    /// Classify an attribute map against the active rule set without
    /// touching any store.
    pub fn classify(&self, attributes: &AttributeMap) -> Decision {
        let snapshot = self.active.snapshot();
        ClassificationEngine::new(snapshot.rule_set.clone()).classify(attributes)
    }

    /// Classify against a caller-supplied rule set instead of the active
    /// one, for what-if runs against a draft or historical version.
    /// Nothing is stored or enrolled.
    pub fn classify_with(&self, rule_set: Arc<RuleSet>, attributes: &AttributeMap) -> Decision {
        ClassificationEngine::new(rule_set).classify(attributes)
    }

    /// Classify an entity and enroll it in validation tracking: the
    /// decision is persisted and the inventory record's tier, cadence, and
    /// next due date are set from the active configuration.
    pub fn classify_entity(
        &self,
        entity_id: EntityId,
        name: String,
        attributes: &AttributeMap,
        effective_date: NaiveDate,
    ) -> Result<Decision, GovernanceError> {
        let snapshot = self.active.snapshot();
        let decision = ClassificationEngine::new(snapshot.rule_set.clone()).classify(attributes);

        self.inventory.record_decision(&entity_id, decision.clone())?;

        let existing = self.inventory.fetch(&entity_id)?;
        let (onboarded_on, last_validation_date) = match &existing {
            Some(record) => (record.onboarded_on, record.last_validation_date),
            None => (effective_date, None),
        };

        let frequency = snapshot.frequencies.months_for(&decision.tier);
        let anchor = last_validation_date.unwrap_or(onboarded_on);
        let next_due = frequency.and_then(|months| preview::due_from(anchor, months));

        let record = InventoryRecord {
            entity_id: entity_id.clone(),
            name,
            tier: decision.tier.clone(),
            validation_frequency_months: frequency,
            onboarded_on,
            last_validation_date,
            next_validation_due: next_due,
        };

        match existing {
            Some(_) => self.inventory.update(record)?,
            None => self.inventory.insert(record)?,
        }

        Ok(decision)
    }

    /// Record a completed validation and roll the schedule forward from it.
    pub fn record_validation(
        &self,
        entity_id: &EntityId,
        validated_on: NaiveDate,
    ) -> Result<InventoryRecord, GovernanceError> {
        let snapshot = self.active.snapshot();
        let mut record = self
            .inventory
            .fetch(entity_id)?
            .ok_or_else(|| GovernanceError::EntityNotFound(entity_id.clone()))?;

        record.last_validation_date = Some(validated_on);
        record.validation_frequency_months = snapshot.frequencies.months_for(&record.tier);
        record.next_validation_due = record
            .validation_frequency_months
            .and_then(|months| preview::due_from(validated_on, months));

        self.inventory.update(record.clone())?;
        Ok(record)
    }

    pub fn get_record(&self, entity_id: &EntityId) -> Result<InventoryRecord, GovernanceError> {
        self.inventory
            .fetch(entity_id)?
            .ok_or_else(|| GovernanceError::EntityNotFound(entity_id.clone()))
    }

    /// Records whose next validation due date has passed.
    pub fn overdue(&self, today: NaiveDate) -> Result<Vec<InventoryRecord>, GovernanceError> {
        let mut overdue = Vec::new();
        let mut offset = 0;
        loop {
            let chunk = self.inventory.list_chunk(offset, self.chunk_size)?;
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len();
            overdue.extend(
                chunk
                    .into_iter()
                    .filter(|record| matches!(record.next_validation_due, Some(due) if due < today)),
            );
        }
        overdue.sort_by(|a, b| a.next_validation_due.cmp(&b.next_validation_due));
        Ok(overdue)
    }

    /// Register a new policy document as a draft.
    pub fn submit_policy(
        &self,
        document: String,
        submitted_on: NaiveDate,
    ) -> Result<PolicyVersion, GovernanceError> {
        let policy = PolicyVersion {
            id: next_policy_id(),
            status: PolicyStatus::Draft,
            document,
            submitted_on,
            extraction: None,
            diff: None,
        };
        Ok(self.policies.insert(policy)?)
    }

    pub fn get_policy(&self, id: &PolicyId) -> Result<PolicyVersion, GovernanceError> {
        self.policies
            .fetch(id)?
            .ok_or_else(|| GovernanceError::PolicyNotFound(id.clone()))
    }

    /// Run extraction and diff the candidate against the active
    /// configuration. Informational only; re-analysis is allowed until the
    /// policy is approved.
    pub fn analyze_policy(&self, id: &PolicyId) -> Result<PolicyVersion, GovernanceError> {
        let mut policy = self.get_policy(id)?;
        if !policy.status.can_analyze() {
            return Err(GovernanceError::InvalidTransition {
                policy: policy.id,
                from: policy.status.label(),
                action: "analyzed",
            });
        }

        let extraction = self.extraction.extract(&policy.document);
        let snapshot = self.active.snapshot();
        let diff = diff_policy(
            &snapshot.frequencies,
            &extraction.validation_frequencies,
            &extraction.rule_markers,
            &snapshot.rule_set.rules,
        );

        info!(policy = %policy.id, confidence = extraction.confidence, %diff.summary, "analyzed policy");

        policy.extraction = Some(extraction);
        policy.diff = Some(diff);
        policy.status = PolicyStatus::Analyzed;
        self.policies.update(policy.clone())?;
        Ok(policy)
    }

    pub fn approve_policy(&self, id: &PolicyId) -> Result<PolicyVersion, GovernanceError> {
        let mut policy = self.get_policy(id)?;
        if !policy.status.can_approve() {
            return Err(GovernanceError::InvalidTransition {
                policy: policy.id,
                from: policy.status.label(),
                action: "approved",
            });
        }
        policy.status = PolicyStatus::Approved;
        self.policies.update(policy.clone())?;
        Ok(policy)
    }

    /// Archive a policy (soft delete). Applied policies are only ever
    /// superseded, never archived directly.
    pub fn archive_policy(&self, id: &PolicyId) -> Result<PolicyVersion, GovernanceError> {
        let mut policy = self.get_policy(id)?;
        if !policy.status.can_archive() {
            return Err(GovernanceError::InvalidTransition {
                policy: policy.id,
                from: policy.status.label(),
                action: "archived",
            });
        }
        policy.status = PolicyStatus::Archived;
        self.policies.update(policy.clone())?;
        Ok(policy)
    }

    /// Diff a policy's extraction against the active configuration without
    /// storing anything.
    pub fn diff_policy(&self, id: &PolicyId) -> Result<PolicyDiff, GovernanceError> {
        let policy = self.get_policy(id)?;
        let extraction = policy
            .extraction
            .as_ref()
            .ok_or_else(|| GovernanceError::MissingExtraction(policy.id.clone()))?;
        let snapshot = self.active.snapshot();
        Ok(diff_policy(
            &snapshot.frequencies,
            &extraction.validation_frequencies,
            &extraction.rule_markers,
            &snapshot.rule_set.rules,
        ))
    }

    /// Read-only blast radius of a policy's candidate cadences across the
    /// whole inventory. May run concurrently with anything except the swap
    /// itself, and may be abandoned freely.
    pub fn preview_policy(&self, id: &PolicyId) -> Result<PreviewReport, GovernanceError> {
        let candidate = self.candidate_frequencies(id)?;
        Ok(preview::preview(
            self.inventory.as_ref(),
            &candidate,
            self.chunk_size,
        )?)
    }

    /// Apply an approved policy: recompute and persist every record's
    /// schedule, swap the active cadences, mark the policy applied, and
    /// archive any previously applied policy.
    ///
    /// Holds the single-writer apply lock for the duration. The lifecycle
    /// state and the active slot only advance when the whole batch
    /// succeeded, so a mid-batch store failure leaves a detectable,
    /// re-driveable partial state and never two applied policies.
    /// Re-applying an already applied policy recomputes identical values.
    pub fn apply_policy(&self, id: &PolicyId) -> Result<ApplyReport, GovernanceError> {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let policy = self.get_policy(id)?;
        if !policy.status.can_apply() {
            return Err(GovernanceError::InvalidTransition {
                policy: policy.id,
                from: policy.status.label(),
                action: "applied",
            });
        }
        let reapply = policy.status == PolicyStatus::Applied;

        let candidate = self.candidate_frequencies_of(&policy)?;
        let report = apply_frequencies(self.inventory.as_ref(), &candidate, self.chunk_size);

        if !report.success {
            info!(
                policy = %policy.id,
                updated = report.records_updated,
                failed = report.errors.len(),
                "policy application incomplete; lifecycle state not advanced"
            );
            return Ok(report);
        }

        if !reapply {
            for mut superseded in self.policies.with_status(PolicyStatus::Applied)? {
                if superseded.id != policy.id {
                    superseded.status = PolicyStatus::Archived;
                    self.policies.update(superseded)?;
                }
            }

            let mut applied = policy;
            applied.status = PolicyStatus::Applied;
            self.policies.update(applied.clone())?;
            self.active
                .activate_frequencies(candidate, applied.id.clone());
            info!(policy = %applied.id, updated = report.records_updated, "policy applied");
        }

        Ok(report)
    }

    /// Effective candidate table for a policy: its extracted cadences
    /// overlaid on the active ones, so unmentioned tiers keep their
    /// current cadence.
    fn candidate_frequencies(
        &self,
        id: &PolicyId,
    ) -> Result<ValidationFrequencies, GovernanceError> {
        let policy = self.get_policy(id)?;
        self.candidate_frequencies_of(&policy)
    }

    fn candidate_frequencies_of(
        &self,
        policy: &PolicyVersion,
    ) -> Result<ValidationFrequencies, GovernanceError> {
        let extraction = policy
            .extraction
            .as_ref()
            .ok_or_else(|| GovernanceError::MissingExtraction(policy.id.clone()))?;
        let snapshot = self.active.snapshot();
        Ok(extraction
            .validation_frequencies
            .merged_over(&snapshot.frequencies))
    }
}
