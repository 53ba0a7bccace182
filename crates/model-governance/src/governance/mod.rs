//! Risk-tiering rule engine and policy governance lifecycle.
//!
//! Intake flows through the classification engine bound to the active rule
//! set and produces a stored decision. Separately, a new policy document is
//! extracted into structured cadence/rule data, diffed against the active
//! configuration, previewed across the inventory, and, once approved,
//! applied atomically.

pub mod active;
pub mod apply;
pub mod classify;
pub mod condition;
pub mod diff;
pub mod extraction;
pub mod preview;
pub mod repository;
pub mod router;
pub mod ruleset;
pub mod service;

#[cfg(test)]
mod tests;

pub use active::{ActiveConfiguration, ActiveSnapshot};
pub use apply::{ApplyRecordError, ApplyReport};
pub use classify::{ClassificationEngine, Decision, TriggeredRule};
pub use condition::{evaluate, AttributeMap, Condition, ConditionOperator};
pub use diff::{
    diff_policy, CadenceDirection, FrequencyDelta, PolicyDiff, RuleChange, RuleChangeKind,
};
pub use extraction::{
    ExtractionError, ExtractionPipeline, MarkerChange, MarkerParser, PolicyExtraction,
    PolicyExtractor, RuleMarker,
};
pub use preview::{preview, AffectedRecord, PreviewReport, PreviewSummary};
pub use repository::{
    EntityId, InventoryRecord, InventoryRepository, PolicyId, PolicyRepository, PolicyStatus,
    PolicyVersion, RepositoryError, ScheduleUpdate,
};
pub use router::governance_router;
pub use ruleset::{
    ArtifactDefinition, ArtifactId, ModelClassification, ModelCriterion, Rule, RuleEffects, RuleId,
    RuleSet, RuleSetError, Tier, TierKey, ValidationFrequencies, MAX_CONDITION_DEPTH,
};
pub use service::{GovernanceError, GovernanceService};
