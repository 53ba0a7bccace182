//! Storage abstractions for the inventory and policy stores so the engines
//! can be exercised in isolation.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classify::Decision;
use super::diff::PolicyDiff;
use super::extraction::PolicyExtraction;
use super::ruleset::TierKey;

/// Identifier wrapper for tracked entities (AI/ML use cases).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for policy versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a policy version. Monotonic except for archival; at most
/// one policy is `Applied` at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStatus {
    Draft,
    Analyzed,
    Approved,
    Applied,
    Archived,
}

impl PolicyStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PolicyStatus::Draft => "draft",
            PolicyStatus::Analyzed => "analyzed",
            PolicyStatus::Approved => "approved",
            PolicyStatus::Applied => "applied",
            PolicyStatus::Archived => "archived",
        }
    }

    /// Whether this status may be analyzed (re-analysis of an already
    /// analyzed draft is allowed).
    pub const fn can_analyze(self) -> bool {
        matches!(self, PolicyStatus::Draft | PolicyStatus::Analyzed)
    }

    pub const fn can_approve(self) -> bool {
        matches!(self, PolicyStatus::Analyzed)
    }

    pub const fn can_apply(self) -> bool {
        matches!(self, PolicyStatus::Approved | PolicyStatus::Applied)
    }

    /// User-initiated archival. An `Applied` policy is never deleted or
    /// archived directly; it is only superseded by applying a successor.
    pub const fn can_archive(self) -> bool {
        !matches!(self, PolicyStatus::Applied)
    }
}

/// A proposed replacement for the active validation cadences and/or rules,
/// with its own approval lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub id: PolicyId,
    pub status: PolicyStatus,
    /// The source policy document as submitted (prose).
    pub document: String,
    pub submitted_on: NaiveDate,
    /// Structured extraction produced during analysis.
    pub extraction: Option<PolicyExtraction>,
    /// Diff against the configuration that was active at analysis time.
    pub diff: Option<PolicyDiff>,
}

/// An entity that has been classified and entered validation tracking.
///
/// The tier, frequency, and due-date fields are written only by the
/// classification and policy-application paths, which preserves provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub tier: TierKey,
    pub validation_frequency_months: Option<u32>,
    pub onboarded_on: NaiveDate,
    pub last_validation_date: Option<NaiveDate>,
    pub next_validation_due: Option<NaiveDate>,
}

impl InventoryRecord {
    /// Anchor date for cadence math: the last completed validation, or the
    /// onboarding date when no validation has occurred yet.
    pub fn schedule_anchor(&self) -> NaiveDate {
        self.last_validation_date.unwrap_or(self.onboarded_on)
    }
}

/// Schedule fields recomputed by the preview/apply engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub validation_frequency_months: Option<u32>,
    pub next_validation_due: Option<NaiveDate>,
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Record store for tracked entities. `list_chunk` supports the streaming
/// preview/apply passes so record growth never forces a full load.
pub trait InventoryRepository: Send + Sync {
    fn insert(&self, record: InventoryRecord) -> Result<(), RepositoryError>;
    fn update(&self, record: InventoryRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &EntityId) -> Result<Option<InventoryRecord>, RepositoryError>;
    /// Stable-ordered page of records starting at `offset`.
    fn list_chunk(&self, offset: usize, limit: usize)
        -> Result<Vec<InventoryRecord>, RepositoryError>;
    fn update_schedule(&self, id: &EntityId, update: ScheduleUpdate)
        -> Result<(), RepositoryError>;
    /// Persist a classification decision snapshot for audit.
    fn record_decision(&self, id: &EntityId, decision: Decision) -> Result<(), RepositoryError>;
    fn count(&self) -> Result<usize, RepositoryError>;
}

/// Store for policy versions and their lifecycle state.
pub trait PolicyRepository: Send + Sync {
    fn insert(&self, policy: PolicyVersion) -> Result<PolicyVersion, RepositoryError>;
    fn update(&self, policy: PolicyVersion) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &PolicyId) -> Result<Option<PolicyVersion>, RepositoryError>;
    fn with_status(&self, status: PolicyStatus) -> Result<Vec<PolicyVersion>, RepositoryError>;
}
