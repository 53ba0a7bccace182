//! Structural comparison of a candidate policy against the active
//! configuration. Pure and side-effect-free; never touches the record
//! store.

use serde::{Deserialize, Serialize};

use super::extraction::{MarkerChange, RuleMarker};
use super::ruleset::{Rule, TierKey, ValidationFrequencies};

/// Direction of a cadence change, named after the change in interval
/// *duration*, not strictness: a shorter interval reports `Decrease` even
/// though more-frequent validation is the stricter obligation. This
/// inversion is deliberate and must not be "fixed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceDirection {
    Increase,
    Decrease,
    Same,
}

/// Per-tier cadence delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDelta {
    pub tier: TierKey,
    pub previous_months: Option<u32>,
    pub candidate_months: Option<u32>,
    /// Absent when the tier has no previous cadence to compare against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<CadenceDirection>,
    pub note: String,
}

/// Category of a marker-detected rule change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleChangeKind {
    New,
    Removed,
    Modified,
}

/// One categorical rule change with a human-readable rationale. The engine
/// does not diff condition trees structurally: candidate rules arrive as
/// coarse markers from the extraction collaborator, not a full rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChange {
    pub kind: RuleChangeKind,
    pub label: String,
    pub rationale: String,
}

/// Human- and machine-readable change list for a candidate policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDiff {
    pub frequency_changes: Vec<FrequencyDelta>,
    pub rule_changes: Vec<RuleChange>,
    pub summary: String,
}

impl PolicyDiff {
    /// Whether the candidate changes anything at all.
    pub fn is_material(&self) -> bool {
        !self.rule_changes.is_empty()
            || self
                .frequency_changes
                .iter()
                .any(|delta| delta.direction != Some(CadenceDirection::Same))
    }
}

/// Compare the active cadences and rules against a candidate extraction.
pub fn diff_policy(
    current: &ValidationFrequencies,
    candidate: &ValidationFrequencies,
    markers: &[RuleMarker],
    active_rules: &[Rule],
) -> PolicyDiff {
    let mut tiers: Vec<TierKey> = current.iter().map(|(tier, _)| tier.clone()).collect();
    for (tier, _) in candidate.iter() {
        if !tiers.contains(tier) {
            tiers.push(tier.clone());
        }
    }
    tiers.sort();

    let frequency_changes: Vec<FrequencyDelta> = tiers
        .into_iter()
        .map(|tier| {
            let previous = current.months_for(&tier);
            let next = candidate.months_for(&tier).or(previous);
            frequency_delta(tier, previous, next)
        })
        .collect();

    let rule_changes: Vec<RuleChange> = markers
        .iter()
        .map(|marker| classify_marker(marker, active_rules))
        .collect();

    let changed = frequency_changes
        .iter()
        .filter(|delta| delta.direction != Some(CadenceDirection::Same))
        .count();
    let summary = format!(
        "{changed} cadence change(s), {} rule change(s)",
        rule_changes.len()
    );

    PolicyDiff {
        frequency_changes,
        rule_changes,
        summary,
    }
}

fn frequency_delta(tier: TierKey, previous: Option<u32>, candidate: Option<u32>) -> FrequencyDelta {
    let (direction, note) = match (previous, candidate) {
        (Some(before), Some(after)) if after > before => (
            Some(CadenceDirection::Increase),
            format!("validation interval lengthens from {before} to {after} months"),
        ),
        (Some(before), Some(after)) if after < before => (
            Some(CadenceDirection::Decrease),
            format!(
                "validation interval shortens from {before} to {after} months \
                 (more frequent validation, stricter obligation)"
            ),
        ),
        (Some(months), Some(_)) => (
            Some(CadenceDirection::Same),
            format!("validation interval stays at {months} months"),
        ),
        (None, Some(after)) => (
            None,
            format!("tier newly assigned a cadence of {after} months"),
        ),
        // Overlay semantics keep unmentioned tiers, so a tier listed here
        // always has a candidate cadence; this arm is a formality.
        (_, None) => (None, "tier has no cadence on either side".to_string()),
    };

    FrequencyDelta {
        tier,
        previous_months: previous,
        candidate_months: candidate,
        direction,
        note,
    }
}

fn classify_marker(marker: &RuleMarker, active_rules: &[Rule]) -> RuleChange {
    let label_lower = marker.label.to_ascii_lowercase();
    let matches_active = active_rules.iter().any(|rule| {
        label_lower.contains(&rule.name.to_ascii_lowercase())
            || label_lower.contains(&rule.id.0.to_ascii_lowercase())
    });

    let kind = match marker.change {
        MarkerChange::Removed => RuleChangeKind::Removed,
        _ if matches_active => RuleChangeKind::Modified,
        MarkerChange::Updated => RuleChangeKind::Modified,
        MarkerChange::Added => RuleChangeKind::New,
    };

    let rationale = match kind {
        RuleChangeKind::New => format!("document introduces a rule: {}", marker.summary),
        RuleChangeKind::Removed => format!("document retires a rule: {}", marker.summary),
        RuleChangeKind::Modified => format!("document revises an existing rule: {}", marker.summary),
    };

    RuleChange {
        kind,
        label: marker.label.clone(),
        rationale,
    }
}
