//! Versioned, immutable rule-set configuration: tiers, rules, model
//! definition criteria, artifact catalog, and validation cadences.
//!
//! A rule set is validated in full at load time; classification never runs
//! against a document with dangling tier references, duplicate rule IDs, or
//! malformed conditions. A rejected candidate leaves the previously active
//! configuration in force.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Conditions are data and therefore acyclic, but an absurdly deep document
/// could still exhaust the evaluation stack; bound it at load time.
pub const MAX_CONDITION_DEPTH: usize = 64;

/// Key identifying a risk tier (e.g. `T1`, `T2`, `T3`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TierKey(pub String);

impl fmt::Display for TierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TierKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable identifier for a rule within a published rule set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identifier for an evidence artifact in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered risk classification. Severity totally orders tiers and is the
/// sole tie-break mechanism during classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub key: TierKey,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: u8,
}

/// Side effects attached to a triggered rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleEffects {
    pub add_required_artifacts: BTreeSet<ArtifactId>,
    pub add_risk_flags: BTreeSet<String>,
    pub triggered_criteria: Option<String>,
}

/// A named condition-to-tier mapping. Immutable once part of a published
/// rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub tier: TierKey,
    pub conditions: Condition,
    #[serde(default)]
    pub effects: RuleEffects,
}

/// Evidence artifact required purely by virtue of the resolved tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDefinition {
    pub id: ArtifactId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub required_for_tiers: BTreeSet<TierKey>,
}

/// Outcome of a model-definition criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelClassification {
    Yes,
    ModelLike,
    No,
}

impl ModelClassification {
    pub const fn label(self) -> &'static str {
        match self {
            ModelClassification::Yes => "yes",
            ModelClassification::ModelLike => "model_like",
            ModelClassification::No => "no",
        }
    }
}

/// One entry of the ordered model-definition scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCriterion {
    pub condition: Condition,
    pub result: ModelClassification,
}

/// The aggregate configuration the classification engine binds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub version: String,
    pub tiers: Vec<Tier>,
    pub default_tier: TierKey,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub model_criteria: Vec<ModelCriterion>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactDefinition>,
}

impl RuleSet {
    /// Parse and fully validate a rule-set document.
    pub fn from_json(source: &str) -> Result<Self, RuleSetError> {
        let rule_set: RuleSet = serde_json::from_str(source)?;
        rule_set.validate()?;
        Ok(rule_set)
    }

    /// Reject dangling tier references, duplicate identifiers, and
    /// over-deep condition trees before the set can become active.
    pub fn validate(&self) -> Result<(), RuleSetError> {
        if self.tiers.is_empty() {
            return Err(RuleSetError::NoTiers);
        }

        let mut tier_keys = BTreeSet::new();
        for tier in &self.tiers {
            if !tier_keys.insert(tier.key.clone()) {
                return Err(RuleSetError::DuplicateTierKey(tier.key.clone()));
            }
        }

        if !tier_keys.contains(&self.default_tier) {
            return Err(RuleSetError::UnknownDefaultTier(self.default_tier.clone()));
        }

        let mut rule_ids = BTreeSet::new();
        for rule in &self.rules {
            if !rule_ids.insert(rule.id.clone()) {
                return Err(RuleSetError::DuplicateRuleId(rule.id.clone()));
            }
            if !tier_keys.contains(&rule.tier) {
                return Err(RuleSetError::UnknownRuleTier {
                    rule: rule.id.clone(),
                    tier: rule.tier.clone(),
                });
            }
            let depth = rule.conditions.depth();
            if depth > MAX_CONDITION_DEPTH {
                return Err(RuleSetError::ConditionTooDeep {
                    rule: rule.id.clone(),
                    depth,
                });
            }
        }

        let mut artifact_ids = BTreeSet::new();
        for artifact in &self.artifacts {
            if !artifact_ids.insert(artifact.id.clone()) {
                return Err(RuleSetError::DuplicateArtifactId(artifact.id.clone()));
            }
            for tier in &artifact.required_for_tiers {
                if !tier_keys.contains(tier) {
                    return Err(RuleSetError::UnknownArtifactTier {
                        artifact: artifact.id.clone(),
                        tier: tier.clone(),
                    });
                }
            }
        }

        for (index, criterion) in self.model_criteria.iter().enumerate() {
            let depth = criterion.condition.depth();
            if depth > MAX_CONDITION_DEPTH {
                return Err(RuleSetError::CriterionTooDeep { index, depth });
            }
        }

        Ok(())
    }

    pub fn tier(&self, key: &TierKey) -> Option<&Tier> {
        self.tiers.iter().find(|tier| &tier.key == key)
    }

    /// Severity of a tier key. Validated rule sets never miss; absent keys
    /// rank below every real tier.
    pub fn severity(&self, key: &TierKey) -> u8 {
        self.tier(key).map_or(0, |tier| tier.severity)
    }
}

/// Per-tier validation cadence in months. Versioned independently from the
/// tier table but co-evolving with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationFrequencies(pub BTreeMap<TierKey, u32>);

impl ValidationFrequencies {
    pub fn months_for(&self, tier: &TierKey) -> Option<u32> {
        self.0.get(tier).copied()
    }

    pub fn insert(&mut self, tier: TierKey, months: u32) {
        self.0.insert(tier, months);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TierKey, u32)> {
        self.0.iter().map(|(tier, months)| (tier, *months))
    }

    /// Overlay these frequencies onto `base`: tiers absent from `self`
    /// keep their cadence from `base`.
    pub fn merged_over(&self, base: &ValidationFrequencies) -> ValidationFrequencies {
        let mut merged = base.0.clone();
        for (tier, months) in &self.0 {
            merged.insert(tier.clone(), *months);
        }
        ValidationFrequencies(merged)
    }
}

impl FromIterator<(TierKey, u32)> for ValidationFrequencies {
    fn from_iter<T: IntoIterator<Item = (TierKey, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Configuration-load failures. All of these are fatal for the candidate
/// document and leave the active rule set untouched.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("invalid rule set document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("rule set declares no tiers")]
    NoTiers,
    #[error("duplicate tier key {0}")]
    DuplicateTierKey(TierKey),
    #[error("default tier {0} is not declared")]
    UnknownDefaultTier(TierKey),
    #[error("rule {rule} references unknown tier {tier}")]
    UnknownRuleTier { rule: RuleId, tier: TierKey },
    #[error("duplicate rule id {0}")]
    DuplicateRuleId(RuleId),
    #[error("duplicate artifact id {0}")]
    DuplicateArtifactId(ArtifactId),
    #[error("artifact {artifact} references unknown tier {tier}")]
    UnknownArtifactTier { artifact: ArtifactId, tier: TierKey },
    #[error("rule {rule} condition tree depth {depth} exceeds limit {MAX_CONDITION_DEPTH}")]
    ConditionTooDeep { rule: RuleId, depth: usize },
    #[error("model criterion {index} condition tree depth {depth} exceeds limit {MAX_CONDITION_DEPTH}")]
    CriterionTooDeep { index: usize, depth: usize },
}
