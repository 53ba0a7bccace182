//! Classification of one entity against one immutable rule-set snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::condition::{evaluate, AttributeMap};
use super::ruleset::{ArtifactId, ModelClassification, Rule, RuleId, RuleSet, TierKey};

/// One rule that fired during classification, in rule-set declaration
/// order, with a human-readable rationale for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub rule_id: RuleId,
    pub name: String,
    pub tier: TierKey,
    pub rationale: String,
}

/// Full output of classifying one entity once. Recreated, never merged, on
/// every re-classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub tier: TierKey,
    pub model_classification: ModelClassification,
    pub triggered_rules: Vec<TriggeredRule>,
    pub required_artifacts: BTreeSet<ArtifactId>,
    pub risk_flags: BTreeSet<String>,
    pub rule_set_version: String,
}

/// Stateless engine bound to exactly one active rule-set snapshot.
pub struct ClassificationEngine {
    rule_set: Arc<RuleSet>,
}

impl ClassificationEngine {
    pub fn new(rule_set: Arc<RuleSet>) -> Self {
        Self { rule_set }
    }

    pub fn rule_set(&self) -> &RuleSet {
        &self.rule_set
    }

    /// Deterministically classify an attribute map: same attributes against
    /// the same rule set always yield the same decision.
    pub fn classify(&self, attributes: &AttributeMap) -> Decision {
        let rule_set = &self.rule_set;

        let fired: Vec<&Rule> = rule_set
            .rules
            .iter()
            .filter(|rule| evaluate(&rule.conditions, attributes))
            .collect();

        let triggered: Vec<TriggeredRule> = fired
            .iter()
            .map(|rule| TriggeredRule {
                rule_id: rule.id.clone(),
                name: rule.name.clone(),
                tier: rule.tier.clone(),
                rationale: rule
                    .effects
                    .triggered_criteria
                    .clone()
                    .unwrap_or_else(|| format!("matched rule '{}'", rule.name)),
            })
            .collect();

        // Highest severity wins; ties never override, so the default tier
        // (or the earliest assignment at that severity) stands.
        let mut resolved = rule_set.default_tier.clone();
        let mut max_severity = rule_set.severity(&resolved);
        for rule in &triggered {
            let severity = rule_set.severity(&rule.tier);
            if severity > max_severity {
                max_severity = severity;
                resolved = rule.tier.clone();
            }
        }

        let model_classification = self.model_classification(attributes);

        let mut required_artifacts: BTreeSet<ArtifactId> = fired
            .iter()
            .flat_map(|rule| rule.effects.add_required_artifacts.iter().cloned())
            .collect();
        required_artifacts.extend(
            rule_set
                .artifacts
                .iter()
                .filter(|artifact| artifact.required_for_tiers.contains(&resolved))
                .map(|artifact| artifact.id.clone()),
        );

        let risk_flags: BTreeSet<String> = fired
            .iter()
            .flat_map(|rule| rule.effects.add_risk_flags.iter().cloned())
            .collect();

        debug!(
            tier = %resolved,
            triggered = triggered.len(),
            model = model_classification.label(),
            "classified entity"
        );

        Decision {
            tier: resolved,
            model_classification,
            triggered_rules: triggered,
            required_artifacts,
            risk_flags,
            rule_set_version: rule_set.version.clone(),
        }
    }

    /// Ordered scan of the model-definition criteria: a matching `Yes`
    /// short-circuits; a matching `ModelLike` is remembered but the scan
    /// continues in case a later `Yes` still wins.
    fn model_classification(&self, attributes: &AttributeMap) -> ModelClassification {
        let mut model_like = false;
        for criterion in &self.rule_set.model_criteria {
            if !evaluate(&criterion.condition, attributes) {
                continue;
            }
            match criterion.result {
                ModelClassification::Yes => return ModelClassification::Yes,
                ModelClassification::ModelLike => model_like = true,
                ModelClassification::No => {}
            }
        }

        if model_like {
            ModelClassification::ModelLike
        } else {
            ModelClassification::No
        }
    }
}
