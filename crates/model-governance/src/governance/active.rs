//! The explicit, immutable "active configuration" the classification
//! engine binds to. Activation is a single atomic reference swap under the
//! policy-apply lock; there is no in-place mutation and no implicit global
//! state.

use std::sync::{Arc, PoisonError, RwLock};

use super::repository::PolicyId;
use super::ruleset::{RuleSet, ValidationFrequencies};

/// One immutable snapshot of the governing configuration.
#[derive(Debug, Clone)]
pub struct ActiveSnapshot {
    pub rule_set: Arc<RuleSet>,
    pub frequencies: Arc<ValidationFrequencies>,
    /// The policy whose application produced these cadences, if any.
    pub applied_policy: Option<PolicyId>,
}

/// Holder for the current snapshot. Readers clone an `Arc` and keep
/// classifying against a consistent view even while a swap happens.
pub struct ActiveConfiguration {
    inner: RwLock<Arc<ActiveSnapshot>>,
}

impl ActiveConfiguration {
    pub fn new(rule_set: RuleSet, frequencies: ValidationFrequencies) -> Self {
        let snapshot = ActiveSnapshot {
            rule_set: Arc::new(rule_set),
            frequencies: Arc::new(frequencies),
            applied_policy: None,
        };
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<ActiveSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in new cadences produced by applying `policy`, keeping the
    /// current rule set.
    pub(crate) fn activate_frequencies(
        &self,
        frequencies: ValidationFrequencies,
        policy: PolicyId,
    ) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = ActiveSnapshot {
            rule_set: guard.rule_set.clone(),
            frequencies: Arc::new(frequencies),
            applied_policy: Some(policy),
        };
        *guard = Arc::new(next);
    }

    /// Install a freshly validated rule set, keeping the current cadences.
    pub(crate) fn install_rule_set(&self, rule_set: RuleSet) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let next = ActiveSnapshot {
            rule_set: Arc::new(rule_set),
            frequencies: guard.frequencies.clone(),
            applied_policy: guard.applied_policy.clone(),
        };
        *guard = Arc::new(next);
    }
}
