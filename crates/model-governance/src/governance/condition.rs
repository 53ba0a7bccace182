//! Recursive boolean condition language evaluated against entity attributes.
//!
//! Evaluation is pure and total: a malformed or missing attribute never
//! raises an error, it fails the comparison and emits a soft warning for
//! audit. Malformed condition *documents* are rejected at parse time
//! instead, so the evaluator only ever sees well-formed trees.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Flat attribute map describing one entity at intake time.
pub type AttributeMap = BTreeMap<String, Value>;

/// Comparison operators supported by leaf conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Eq,
    Neq,
    In,
    NotIn,
    Contains,
    NotEmpty,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A condition node: either a single field comparison or a composite
/// conjunction/disjunction over children. A node is never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    All {
        all: Vec<Condition>,
    },
    Any {
        any: Vec<Condition>,
    },
    Leaf {
        field: String,
        operator: ConditionOperator,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        value: Value,
    },
}

/// Raw wire shape used to reject malformed nodes (for example a node that
/// sets both `all` and `any`, or a leaf missing its operator) before they
/// can reach the evaluator.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCondition {
    field: Option<String>,
    operator: Option<ConditionOperator>,
    #[serde(default)]
    value: Option<Value>,
    all: Option<Vec<Condition>>,
    any: Option<Vec<Condition>>,
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawCondition::deserialize(deserializer)?;
        match raw {
            RawCondition {
                field: None,
                operator: None,
                value: None,
                all: Some(children),
                any: None,
            } => Ok(Condition::All { all: children }),
            RawCondition {
                field: None,
                operator: None,
                value: None,
                all: None,
                any: Some(children),
            } => Ok(Condition::Any { any: children }),
            RawCondition {
                field: Some(field),
                operator: Some(operator),
                value,
                all: None,
                any: None,
            } => Ok(Condition::Leaf {
                field,
                operator,
                value: value.unwrap_or(Value::Null),
            }),
            _ => Err(serde::de::Error::custom(
                "condition node must be either a leaf (field + operator) \
                 or exactly one of `all`/`any`",
            )),
        }
    }
}

impl Condition {
    /// Maximum nesting of the condition tree, counted from this node.
    pub fn depth(&self) -> usize {
        match self {
            Condition::Leaf { .. } => 1,
            Condition::All { all: children } | Condition::Any { any: children } => {
                1 + children.iter().map(Condition::depth).max().unwrap_or(0)
            }
        }
    }
}

/// Evaluate a condition tree against an attribute map.
///
/// Composite semantics: empty `all` is vacuously true, empty `any` is
/// false; both short-circuit.
pub fn evaluate(condition: &Condition, attributes: &AttributeMap) -> bool {
    match condition {
        Condition::All { all } => all.iter().all(|child| evaluate(child, attributes)),
        Condition::Any { any } => any.iter().any(|child| evaluate(child, attributes)),
        Condition::Leaf {
            field,
            operator,
            value,
        } => evaluate_leaf(field, *operator, value, attributes),
    }
}

fn evaluate_leaf(
    field: &str,
    operator: ConditionOperator,
    expected: &Value,
    attributes: &AttributeMap,
) -> bool {
    let actual = attributes.get(field);

    match operator {
        ConditionOperator::NotEmpty => actual.map_or(false, is_non_empty),
        ConditionOperator::Eq => match actual {
            Some(actual) => actual == expected,
            None => missing_field(field, operator),
        },
        ConditionOperator::Neq => match actual {
            Some(actual) => actual != expected,
            None => missing_field(field, operator),
        },
        ConditionOperator::In => match (actual, expected.as_array()) {
            (Some(actual), Some(candidates)) => candidates.contains(actual),
            (None, _) => missing_field(field, operator),
            // A non-array membership list can never match.
            (_, None) => false,
        },
        ConditionOperator::NotIn => match (actual, expected.as_array()) {
            (Some(actual), Some(candidates)) => !candidates.contains(actual),
            (None, _) => missing_field(field, operator),
            // Safe default: nothing is a member of a malformed list.
            (_, None) => true,
        },
        ConditionOperator::Contains => match actual {
            Some(Value::Array(items)) => items.contains(expected),
            Some(Value::String(haystack)) => expected
                .as_str()
                .map_or(false, |needle| haystack.contains(needle)),
            Some(_) => false,
            None => missing_field(field, operator),
        },
        ConditionOperator::Gt
        | ConditionOperator::Lt
        | ConditionOperator::Gte
        | ConditionOperator::Lte => match actual {
            Some(actual) => numeric_compare(field, operator, actual, expected),
            None => missing_field(field, operator),
        },
    }
}

fn numeric_compare(
    field: &str,
    operator: ConditionOperator,
    actual: &Value,
    expected: &Value,
) -> bool {
    let (Some(actual), Some(expected)) = (actual.as_f64(), expected.as_f64()) else {
        warn!(
            field,
            ?operator,
            "non-numeric operand for numeric comparison; resolving to false"
        );
        return false;
    };

    match operator {
        ConditionOperator::Gt => actual > expected,
        ConditionOperator::Lt => actual < expected,
        ConditionOperator::Gte => actual >= expected,
        ConditionOperator::Lte => actual <= expected,
        _ => false,
    }
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::String(text) => !text.trim().is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => true,
    }
}

fn missing_field(field: &str, operator: ConditionOperator) -> bool {
    warn!(
        field,
        ?operator,
        "attribute missing during condition evaluation; resolving to false"
    );
    false
}
