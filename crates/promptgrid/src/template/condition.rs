//! Boolean predicates over the context object.
//!
//! A step renders only if every one of its conditions holds. Conditions are
//! plain data so that specs can be declared in JSON as well as in code.

use super::context::{is_present, resolve};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied by a [`Condition`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "ne", alias = "neq")]
    Ne,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Exists => write!(f, "exists"),
            Operator::Eq => write!(f, "=="),
            Operator::Ne => write!(f, "!="),
        }
    }
}

/// `{field, operator, value?}` predicate on one dot-path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Exists,
            value: None,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: Some(value.into()),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Ne,
            value: Some(value.into()),
        }
    }

    /// Evaluate against `ctx`. Pure.
    ///
    /// An absent field never equals anything: `==` is false and `!=` is true.
    pub fn holds(&self, ctx: &Value) -> bool {
        let resolved = resolve(ctx, &self.field);
        match self.operator {
            Operator::Exists => is_present(resolved),
            Operator::Eq => match (resolved, &self.value) {
                (Some(actual), Some(expected)) => loose_eq(actual, expected),
                _ => false,
            },
            Operator::Ne => match (resolved, &self.value) {
                (Some(actual), Some(expected)) => !loose_eq(actual, expected),
                _ => true,
            },
        }
    }
}

/// Logical AND over `conditions`; an empty list always holds.
pub fn all_hold(conditions: &[Condition], ctx: &Value) -> bool {
    conditions.iter().all(|c| c.holds(ctx))
}

/// Loose equality on primitives.
///
/// Same-typed primitives compare directly. Mixed primitives are coerced to
/// numbers first (`true` is 1, `"42"` is 42, `""` is 0, anything
/// non-numeric is NaN and never equal). Arrays and objects only equal a
/// structurally identical value.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => match (to_number(a), to_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok().filter(|n| !n.is_nan())
            }
        }
        _ => None,
    }
}
