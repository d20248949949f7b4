//! Filter predicates.

use regex::Regex;
use relmodel_core::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (<>)
    Ne,
    /// Greater than or equal (>=)
    Ge,
    /// Greater than (>)
    Gt,
    /// Less than or equal (<=)
    Le,
    /// Less than (<)
    Lt,
    /// Pattern match (LIKE)
    Like,
    /// IS NULL, the value is ignored
    IsNull,
    /// IS NOT NULL, the value is ignored
    NotNull,
    /// Membership in a list (IN), the value is an `Array`
    In,
}

impl Operator {
    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Lt => "<",
            Operator::Like => "LIKE",
            Operator::IsNull => "IS NULL",
            Operator::NotNull => "IS NOT NULL",
            Operator::In => "IN",
        }
    }

    /// Does the operator take a right-hand value?
    pub const fn is_unary(self) -> bool {
        matches!(self, Operator::IsNull | Operator::NotNull)
    }

    /// Evaluate `lhs <op> rhs` with SQL-like NULL handling.
    pub fn test(self, lhs: &Value, rhs: &Value) -> bool {
        match self {
            Operator::IsNull => lhs.is_null(),
            Operator::NotNull => !lhs.is_null(),
            _ if lhs.is_null() => false,
            Operator::Eq => values_equal(lhs, rhs),
            Operator::Ne => !rhs.is_null() && !values_equal(lhs, rhs),
            Operator::Ge => compare_values(lhs, rhs).is_some_and(Ordering::is_ge),
            Operator::Gt => compare_values(lhs, rhs).is_some_and(Ordering::is_gt),
            Operator::Le => compare_values(lhs, rhs).is_some_and(Ordering::is_le),
            Operator::Lt => compare_values(lhs, rhs).is_some_and(Ordering::is_lt),
            Operator::Like => match (lhs.as_str(), rhs.as_str()) {
                (Some(text), Some(pattern)) => like_match(text, pattern),
                _ => false,
            },
            Operator::In => rhs
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(lhs, item))),
        }
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.key(), rhs.key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Order two non-null values: numerically, then by timestamp, then as text.
pub fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return a.partial_cmp(&b);
    }
    match (lhs, rhs) {
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => match (lhs.as_str(), rhs.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn like_match(text: &str, pattern: &str) -> bool {
    let mut re = String::with_capacity(pattern.len() + 4);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).is_ok_and(|re| re.is_match(text))
}

/// A single filter predicate: `[model.]field <op> value`.
///
/// `model` names the entity the field belongs to. Relation predicates use it
/// to decide which side of a join (or which remote service) a filter targets;
/// `None` means the model the predicate is applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub model: Option<String>,
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Criteria {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            model: None,
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, Operator::In, Value::Array(values))
    }

    /// Tag the predicate with the model it targets.
    pub fn on_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Is this predicate aimed at `model`?
    pub fn targets(&self, model: &str) -> bool {
        self.model.as_deref() == Some(model)
    }

    /// Evaluate against a field-keyed record.
    pub fn matches(&self, record: &relmodel_core::Record) -> bool {
        self.operator
            .test(&record.get_or_null(&self.field), &self.value)
    }
}

/// Render a value as an SQL literal.
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) | Value::Timestamp(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(s) => {
            if s.parse::<f64>().is_ok() {
                s.clone()
            } else {
                quote_text(s)
            }
        }
        Value::Text(s) => quote_text(s),
        Value::Json(j) => quote_text(&j.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_literal).collect();
            format!("({})", parts.join(", "))
        }
        Value::Record(_) => quote_text(&serde_json::to_string(value).unwrap_or_default()),
    }
}

fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
