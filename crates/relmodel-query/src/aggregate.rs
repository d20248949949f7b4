//! Grouped aggregation fragments.

use crate::criteria::{Criteria, compare_values};
use crate::ident::validate_identifier;
use crate::statement::{ColumnRef, SelectList};
use relmodel_core::{EntityMeta, Error, Result, SchemaErrorKind, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alias of the grouping column in an aggregation result row.
pub const KEY: &str = "KEY";
/// Alias of the aggregated scalar in an aggregation result row.
pub const VALUE: &str = "VALUE";

/// Aggregate function applied to the slave rows of each master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationType {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregationType {
    /// Parse the numeric code used in relation declarations (SUM=0 .. MAX=4).
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(AggregationType::Sum),
            1 => Ok(AggregationType::Count),
            2 => Ok(AggregationType::Avg),
            3 => Ok(AggregationType::Min),
            4 => Ok(AggregationType::Max),
            other => Err(Error::schema(
                SchemaErrorKind::InvalidAggregation,
                format!("invalid aggregation type code: {}", other),
            )),
        }
    }

    pub const fn code(self) -> i32 {
        match self {
            AggregationType::Sum => 0,
            AggregationType::Count => 1,
            AggregationType::Avg => 2,
            AggregationType::Min => 3,
            AggregationType::Max => 4,
        }
    }

    pub const fn function_name(self) -> &'static str {
        match self {
            AggregationType::Sum => "SUM",
            AggregationType::Count => "COUNT",
            AggregationType::Avg => "AVG",
            AggregationType::Min => "MIN",
            AggregationType::Max => "MAX",
        }
    }
}

impl AggregationType {
    /// Evaluate the function over a group's values the way SQL does: NULLs are
    /// skipped, and an empty group yields NULL (COUNT yields 0).
    pub fn apply<'a>(self, values: impl IntoIterator<Item = &'a Value>) -> Value {
        let values: Vec<&Value> = values.into_iter().filter(|v| !v.is_null()).collect();
        match self {
            AggregationType::Count => Value::from_u64_clamped(values.len() as u64),
            _ if values.is_empty() => Value::Null,
            AggregationType::Sum => {
                if values.iter().all(|v| matches!(v, Value::Int(_) | Value::BigInt(_))) {
                    Value::BigInt(values.iter().filter_map(|v| v.as_i64()).sum())
                } else {
                    Value::Double(values.iter().filter_map(|v| v.as_f64()).sum())
                }
            }
            AggregationType::Avg => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggregationType::Min => extreme(&values, std::cmp::Ordering::Less),
            AggregationType::Max => extreme(&values, std::cmp::Ordering::Greater),
        }
    }
}

fn extreme(values: &[&Value], wanted: std::cmp::Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for &value in values {
        best = match best {
            Some(current) if compare_values(value, current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

impl FromStr for AggregationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SUM" => Ok(AggregationType::Sum),
            "COUNT" => Ok(AggregationType::Count),
            "AVG" => Ok(AggregationType::Avg),
            "MIN" => Ok(AggregationType::Min),
            "MAX" => Ok(AggregationType::Max),
            _ => Err(Error::schema(
                SchemaErrorKind::InvalidAggregation,
                format!("invalid aggregation type: {}", s),
            )),
        }
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

/// Shape of a remote aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationKind {
    OneToMany,
    ManyToMany,
}

/// Grouped select list plus its GROUP BY column.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedQuery {
    pub key: ColumnRef,
    pub function: AggregationType,
    pub value: ColumnRef,
}

impl GroupedQuery {
    /// `"<g>.<gc> AS KEY, <FUNC>(<a>.<ac>) AS VALUE"`
    pub fn select_fragment(&self) -> String {
        format!(
            "{} AS {}, {}({}) AS {}",
            self.key,
            KEY,
            self.function.function_name(),
            self.value,
            VALUE
        )
    }

    /// `"<g>.<gc>"`
    pub fn group_by_fragment(&self) -> String {
        self.key.to_string()
    }

    pub fn select_list(&self) -> SelectList {
        SelectList::Grouped {
            key: self.key.clone(),
            function: self.function,
            value: self.value.clone(),
        }
    }

    pub fn group_by(&self) -> ColumnRef {
        self.key.clone()
    }
}

/// Build the grouped select list for an aggregation.
///
/// The aggregation field is resolved to its column through `aggregation_model`;
/// a field with no column mapping is rejected.
pub fn build_grouped_query(
    group_table: &str,
    group_column: &str,
    aggregation_model: &EntityMeta,
    aggregation_field: &str,
    aggregation_type: AggregationType,
) -> Result<GroupedQuery> {
    let column = aggregation_model.column_of(aggregation_field).ok_or_else(|| {
        Error::schema(
            SchemaErrorKind::UnknownField,
            format!(
                "aggregation field '{}' is not mapped on model '{}'",
                aggregation_field, aggregation_model.name
            ),
        )
    })?;
    validate_identifier(group_table)?;
    validate_identifier(group_column)?;
    validate_identifier(&aggregation_model.table)?;
    validate_identifier(column)?;
    Ok(GroupedQuery {
        key: ColumnRef::new(group_table, group_column),
        function: aggregation_type,
        value: ColumnRef::new(aggregation_model.table.clone(), column),
    })
}

/// Can a many-to-many aggregate be answered from the join table alone?
///
/// Only when the aggregated field lives on the join table and no predicate
/// for the relation names the slave model.
pub fn only_select_relation_table(
    aggregation_on_relation: bool,
    slave_model: &str,
    predicates: &[Criteria],
) -> bool {
    aggregation_on_relation && !predicates.iter().any(|c| c.targets(slave_model))
}
