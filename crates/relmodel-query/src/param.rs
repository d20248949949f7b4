//! Parameters and envelopes exchanged with remote data services.

use crate::aggregate::{AggregationKind, AggregationType};
use crate::criteria::Criteria;
use relmodel_core::{Error, RemoteDataError, Result, Value};
use serde::{Deserialize, Serialize};

/// Filter/projection request for `list_by`, `get_by` and `list_map_by`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    pub criteria: Vec<Criteria>,
    /// Fields to project; `None` returns whole records
    #[serde(default)]
    pub select_fields: Option<Vec<String>>,
    /// Ask the remote side to resolve its own dictionary relations
    #[serde(default)]
    pub with_dict: bool,
    #[serde(default)]
    pub order_by: Option<String>,
}

impl QueryParam {
    pub fn new(criteria: Vec<Criteria>) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    pub fn select(mut self, fields: Vec<String>) -> Self {
        self.select_fields = Some(fields);
        self
    }

    pub fn with_dict(mut self, with_dict: bool) -> Self {
        self.with_dict = with_dict;
        self
    }
}

/// Value set belonging to one group key of a many-to-many aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedInFilter {
    pub key: Value,
    pub values: Vec<Value>,
}

/// Grouped aggregation request for `aggregate_by`.
///
/// One-to-many: rows matching `criteria` are grouped by `group_field`.
/// Many-to-many: for each entry of `grouped_in_filter_values`, rows whose
/// `in_filter_field` is in the entry's values (and match `criteria`) are
/// aggregated under the entry's key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationParam {
    pub kind: AggregationKind,
    pub aggregation_type: AggregationType,
    pub aggregation_field: String,
    pub group_field: Option<String>,
    pub in_filter_field: Option<String>,
    #[serde(default)]
    pub grouped_in_filter_values: Vec<GroupedInFilter>,
    #[serde(default)]
    pub criteria: Vec<Criteria>,
}

/// Envelope every remote call answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult<T> {
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ResponseResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            error_message: None,
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Unwrap the payload, turning a failure into a remote data error.
    ///
    /// A successful envelope without data yields `T::default()`.
    pub fn into_result(self, service: &str, operation: &'static str) -> Result<T>
    where
        T: Default,
    {
        if self.success {
            Ok(self.data.unwrap_or_default())
        } else {
            Err(Error::Remote(RemoteDataError {
                service: service.to_string(),
                operation,
                message: self
                    .error_message
                    .unwrap_or_else(|| "remote call failed".to_string()),
            }))
        }
    }
}
