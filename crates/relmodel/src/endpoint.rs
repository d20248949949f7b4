//! Server side of the remote data contract, and an in-process client for it.

use crate::service::DataService;
use asupersync::{Cx, Outcome};
use relmodel_core::{Error, Record, RemoteDataError, Value, ValueKey};
use relmodel_query::{AggregationKind, AggregationParam, Criteria, KEY, QueryParam, ResponseResult, VALUE};
use relmodel_relation::{
    BoxOutcome, PredicateMap, RelationParam, RemoteClient, remote::distinct, try_outcome, try_result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Wrap a service outcome in a response envelope. Errors become failed
/// envelopes; cancellation and panics pass through.
fn respond<T>(outcome: Outcome<T, Error>) -> Outcome<ResponseResult<T>, Error> {
    match outcome {
        Outcome::Ok(data) => Outcome::Ok(ResponseResult::ok(data)),
        Outcome::Err(e) => {
            tracing::warn!(error = %e, "Remote request failed");
            Outcome::Ok(ResponseResult::error(e.to_string()))
        }
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}

/// Answers `list_by`, `get_by`, `list_map_by` and `aggregate_by` for one data service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    data: Arc<DataService>,
}

impl ServiceEndpoint {
    pub fn new(data: Arc<DataService>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &Arc<DataService> {
        &self.data
    }

    fn log_request(&self, operation: &str) {
        let config = self.data.config().current();
        if config.log_queries {
            tracing::info!(
                service = %config.service_name,
                entity = %self.data.name(),
                operation,
                "Remote request"
            );
        }
    }

    async fn query(&self, cx: &Cx, param: &QueryParam) -> Outcome<Vec<Record>, Error> {
        let mut records = try_outcome!(
            self.data
                .get_list_by(cx, &param.criteria, param.order_by.as_deref())
                .await
        );
        if param.with_dict {
            try_outcome!(
                self.data
                    .build_relation_for_data_list(
                        cx,
                        &mut records,
                        &RelationParam::dict_only(),
                        &PredicateMap::new(),
                    )
                    .await
            );
        }
        if let Some(fields) = &param.select_fields {
            records = records.iter().map(|r| r.project(fields)).collect();
        }
        Outcome::Ok(records)
    }

    pub async fn list_by(&self, cx: &Cx, param: &QueryParam) -> Outcome<ResponseResult<Vec<Record>>, Error> {
        self.log_request("list_by");
        respond(self.query(cx, param).await)
    }

    /// First matching record, if any.
    pub async fn get_by(&self, cx: &Cx, param: &QueryParam) -> Outcome<ResponseResult<Option<Record>>, Error> {
        self.log_request("get_by");
        let outcome = match self.query(cx, param).await {
            Outcome::Ok(records) => Outcome::Ok(records.into_iter().next()),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        };
        respond(outcome)
    }

    /// Like `list_by`; a missing projection is an error.
    pub async fn list_map_by(&self, cx: &Cx, param: &QueryParam) -> Outcome<ResponseResult<Vec<Record>>, Error> {
        self.log_request("list_map_by");
        if param.select_fields.as_ref().is_none_or(Vec::is_empty) {
            return Outcome::Ok(ResponseResult::error("list_map_by requires select fields"));
        }
        respond(self.query(cx, param).await)
    }

    pub async fn aggregate_by(
        &self,
        cx: &Cx,
        param: &AggregationParam,
    ) -> Outcome<ResponseResult<Vec<Record>>, Error> {
        self.log_request("aggregate_by");
        let outcome = match param.kind {
            AggregationKind::OneToMany => self.aggregate_one_to_many(cx, param).await,
            AggregationKind::ManyToMany => self.aggregate_many_to_many(cx, param).await,
        };
        respond(outcome)
    }

    async fn aggregate_one_to_many(&self, cx: &Cx, param: &AggregationParam) -> Outcome<Vec<Record>, Error> {
        let Some(group_field) = param.group_field.as_deref() else {
            return Outcome::Err(Error::Custom(
                "one-to-many aggregation requires a group field".to_string(),
            ));
        };
        let local = self.data.local();
        let conditions = try_result!(local.criteria_conditions(&param.criteria));
        local
            .aggregate(
                cx,
                conditions,
                group_field,
                param.aggregation_type,
                &param.aggregation_field,
            )
            .await
    }

    /// One aggregate per group key over the rows whose `in_filter_field` is in
    /// that group's values. Fetches the union of all groups once.
    async fn aggregate_many_to_many(&self, cx: &Cx, param: &AggregationParam) -> Outcome<Vec<Record>, Error> {
        let Some(in_field) = param.in_filter_field.as_deref() else {
            return Outcome::Err(Error::Custom(
                "many-to-many aggregation requires an in-filter field".to_string(),
            ));
        };
        let all = distinct(
            param
                .grouped_in_filter_values
                .iter()
                .flat_map(|g| g.values.iter().cloned()),
        );
        if all.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let mut criteria = param.criteria.clone();
        criteria.push(Criteria::in_list(in_field, all));
        let rows = try_outcome!(
            self.data
                .local()
                .project_by(
                    cx,
                    &criteria,
                    &[in_field.to_string(), param.aggregation_field.clone()],
                )
                .await
        );
        let mut by_id: HashMap<ValueKey, Vec<Value>> = HashMap::new();
        for row in rows {
            if let Some(key) = row.get_or_null(in_field).key() {
                by_id
                    .entry(key)
                    .or_default()
                    .push(row.get_or_null(&param.aggregation_field));
            }
        }
        let out = param
            .grouped_in_filter_values
            .iter()
            .map(|group| {
                let values = group
                    .values
                    .iter()
                    .filter_map(Value::key)
                    .filter_map(|k| by_id.get(&k))
                    .flatten();
                Record::new()
                    .with(KEY, group.key.clone())
                    .with(VALUE, param.aggregation_type.apply(values))
            })
            .collect();
        Outcome::Ok(out)
    }
}

#[derive(Debug, Default)]
struct CallLog {
    operations: Vec<&'static str>,
    /// Answer every call with a failed envelope carrying this message
    error_message: Option<String>,
}

/// `RemoteClient` that dispatches to a `ServiceEndpoint` in the same process.
///
/// Records the operations it forwards and can be told to fail, either with a
/// delivered failure envelope or at the transport level.
#[derive(Debug)]
pub struct InProcessClient {
    name: String,
    endpoint: ServiceEndpoint,
    transport_down: AtomicBool,
    log: Mutex<CallLog>,
}

impl InProcessClient {
    pub fn new(name: impl Into<String>, endpoint: ServiceEndpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            transport_down: AtomicBool::new(false),
            log: Mutex::new(CallLog::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).operations.len()
    }

    /// Operations called so far, oldest first.
    pub fn operations(&self) -> Vec<&'static str> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .operations
            .clone()
    }

    /// Answer subsequent calls with `success: false` and `message`; `None` restores service.
    pub fn fail_with(&self, message: Option<&str>) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error_message = message.map(str::to_string);
    }

    /// Fail subsequent calls before they reach the endpoint.
    pub fn set_transport_down(&self, down: bool) {
        self.transport_down.store(down, Ordering::Release);
    }

    /// Record the call and return the injected failure, if any.
    fn intercept<T>(&self, operation: &'static str) -> Option<Outcome<ResponseResult<T>, Error>> {
        tracing::debug!(client = %self.name, operation, "Remote call");
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.operations.push(operation);
        if self.transport_down.load(Ordering::Acquire) {
            return Some(Outcome::Err(Error::Remote(RemoteDataError {
                service: self.name.clone(),
                operation,
                message: "connection refused".to_string(),
            })));
        }
        log.error_message
            .as_ref()
            .map(|message| Outcome::Ok(ResponseResult::error(message.clone())))
    }
}

impl RemoteClient for InProcessClient {
    fn list_by<'a>(&'a self, cx: &'a Cx, param: QueryParam) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
        Box::pin(async move {
            if let Some(failure) = self.intercept("list_by") {
                return failure;
            }
            self.endpoint.list_by(cx, &param).await
        })
    }

    fn get_by<'a>(&'a self, cx: &'a Cx, param: QueryParam) -> BoxOutcome<'a, ResponseResult<Option<Record>>> {
        Box::pin(async move {
            if let Some(failure) = self.intercept("get_by") {
                return failure;
            }
            self.endpoint.get_by(cx, &param).await
        })
    }

    fn list_map_by<'a>(&'a self, cx: &'a Cx, param: QueryParam) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
        Box::pin(async move {
            if let Some(failure) = self.intercept("list_map_by") {
                return failure;
            }
            self.endpoint.list_map_by(cx, &param).await
        })
    }

    fn aggregate_by<'a>(
        &'a self,
        cx: &'a Cx,
        param: AggregationParam,
    ) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
        Box::pin(async move {
            if let Some(failure) = self.intercept("aggregate_by") {
                return failure;
            }
            self.endpoint.aggregate_by(cx, &param).await
        })
    }
}
