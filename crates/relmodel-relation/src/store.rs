//! Boundaries to the local store and to remote data services.

use asupersync::{Cx, Outcome};
use relmodel_core::{Error, Record};
use relmodel_query::{AggregationParam, QueryParam, ResponseResult, SelectStatement};
use std::future::Future;
use std::pin::Pin;

/// Boxed future yielding an `Outcome`; keeps the store traits object-safe.
pub type BoxOutcome<'a, T> = Pin<Box<dyn Future<Output = Outcome<T, Error>> + Send + 'a>>;

/// A local relational store.
///
/// One method covers point fetches, in-list fetches with ordering, projections,
/// counts and grouped aggregation: the statement says which. Rows come back
/// keyed by column name (`KEY`/`VALUE` for grouped statements).
pub trait LocalStore: Send + Sync {
    fn select<'a>(
        &'a self,
        cx: &'a Cx,
        statement: &'a SelectStatement,
    ) -> BoxOutcome<'a, Vec<Record>>;
}

/// Client for a remote data service.
///
/// `Outcome::Err` is a transport failure; a delivered failure comes back as
/// `ResponseResult { success: false, .. }`. Records are keyed by field name.
pub trait RemoteClient: Send + Sync {
    fn list_by<'a>(
        &'a self,
        cx: &'a Cx,
        param: QueryParam,
    ) -> BoxOutcome<'a, ResponseResult<Vec<Record>>>;

    fn get_by<'a>(
        &'a self,
        cx: &'a Cx,
        param: QueryParam,
    ) -> BoxOutcome<'a, ResponseResult<Option<Record>>>;

    /// Like `list_by`, projecting `param.select_fields` only.
    fn list_map_by<'a>(
        &'a self,
        cx: &'a Cx,
        param: QueryParam,
    ) -> BoxOutcome<'a, ResponseResult<Vec<Record>>>;

    /// Grouped aggregation; rows carry `KEY` and `VALUE`.
    fn aggregate_by<'a>(
        &'a self,
        cx: &'a Cx,
        param: AggregationParam,
    ) -> BoxOutcome<'a, ResponseResult<Vec<Record>>>;
}
