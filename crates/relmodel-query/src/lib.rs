//! Typed query fragments for relmodel.
//!
//! `relmodel-query` is the **query construction layer** used by the relation
//! engine. It never talks to a store itself; it renders and describes:
//!
//! - **Predicates**: `Criteria` with a typed `Operator`, tagged with the model they target.
//! - **Statements**: `SelectStatement` over typed `ColumnRef`s, rendered to SQL text.
//! - **Aggregation**: `build_grouped_query` and the join elision rule for many-to-many aggregates.
//! - **Wire parameters**: `QueryParam`, `AggregationParam` and the `ResponseResult` envelope
//!   exchanged with remote services.

pub mod aggregate;
pub mod criteria;
pub mod ident;
pub mod param;
pub mod statement;

pub use aggregate::{
    AggregationKind, AggregationType, GroupedQuery, KEY, VALUE, build_grouped_query,
    only_select_relation_table,
};
pub use criteria::{Criteria, Operator, compare_values, render_literal};
pub use ident::{is_valid_identifier, validate_identifier};
pub use param::{AggregationParam, GroupedInFilter, QueryParam, ResponseResult};
pub use statement::{COUNT_ALIAS, ColumnRef, Condition, OrderBy, SelectList, SelectStatement};
