//! Core types for relmodel.
//!
//! This crate provides the foundational abstractions shared by the query
//! builder, the relation engine and the service facade:
//!
//! - `Value` and `ValueKey` for dynamically typed field values
//! - `Record` for column/field keyed rows
//! - `Entity` trait, the typed field lens the engine reads and writes through
//! - `EntityMeta` describing an entity's table, id, soft-delete and update-time fields
//! - `Error` taxonomy shared by every crate
//! - `Outcome` and `Cx` re-exported from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod entity;
pub mod error;
pub mod meta;
pub mod record;
pub mod value;

pub use entity::Entity;
pub use error::{
    AccessError, AccessErrorKind, ConfigError, Error, QueryError, RemoteDataError, Result,
    SchemaError, SchemaErrorKind,
};
pub use meta::{DeletedFlag, EntityMeta, FieldMeta};
pub use record::Record;
pub use value::{Value, ValueKey};
