//! Relation assembly for relmodel.
//!
//! `relmodel-relation` turns declarative relation tables into a compiled,
//! read-only schema and uses it to enrich entity batches with related data.
//!
//! # Role In The Architecture
//!
//! - **Declarations** (`RelationInfo`, `EntityDeclaration`): what each relation field means.
//! - **Sources** (`LocalStore`, `LocalService`, `RemoteClient`, `ConstDict`): where slave data lives.
//! - **Services** (`ServiceRegistry`): explicit wiring of sources by name.
//! - **Schema** (`SchemaRegistry`, `RelationSchema`): compiled relation lists per entity,
//!   loaded in a local pass and a later remote pass.
//! - **Engine** (`Assembler`): fixed-order, batched enrichment with policy-driven
//!   handling of remote failures.

/// Await an `Outcome`, returning early on anything but `Ok`.
#[macro_export]
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(v) => v,
            ::asupersync::Outcome::Err(e) => return ::asupersync::Outcome::Err(e),
            ::asupersync::Outcome::Cancelled(r) => return ::asupersync::Outcome::Cancelled(r),
            ::asupersync::Outcome::Panicked(p) => return ::asupersync::Outcome::Panicked(p),
        }
    };
}

/// Unwrap a `Result` inside an `Outcome`-returning function.
#[macro_export]
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => return ::asupersync::Outcome::Err(e.into()),
        }
    };
}

pub mod engine;
pub mod info;
pub mod planner;
pub mod policy;
pub mod registry;
pub mod remote;
pub mod request;
pub mod schema;
pub mod services;
pub mod source;
pub mod store;

pub use engine::Assembler;
pub use info::{EntityDeclaration, LinkInfo, RelationInfo, RelationKind, SlaveSource};
pub use policy::{FixedPolicy, RemoteErrorPolicy};
pub use registry::SchemaRegistry;
pub use request::{PredicateMap, RelationParam};
pub use schema::{
    CompiledAggregation, CompiledLink, CompiledRelation, LocalRelations, RelationSchema,
    RemoteRelations, SlaveHandle, compile_local, compile_remote,
};
pub use services::ServiceRegistry;
pub use source::{ConstDict, LocalService};
pub use store::{BoxOutcome, LocalStore, RemoteClient};
