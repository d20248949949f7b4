//! relmodel - declarative relation assembly for data-service layers.
//!
//! Entity types declare their relation fields once (one-to-one, dictionary,
//! constant dictionary, one-to-many and many-to-many aggregates, raw
//! many-to-many). At startup the declarations are compiled against the
//! registered local services and remote clients; at request time a
//! `DataService` reads rows and the `Assembler` fills the relation fields of
//! a whole batch with one fetch per relation.
//!
//! # Quick Start
//!
//! ```ignore
//! use relmodel::prelude::*;
//!
//! let store = Arc::new(SqliteStore::open_memory()?);
//! store.execute_raw("CREATE TABLE zz_course (course_id INTEGER PRIMARY KEY, course_name TEXT)")?;
//! let services = Arc::new(ServiceRegistry::new());
//! services.register_local(Arc::new(LocalService::new(Arc::new(course_meta), store.clone())));
//! let schemas = Arc::new(SchemaRegistry::new(services));
//! schemas.declare(
//!     EntityDeclaration::new(student_meta.relation_fields(["course"]))
//!         .relation(RelationInfo::one_to_one("course", "courseId", SlaveSource::Local, "Course", "courseId")),
//! );
//! schemas.load_local_relations()?;
//! schemas.load_remote_relations()?;
//!
//! let config = Arc::new(ConfigHandle::new(ServiceConfig::new("student")));
//! let assembler = Assembler::new(schemas, config.clone());
//! let students = DataService::new(student_service, assembler, config);
//! let list = students.get_all_list_with_relation(&cx, &RelationParam::normal()).await;
//! ```

pub mod config;
pub mod endpoint;
pub mod service;

pub use config::{ConfigHandle, ServiceConfig};
pub use endpoint::{InProcessClient, ServiceEndpoint};
pub use service::DataService;

pub use relmodel_core::{
    Cx, DeletedFlag, Entity, EntityMeta, Error, FieldMeta, Outcome, Record, Result, Value,
};
pub use relmodel_query::{
    AggregationKind, AggregationParam, AggregationType, Criteria, GroupedInFilter, Operator,
    QueryParam, ResponseResult,
};
pub use relmodel_relation::{
    Assembler, ConstDict, EntityDeclaration, FixedPolicy, LinkInfo, LocalService, LocalStore,
    PredicateMap, RelationInfo, RelationKind, RelationParam, RemoteClient, RemoteErrorPolicy,
    SchemaRegistry, ServiceRegistry, SlaveSource,
};
pub use relmodel_sqlite::SqliteStore;

/// Everything needed to declare, wire and query entities.
pub mod prelude {
    pub use crate::{
        Assembler, ConfigHandle, ConstDict, Criteria, Cx, DataService, Entity, EntityDeclaration,
        EntityMeta, Error, InProcessClient, LinkInfo, LocalService, LocalStore, Operator, Outcome,
        PredicateMap, Record, RelationInfo, RelationParam, RemoteClient, SchemaRegistry,
        ServiceConfig, ServiceEndpoint, ServiceRegistry, SlaveSource, SqliteStore, Value,
    };
    pub use std::sync::Arc;
}
