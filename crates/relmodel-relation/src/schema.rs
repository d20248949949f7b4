//! Compiled relation schema.
//!
//! Compilation turns an `EntityDeclaration` into typed relation records with
//! every handle resolved and every field checked. Any inconsistency is a
//! schema error raised at startup, never during assembly.

use crate::info::{EntityDeclaration, RelationInfo, RelationKind, SlaveSource};
use crate::services::ServiceRegistry;
use crate::source::{ConstDict, LocalService};
use crate::store::RemoteClient;
use relmodel_core::{EntityMeta, Error, Result, SchemaError, SchemaErrorKind};
use relmodel_query::AggregationType;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

/// Resolved slave source.
#[derive(Clone)]
pub enum SlaveHandle {
    Local(Arc<LocalService>),
    Remote {
        name: String,
        client: Arc<dyn RemoteClient>,
    },
    Const(Arc<ConstDict>),
}

impl std::fmt::Debug for SlaveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlaveHandle::Local(service) => f.debug_tuple("Local").field(&service.name()).finish(),
            SlaveHandle::Remote { name, .. } => f.debug_tuple("Remote").field(name).finish(),
            SlaveHandle::Const(dict) => f.debug_tuple("Const").field(&dict.name()).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledAggregation {
    pub aggregation_type: AggregationType,
    pub field: String,
    /// The aggregated field lives on the join table rather than the slave.
    pub on_relation: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledLink {
    pub service: Arc<LocalService>,
    pub master_id_field: String,
    pub slave_id_field: String,
}

/// One relation field, ready for assembly.
#[derive(Debug, Clone)]
pub struct CompiledRelation {
    pub field: String,
    pub kind: RelationKind,
    pub master_id_field: String,
    pub slave: SlaveHandle,
    pub slave_model: String,
    /// Slave metadata; may be absent for remote slaves whose model is not registered locally.
    pub slave_meta: Option<Arc<EntityMeta>>,
    pub slave_id_field: String,
    pub slave_name_field: Option<String>,
    pub equal_one_to_one_field: Option<String>,
    pub load_slave_dict: bool,
    pub aggregation: Option<CompiledAggregation>,
    pub link: Option<CompiledLink>,
}

impl CompiledRelation {
    pub fn local_service(&self) -> Option<&Arc<LocalService>> {
        match &self.slave {
            SlaveHandle::Local(service) => Some(service),
            _ => None,
        }
    }

    pub fn remote_client(&self) -> Option<(&str, &Arc<dyn RemoteClient>)> {
        match &self.slave {
            SlaveHandle::Remote { name, client } => Some((name, client)),
            _ => None,
        }
    }

    pub fn const_dict(&self) -> Option<&Arc<ConstDict>> {
        match &self.slave {
            SlaveHandle::Const(dict) => Some(dict),
            _ => None,
        }
    }
}

/// Relations whose slave lives in the local process.
#[derive(Debug, Clone, Default)]
pub struct LocalRelations {
    pub one_to_one: Vec<CompiledRelation>,
    pub dict: Vec<CompiledRelation>,
    pub const_dict: Vec<CompiledRelation>,
    pub one_to_many_aggregation: Vec<CompiledRelation>,
    pub many_to_many_aggregation: Vec<CompiledRelation>,
    pub many_to_many: Vec<CompiledRelation>,
}

impl LocalRelations {
    pub const fn empty() -> Self {
        Self {
            one_to_one: Vec::new(),
            dict: Vec::new(),
            const_dict: Vec::new(),
            one_to_many_aggregation: Vec::new(),
            many_to_many_aggregation: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.one_to_one.len()
            + self.dict.len()
            + self.const_dict.len()
            + self.one_to_many_aggregation.len()
            + self.many_to_many_aggregation.len()
            + self.many_to_many.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Relations whose slave is reached through a remote client.
#[derive(Debug, Clone, Default)]
pub struct RemoteRelations {
    pub one_to_one: Vec<CompiledRelation>,
    pub dict: Vec<CompiledRelation>,
    pub one_to_many_aggregation: Vec<CompiledRelation>,
    pub many_to_many_aggregation: Vec<CompiledRelation>,
}

impl RemoteRelations {
    pub const fn empty() -> Self {
        Self {
            one_to_one: Vec::new(),
            dict: Vec::new(),
            one_to_many_aggregation: Vec::new(),
            many_to_many_aggregation: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.one_to_one.len()
            + self.dict.len()
            + self.one_to_many_aggregation.len()
            + self.many_to_many_aggregation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static EMPTY_LOCAL: LocalRelations = LocalRelations::empty();
static EMPTY_REMOTE: RemoteRelations = RemoteRelations::empty();

/// The compiled relation lists of one entity type.
///
/// Each half is written exactly once by its load pass and read-only afterwards.
#[derive(Debug)]
pub struct RelationSchema {
    declaration: EntityDeclaration,
    local: OnceLock<LocalRelations>,
    remote: OnceLock<RemoteRelations>,
}

impl RelationSchema {
    pub fn new(declaration: EntityDeclaration) -> Self {
        Self {
            declaration,
            local: OnceLock::new(),
            remote: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.declaration.meta
    }

    pub fn declaration(&self) -> &EntityDeclaration {
        &self.declaration
    }

    /// Local relation lists; empty until the local pass has run.
    pub fn local(&self) -> &LocalRelations {
        self.local.get().unwrap_or(&EMPTY_LOCAL)
    }

    /// Remote relation lists; empty until the remote pass has run.
    pub fn remote(&self) -> &RemoteRelations {
        self.remote.get().unwrap_or(&EMPTY_REMOTE)
    }

    pub fn is_local_loaded(&self) -> bool {
        self.local.get().is_some()
    }

    pub fn is_remote_loaded(&self) -> bool {
        self.remote.get().is_some()
    }

    /// Install the local lists. Returns false if they were already installed.
    pub(crate) fn install_local(&self, relations: LocalRelations) -> bool {
        self.local.set(relations).is_ok()
    }

    pub(crate) fn install_remote(&self, relations: RemoteRelations) -> bool {
        self.remote.set(relations).is_ok()
    }
}

fn schema_error(entity: &str, kind: SchemaErrorKind, message: String) -> Error {
    SchemaError {
        kind,
        entity: Some(entity.to_string()),
        message,
    }
    .into()
}

fn require_field(entity: &str, meta: &EntityMeta, field: &str, role: &str) -> Result<()> {
    if meta.has_field(field) {
        Ok(())
    } else {
        Err(schema_error(
            entity,
            SchemaErrorKind::UnknownField,
            format!("{} '{}' does not exist on model '{}'", role, field, meta.name),
        ))
    }
}

/// The relation field must be declared on the master, apart from its columns.
fn require_relation_field(entity: &str, meta: &EntityMeta, field: &str) -> Result<()> {
    if meta.has_relation_field(field) {
        Ok(())
    } else if meta.has_field(field) {
        Err(schema_error(
            entity,
            SchemaErrorKind::Invalid,
            format!("relation field '{}' is a column of model '{}'", field, meta.name),
        ))
    } else {
        Err(schema_error(
            entity,
            SchemaErrorKind::UnknownField,
            format!("relation field '{}' does not exist on model '{}'", field, meta.name),
        ))
    }
}

fn require_service(services: &ServiceRegistry, entity: &str, model: &str) -> Result<Arc<LocalService>> {
    services.local_service(model).ok_or_else(|| {
        schema_error(
            entity,
            SchemaErrorKind::UnresolvedHandle,
            format!("no local service registered for model '{}'", model),
        )
    })
}

fn check_unique_fields(declaration: &EntityDeclaration) -> Result<()> {
    let mut seen = HashSet::new();
    for info in &declaration.relations {
        if !seen.insert(info.field) {
            return Err(schema_error(
                declaration.name(),
                SchemaErrorKind::Invalid,
                format!("relation field '{}' is declared twice", info.field),
            ));
        }
    }
    Ok(())
}

fn check_equal_one_to_one(declaration: &EntityDeclaration, info: &RelationInfo) -> Result<()> {
    let Some(target) = info.equal_one_to_one_field else {
        return Ok(());
    };
    let ok = declaration.relations.iter().any(|other| {
        other.field == target
            && other.kind == RelationKind::OneToOne
            && other.is_remote() == info.is_remote()
            && other.slave_model == info.slave_model
    });
    if ok {
        Ok(())
    } else {
        Err(schema_error(
            declaration.name(),
            SchemaErrorKind::Invalid,
            format!(
                "dictionary '{}' names '{}' as its one-to-one field, which is not a {} one-to-one relation to '{}'",
                info.field,
                target,
                if info.is_remote() { "remote" } else { "local" },
                info.slave_model
            ),
        ))
    }
}

fn compile_aggregation(
    entity: &str,
    info: &RelationInfo,
    aggregation_meta: Option<&EntityMeta>,
    on_relation: bool,
) -> Result<CompiledAggregation> {
    let code = info.aggregation_type.ok_or_else(|| {
        schema_error(
            entity,
            SchemaErrorKind::InvalidAggregation,
            format!("relation '{}' declares no aggregation type", info.field),
        )
    })?;
    let aggregation_type = AggregationType::from_code(code).map_err(|e| match e {
        Error::Schema(s) => Error::Schema(s.with_entity(entity)),
        other => other,
    })?;
    let field = info.aggregation_field.ok_or_else(|| {
        schema_error(
            entity,
            SchemaErrorKind::UnknownField,
            format!("relation '{}' declares no aggregation field", info.field),
        )
    })?;
    if let Some(meta) = aggregation_meta {
        require_field(entity, meta, field, "aggregation field")?;
    }
    Ok(CompiledAggregation {
        aggregation_type,
        field: field.to_string(),
        on_relation,
    })
}

fn compile_link(
    services: &ServiceRegistry,
    entity: &str,
    info: &RelationInfo,
) -> Result<CompiledLink> {
    let link = info.link.ok_or_else(|| {
        schema_error(
            entity,
            SchemaErrorKind::Invalid,
            format!("many-to-many relation '{}' declares no join table", info.field),
        )
    })?;
    let service = require_service(services, entity, link.relation_model)?;
    require_field(entity, service.meta(), link.relation_master_id_field, "join master id field")?;
    require_field(entity, service.meta(), link.relation_slave_id_field, "join slave id field")?;
    Ok(CompiledLink {
        service,
        master_id_field: link.relation_master_id_field.to_string(),
        slave_id_field: link.relation_slave_id_field.to_string(),
    })
}

/// Which side of a many-to-many holds the aggregated field.
fn aggregation_on_relation(entity: &str, info: &RelationInfo) -> Result<bool> {
    let relation_model = info.link.map(|l| l.relation_model).unwrap_or_default();
    match info.aggregation_model {
        Some(model) if model == relation_model => Ok(true),
        Some(model) if model == info.slave_model => Ok(false),
        other => Err(schema_error(
            entity,
            SchemaErrorKind::Invalid,
            format!(
                "aggregation model {:?} of '{}' is neither the join model '{}' nor the slave model '{}'",
                other, info.field, relation_model, info.slave_model
            ),
        )),
    }
}

fn compiled(
    info: &RelationInfo,
    slave: SlaveHandle,
    slave_meta: Option<Arc<EntityMeta>>,
) -> CompiledRelation {
    CompiledRelation {
        field: info.field.to_string(),
        kind: info.kind,
        master_id_field: info.master_id_field.to_string(),
        slave,
        slave_model: info.slave_model.to_string(),
        slave_meta,
        slave_id_field: info.slave_id_field.to_string(),
        slave_name_field: info.slave_name_field.map(str::to_string),
        equal_one_to_one_field: info.equal_one_to_one_field.map(str::to_string),
        load_slave_dict: info.load_slave_dict,
        aggregation: None,
        link: None,
    }
}

/// Compile the relations of `declaration` whose slave is local or a constant dictionary.
pub fn compile_local(declaration: &EntityDeclaration, services: &ServiceRegistry) -> Result<LocalRelations> {
    check_unique_fields(declaration)?;
    let entity = declaration.name();
    let mut out = LocalRelations::default();

    for info in declaration.relations.iter().filter(|i| !i.is_remote()) {
        require_relation_field(entity, &declaration.meta, info.field)?;
        require_field(entity, &declaration.meta, info.master_id_field, "master id field")?;

        match (info.kind, info.source) {
            (RelationKind::ConstDict, SlaveSource::Const(name)) => {
                let dict = services.const_dict(name).ok_or_else(|| {
                    schema_error(
                        entity,
                        SchemaErrorKind::UnresolvedHandle,
                        format!("no constant dictionary registered as '{}'", name),
                    )
                })?;
                out.const_dict.push(compiled(info, SlaveHandle::Const(dict), None));
            }
            (RelationKind::ConstDict, _) | (_, SlaveSource::Const(_)) => {
                return Err(schema_error(
                    entity,
                    SchemaErrorKind::Invalid,
                    format!(
                        "relation '{}' mixes a constant dictionary source with kind {}",
                        info.field,
                        info.kind.as_str()
                    ),
                ));
            }
            (RelationKind::OneToOne | RelationKind::Dict, _) => {
                let service = require_service(services, entity, info.slave_model)?;
                let meta = Arc::clone(service.meta());
                require_field(entity, &meta, info.slave_id_field, "slave id field")?;
                if let Some(name_field) = info.slave_name_field {
                    require_field(entity, &meta, name_field, "slave name field")?;
                }
                check_equal_one_to_one(declaration, info)?;
                let rel = compiled(info, SlaveHandle::Local(service), Some(meta));
                if info.kind == RelationKind::OneToOne {
                    out.one_to_one.push(rel);
                } else {
                    out.dict.push(rel);
                }
            }
            (RelationKind::OneToManyAggregation, _) => {
                let service = require_service(services, entity, info.slave_model)?;
                let meta = Arc::clone(service.meta());
                require_field(entity, &meta, info.slave_id_field, "slave id field")?;
                let aggregation = compile_aggregation(entity, info, Some(&meta), false)?;
                let mut rel = compiled(info, SlaveHandle::Local(service), Some(meta));
                rel.aggregation = Some(aggregation);
                out.one_to_many_aggregation.push(rel);
            }
            (RelationKind::ManyToManyAggregation, _) => {
                let link = compile_link(services, entity, info)?;
                let service = require_service(services, entity, info.slave_model)?;
                let meta = Arc::clone(service.meta());
                require_field(entity, &meta, info.slave_id_field, "slave id field")?;
                let on_relation = aggregation_on_relation(entity, info)?;
                let aggregation_meta = if on_relation {
                    Arc::clone(link.service.meta())
                } else {
                    Arc::clone(&meta)
                };
                let aggregation = compile_aggregation(entity, info, Some(&aggregation_meta), on_relation)?;
                let mut rel = compiled(info, SlaveHandle::Local(service), Some(meta));
                rel.aggregation = Some(aggregation);
                rel.link = Some(link);
                out.many_to_many_aggregation.push(rel);
            }
            (RelationKind::ManyToMany, _) => {
                let link = compile_link(services, entity, info)?;
                let meta = Arc::clone(link.service.meta());
                let mut rel = compiled(info, SlaveHandle::Local(Arc::clone(&link.service)), Some(meta));
                rel.link = Some(link);
                out.many_to_many.push(rel);
            }
        }
    }

    Ok(out)
}

/// Compile the relations of `declaration` whose slave is behind a remote client.
pub fn compile_remote(declaration: &EntityDeclaration, services: &ServiceRegistry) -> Result<RemoteRelations> {
    check_unique_fields(declaration)?;
    let entity = declaration.name();
    let mut out = RemoteRelations::default();

    for info in &declaration.relations {
        let SlaveSource::Remote(client_name) = info.source else {
            continue;
        };
        require_relation_field(entity, &declaration.meta, info.field)?;
        require_field(entity, &declaration.meta, info.master_id_field, "master id field")?;
        let client = services.remote_client(client_name).ok_or_else(|| {
            schema_error(
                entity,
                SchemaErrorKind::UnresolvedHandle,
                format!("no remote client registered as '{}'", client_name),
            )
        })?;
        let slave_meta = services.model(info.slave_model);
        if let Some(meta) = &slave_meta {
            require_field(entity, meta, info.slave_id_field, "slave id field")?;
            if let Some(name_field) = info.slave_name_field {
                require_field(entity, meta, name_field, "slave name field")?;
            }
        }
        let handle = SlaveHandle::Remote {
            name: client_name.to_string(),
            client,
        };

        match info.kind {
            RelationKind::OneToOne => {
                out.one_to_one.push(compiled(info, handle, slave_meta));
            }
            RelationKind::Dict => {
                check_equal_one_to_one(declaration, info)?;
                out.dict.push(compiled(info, handle, slave_meta));
            }
            RelationKind::OneToManyAggregation => {
                let aggregation = compile_aggregation(entity, info, slave_meta.as_deref(), false)?;
                let mut rel = compiled(info, handle, slave_meta);
                rel.aggregation = Some(aggregation);
                out.one_to_many_aggregation.push(rel);
            }
            RelationKind::ManyToManyAggregation => {
                let link = compile_link(services, entity, info)?;
                let on_relation = aggregation_on_relation(entity, info)?;
                let aggregation = if on_relation {
                    compile_aggregation(entity, info, Some(link.service.meta()), true)?
                } else {
                    compile_aggregation(entity, info, slave_meta.as_deref(), false)?
                };
                let mut rel = compiled(info, handle, slave_meta);
                rel.aggregation = Some(aggregation);
                rel.link = Some(link);
                out.many_to_many_aggregation.push(rel);
            }
            RelationKind::ConstDict | RelationKind::ManyToMany => {
                return Err(schema_error(
                    entity,
                    SchemaErrorKind::Invalid,
                    format!(
                        "relation '{}' of kind {} cannot use a remote source",
                        info.field,
                        info.kind.as_str()
                    ),
                ));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::LinkInfo;
    use crate::store::{BoxOutcome, LocalStore};
    use asupersync::{Cx, Outcome};
    use relmodel_core::Record;
    use relmodel_query::{AggregationParam, QueryParam, ResponseResult, SelectStatement};

    struct NullStore;

    impl LocalStore for NullStore {
        fn select<'a>(&'a self, _cx: &'a Cx, _statement: &'a SelectStatement) -> BoxOutcome<'a, Vec<Record>> {
            Box::pin(async { Outcome::Ok(Vec::new()) })
        }
    }

    struct NullClient;

    impl RemoteClient for NullClient {
        fn list_by<'a>(&'a self, _cx: &'a Cx, _param: QueryParam) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
            Box::pin(async { Outcome::Ok(ResponseResult::ok(Vec::new())) })
        }

        fn get_by<'a>(&'a self, _cx: &'a Cx, _param: QueryParam) -> BoxOutcome<'a, ResponseResult<Option<Record>>> {
            Box::pin(async { Outcome::Ok(ResponseResult::ok(None)) })
        }

        fn list_map_by<'a>(&'a self, _cx: &'a Cx, _param: QueryParam) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
            Box::pin(async { Outcome::Ok(ResponseResult::ok(Vec::new())) })
        }

        fn aggregate_by<'a>(
            &'a self,
            _cx: &'a Cx,
            _param: AggregationParam,
        ) -> BoxOutcome<'a, ResponseResult<Vec<Record>>> {
            Box::pin(async { Outcome::Ok(ResponseResult::ok(Vec::new())) })
        }
    }

    const LINK: LinkInfo = LinkInfo::new("ClubMember", "memberId", "clubId");

    fn services() -> ServiceRegistry {
        let services = ServiceRegistry::new();
        let store: Arc<dyn LocalStore> = Arc::new(NullStore);
        for meta in [
            EntityMeta::new("Club", "zz_club", "clubId")
                .field("clubName", "club_name")
                .field("fee", "fee"),
            EntityMeta::new("ClubMember", "zz_club_member", "id")
                .field("memberId", "member_id")
                .field("clubId", "club_id")
                .field("paid", "paid"),
        ] {
            services.register_local(Arc::new(LocalService::new(Arc::new(meta), Arc::clone(&store))));
        }
        services
    }

    fn member(relations: &[RelationInfo]) -> EntityDeclaration {
        EntityDeclaration::new(
            EntityMeta::new("Member", "zz_member", "memberId")
                .field("clubId", "club_id")
                .field("mentorId", "mentor_id")
                .relation_fields(relations.iter().map(|r| r.field)),
        )
        .relations(relations)
    }

    fn kind(err: &Error) -> Option<SchemaErrorKind> {
        match err {
            Error::Schema(s) => Some(s.kind),
            _ => None,
        }
    }

    #[test]
    fn many_to_many_aggregate_records_its_side() {
        let declaration = member(&[
            RelationInfo::many_to_many_aggregation(
                "totalPaid",
                "memberId",
                SlaveSource::Local,
                "Club",
                "clubId",
                LINK,
                "ClubMember",
                0,
                "paid",
            ),
            RelationInfo::many_to_many_aggregation(
                "maxFee",
                "memberId",
                SlaveSource::Local,
                "Club",
                "clubId",
                LINK,
                "Club",
                4,
                "fee",
            ),
            RelationInfo::many_to_many("memberships", "memberId", LINK),
        ]);
        let local = compile_local(&declaration, &services()).unwrap();
        assert_eq!(local.len(), 3);

        let paid = &local.many_to_many_aggregation[0];
        let aggregation = paid.aggregation.as_ref().unwrap();
        assert!(aggregation.on_relation);
        assert_eq!(aggregation.aggregation_type, AggregationType::Sum);
        let link = paid.link.as_ref().unwrap();
        assert_eq!(link.service.name(), "ClubMember");
        assert_eq!(link.master_id_field, "memberId");

        let fee = local.many_to_many_aggregation[1].aggregation.as_ref().unwrap();
        assert!(!fee.on_relation);
        assert_eq!(fee.aggregation_type, AggregationType::Max);

        assert_eq!(local.many_to_many[0].local_service().unwrap().name(), "ClubMember");
    }

    #[test]
    fn aggregation_field_must_live_on_its_side() {
        let declaration = member(&[RelationInfo::many_to_many_aggregation(
            "totalFee", "memberId", SlaveSource::Local, "Club", "clubId", LINK, "ClubMember", 0, "fee",
        )]);
        let err = compile_local(&declaration, &services()).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::UnknownField));

        let declaration = member(&[RelationInfo::many_to_many_aggregation(
            "totalFee", "memberId", SlaveSource::Local, "Club", "clubId", LINK, "Member", 0, "fee",
        )]);
        let err = compile_local(&declaration, &services()).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::Invalid));
    }

    #[test]
    fn dictionary_reuse_target_must_match() {
        let declaration = member(&[
            RelationInfo::one_to_one("mentor", "mentorId", SlaveSource::Local, "ClubMember", "id"),
            RelationInfo::dict("clubDict", "clubId", SlaveSource::Local, "Club", "clubId", "clubName")
                .equal_one_to_one("mentor"),
        ]);
        let err = compile_local(&declaration, &services()).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::Invalid));
        assert!(err.to_string().contains("clubDict"), "{err}");
    }

    #[test]
    fn passes_split_by_source() {
        let services = services();
        let declaration = member(&[
            RelationInfo::one_to_one("club", "clubId", SlaveSource::Local, "Club", "clubId"),
            RelationInfo::one_to_one(
                "mentor",
                "mentorId",
                SlaveSource::Remote("mentor-client"),
                "Mentor",
                "mentorId",
            ),
        ]);

        let err = compile_remote(&declaration, &services).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::UnresolvedHandle));

        services.register_remote("mentor-client", Arc::new(NullClient));
        let local = compile_local(&declaration, &services).unwrap();
        let remote = compile_remote(&declaration, &services).unwrap();
        assert_eq!(local.one_to_one.len(), 1);
        assert_eq!(remote.one_to_one.len(), 1);
        let mentor = &remote.one_to_one[0];
        assert!(mentor.slave_meta.is_none());
        assert_eq!(mentor.remote_client().map(|(name, _)| name), Some("mentor-client"));

        // A registered model is checked even when it lives remotely.
        services.register_model(Arc::new(EntityMeta::new("Mentor", "zz_mentor", "id")));
        let err = compile_remote(&declaration, &services).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::UnknownField));
    }

    #[test]
    fn relation_field_must_be_declared_on_the_master() {
        let services = services();
        services.register_remote("mentor-client", Arc::new(NullClient));
        let club = RelationInfo::one_to_one("club", "clubId", SlaveSource::Local, "Club", "clubId");
        let mentor = RelationInfo::one_to_one(
            "mentor",
            "mentorId",
            SlaveSource::Remote("mentor-client"),
            "Mentor",
            "mentorId",
        );
        let meta = EntityMeta::new("Member", "zz_member", "memberId")
            .field("clubId", "club_id")
            .field("mentorId", "mentor_id");

        // Misspelled relation field on the master.
        let declaration = EntityDeclaration::new(meta.clone().relation_fields(["clubb", "mentor"]))
            .relations(&[club, mentor]);
        let err = compile_local(&declaration, &services).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::UnknownField));
        assert!(err.to_string().contains("'club'"), "{err}");

        let declaration = EntityDeclaration::new(meta.clone().relation_fields(["club"]))
            .relations(&[club, mentor]);
        assert!(compile_local(&declaration, &services).is_ok());
        let err = compile_remote(&declaration, &services).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::UnknownField));
        assert!(err.to_string().contains("'mentor'"), "{err}");

        // A relation may not overwrite a mapped column.
        let shadowing = RelationInfo::one_to_one("clubId", "clubId", SlaveSource::Local, "Club", "clubId");
        let declaration = EntityDeclaration::new(meta).relations(&[shadowing]);
        let err = compile_local(&declaration, &services).unwrap_err();
        assert_eq!(kind(&err), Some(SchemaErrorKind::Invalid));
    }
}
