//! The relation assembly engine.
//!
//! Walks an entity type's compiled schema in a fixed order and fills relation
//! fields of one entity or a batch:
//!
//! 1. local one-to-one
//! 2. constant dictionaries, then local dictionaries
//! 3. remote one-to-one, then remote dictionaries
//! 4. local one-to-many aggregates, then local many-to-many aggregates
//! 5. remote one-to-many aggregates, then remote many-to-many aggregates
//! 6. many-to-many pass-through (single entity only)
//!
//! Every relation of a batch costs one fetch over the distinct non-null
//! master ids, whatever the batch size. Relations resolve sequentially and a
//! relation's results are merged only after its fetch fully succeeded.

use crate::planner::{one_to_many_conditions, plan_local_many_to_many};
use crate::policy::RemoteErrorPolicy;
use crate::registry::SchemaRegistry;
use crate::remote::{call_remote, distinct, id_criteria, remote_many_to_many};
use crate::request::{PredicateMap, RelationParam};
use crate::schema::{CompiledRelation, RelationSchema};
use asupersync::{Cx, Outcome};
use relmodel_core::{Entity, Error, Record, Result, SchemaErrorKind, Value, ValueKey};
use relmodel_query::{AggregationKind, AggregationParam, KEY, QueryParam, VALUE};
use std::collections::HashMap;
use std::sync::Arc;

/// Enriches entities with related data according to their relation schema.
#[derive(Clone)]
pub struct Assembler {
    schemas: Arc<SchemaRegistry>,
    policy: Arc<dyn RemoteErrorPolicy>,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("schemas", &self.schemas)
            .finish_non_exhaustive()
    }
}

/// Distinct non-null values of `field` across `entities`.
fn master_ids<E: Entity>(entities: &[E], field: &str) -> Vec<Value> {
    distinct(entities.iter().map(|e| e.get_field(field)))
}

/// Index slave records by one of their fields.
fn index_by(records: Vec<Record>, field: &str) -> HashMap<ValueKey, Record> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(key) = record.get_or_null(field).key() {
            index.entry(key).or_insert(record);
        }
    }
    index
}

/// `{id, name}` of a dictionary relation, taken from its slave record.
fn dict_value(rel: &CompiledRelation, slave: &Record) -> Value {
    let name_field = rel.slave_name_field.as_deref().unwrap_or_default();
    Record::new()
        .with("id", slave.get_or_null(&rel.slave_id_field))
        .with("name", slave.get_or_null(name_field))
        .into()
}

/// Set `rel.field` on every entity whose master id has an entry in `index`.
fn merge_records<E: Entity>(
    entities: &mut [E],
    rel: &CompiledRelation,
    index: &HashMap<ValueKey, Record>,
    make: impl Fn(&Record) -> Value,
) -> Result<()> {
    for entity in entities.iter_mut() {
        let Some(key) = entity.get_field(&rel.master_id_field).key() else {
            continue;
        };
        if let Some(slave) = index.get(&key) {
            entity.set_field(&rel.field, make(slave))?;
        }
    }
    Ok(())
}

/// Merge `KEY`/`VALUE` rows; masters without a row, or with a NULL value, stay untouched.
fn merge_aggregation<E: Entity>(entities: &mut [E], rel: &CompiledRelation, rows: Vec<Record>) -> Result<()> {
    let mut values: HashMap<ValueKey, Value> = HashMap::with_capacity(rows.len());
    for mut row in rows {
        let (Some(key), Some(value)) = (row.get_or_null(KEY).key(), row.remove(VALUE)) else {
            continue;
        };
        if !value.is_null() {
            values.insert(key, value);
        }
    }
    for entity in entities.iter_mut() {
        let Some(key) = entity.get_field(&rel.master_id_field).key() else {
            continue;
        };
        if let Some(value) = values.get(&key) {
            entity.set_field(&rel.field, value.clone())?;
        }
    }
    Ok(())
}

impl Assembler {
    pub fn new(schemas: Arc<SchemaRegistry>, policy: Arc<dyn RemoteErrorPolicy>) -> Self {
        Self { schemas, policy }
    }

    /// The same compiled schemas, with remote failures judged by `policy`.
    ///
    /// Services sharing one registry bind their own policy through this.
    #[must_use]
    pub fn with_policy(&self, policy: Arc<dyn RemoteErrorPolicy>) -> Self {
        Self {
            schemas: Arc::clone(&self.schemas),
            policy,
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn policy(&self) -> &Arc<dyn RemoteErrorPolicy> {
        &self.policy
    }

    fn schema(&self, entity: &str) -> Result<Arc<RelationSchema>> {
        self.schemas.schema_for(entity).ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::UnresolvedHandle,
                format!("no relation schema declared for entity '{}'", entity),
            )
        })
    }

    /// Enrich a single entity. Uses point fetches and equality filters, and
    /// additionally resolves many-to-many pass-through relations.
    #[tracing::instrument(level = "debug", skip(self, cx, entity, request, predicates))]
    pub async fn assemble_one<E: Entity>(
        &self,
        cx: &Cx,
        entity_name: &str,
        entity: &mut E,
        request: &RelationParam,
        predicates: &PredicateMap,
    ) -> Outcome<(), Error> {
        let schema = try_result!(self.schema(entity_name));
        self.assemble(cx, &schema, std::slice::from_mut(entity), true, request, predicates)
            .await
    }

    /// Enrich a batch. Every relation costs one fetch over the distinct master ids.
    #[tracing::instrument(level = "debug", skip(self, cx, entities, request, predicates))]
    pub async fn assemble_list<E: Entity>(
        &self,
        cx: &Cx,
        entity_name: &str,
        entities: &mut [E],
        request: &RelationParam,
        predicates: &PredicateMap,
    ) -> Outcome<(), Error> {
        if entities.is_empty() {
            return Outcome::Ok(());
        }
        let schema = try_result!(self.schema(entity_name));
        self.assemble(cx, &schema, entities, false, request, predicates)
            .await
    }

    async fn assemble<E: Entity>(
        &self,
        cx: &Cx,
        schema: &RelationSchema,
        entities: &mut [E],
        single: bool,
        request: &RelationParam,
        predicates: &PredicateMap,
    ) -> Outcome<(), Error> {
        let local = schema.local();
        let remote = schema.remote();
        tracing::info!(
            entity = %schema.name(),
            count = entities.len(),
            single,
            "Assembling relations"
        );

        let one_to_one = request.one_to_one();
        if one_to_one {
            for rel in &local.one_to_one {
                try_outcome!(
                    self.local_one_to_one(cx, rel, entities, single, request.build_one_to_one_with_dict)
                        .await
                );
            }
        }

        if request.build_dict {
            for rel in &local.const_dict {
                try_result!(Self::const_dict(rel, entities));
            }
            for rel in &local.dict {
                try_outcome!(self.local_dict(cx, rel, entities, single, one_to_one).await);
            }
        }

        let remote_one_to_one = request.remote_one_to_one();
        if remote_one_to_one {
            for rel in &remote.one_to_one {
                try_outcome!(
                    self.remote_one_to_one(
                        cx,
                        rel,
                        entities,
                        single,
                        request.build_remote_one_to_one_with_dict,
                    )
                    .await
                );
            }
        }
        if request.build_remote_dict {
            for rel in &remote.dict {
                try_outcome!(self.remote_dict(cx, rel, entities, single, remote_one_to_one).await);
            }
        }

        if request.build_aggregation {
            for rel in &local.one_to_many_aggregation {
                try_outcome!(
                    self.local_one_to_many(cx, rel, entities, single, predicates.get(&rel.field))
                        .await
                );
            }
            for rel in &local.many_to_many_aggregation {
                try_outcome!(
                    self.local_many_to_many(cx, rel, entities, single, predicates.get(&rel.field))
                        .await
                );
            }
        }

        if request.build_remote_aggregation {
            for rel in &remote.one_to_many_aggregation {
                try_outcome!(
                    self.remote_one_to_many(cx, rel, entities, single, predicates.get(&rel.field))
                        .await
                );
            }
            for rel in &remote.many_to_many_aggregation {
                let ids = master_ids(entities, &rel.master_id_field);
                if ids.is_empty() {
                    continue;
                }
                let rows = try_outcome!(
                    remote_many_to_many(
                        cx,
                        self.policy.as_ref(),
                        rel,
                        ids,
                        single,
                        predicates.get(&rel.field),
                    )
                    .await
                );
                if let Some(rows) = rows {
                    try_result!(merge_aggregation(entities, rel, rows));
                }
            }
        }

        if request.build_many_to_many && single {
            for rel in &local.many_to_many {
                try_outcome!(self.many_to_many(cx, rel, entities).await);
            }
        }

        Outcome::Ok(())
    }

    /// Fetch local slave rows by `slave_id_field`: a point fetch for a single
    /// entity, one in-list fetch for a batch.
    async fn fetch_local_slaves(
        cx: &Cx,
        rel: &CompiledRelation,
        mut ids: Vec<Value>,
        single: bool,
    ) -> Outcome<Vec<Record>, Error> {
        let Some(service) = rel.local_service() else {
            return Outcome::Ok(Vec::new());
        };
        if single && ids.len() == 1 {
            let id = ids.remove(0);
            let found = try_outcome!(service.get_one_by(cx, &rel.slave_id_field, &id).await);
            Outcome::Ok(found.into_iter().collect())
        } else {
            service.get_in_list(cx, &rel.slave_id_field, ids, None).await
        }
    }

    async fn local_one_to_one<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        with_dict: bool,
    ) -> Outcome<(), Error> {
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let mut slaves = try_outcome!(Self::fetch_local_slaves(cx, rel, ids, single).await);
        tracing::debug!(relation = %rel.field, fetched = slaves.len(), "Loaded one-to-one slaves");

        if with_dict && rel.load_slave_dict && !slaves.is_empty() {
            try_outcome!(self.slave_dicts(cx, &rel.slave_model, &mut slaves, single).await);
        }

        let index = index_by(slaves, &rel.slave_id_field);
        try_result!(merge_records(entities, rel, &index, |slave| slave.clone().into()));
        Outcome::Ok(())
    }

    /// Resolve a slave batch's own dictionaries: constant, local, then remote,
    /// without reusing one-to-one fields.
    async fn slave_dicts(
        &self,
        cx: &Cx,
        slave_model: &str,
        slaves: &mut [Record],
        single: bool,
    ) -> Outcome<(), Error> {
        let Some(schema) = self.schemas.schema_for(slave_model) else {
            return Outcome::Ok(());
        };
        tracing::debug!(slave = %slave_model, count = slaves.len(), "Resolving slave dictionaries");
        for rel in &schema.local().const_dict {
            try_result!(Self::const_dict(rel, slaves));
        }
        for rel in &schema.local().dict {
            try_outcome!(self.local_dict(cx, rel, slaves, single, false).await);
        }
        for rel in &schema.remote().dict {
            try_outcome!(self.remote_dict(cx, rel, slaves, single, false).await);
        }
        Outcome::Ok(())
    }

    fn const_dict<E: Entity>(rel: &CompiledRelation, entities: &mut [E]) -> Result<()> {
        let Some(dict) = rel.const_dict() else {
            return Ok(());
        };
        for entity in entities.iter_mut() {
            let id = entity.get_field(&rel.master_id_field);
            if let Some(value) = dict.dict_value(&id) {
                entity.set_field(&rel.field, value.into())?;
            }
        }
        Ok(())
    }

    /// Derive dictionaries from an already-built one-to-one field.
    fn dict_from_one_to_one<E: Entity>(rel: &CompiledRelation, source_field: &str, entities: &mut [E]) -> Result<()> {
        for entity in entities.iter_mut() {
            if let Value::Record(slave) = entity.get_field(source_field) {
                entity.set_field(&rel.field, dict_value(rel, &slave))?;
            }
        }
        Ok(())
    }

    async fn local_dict<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        one_to_one_built: bool,
    ) -> Outcome<(), Error> {
        if let (true, Some(source)) = (one_to_one_built, rel.equal_one_to_one_field.as_deref()) {
            tracing::debug!(relation = %rel.field, source = %source, "Reusing one-to-one for dictionary");
            try_result!(Self::dict_from_one_to_one(rel, source, entities));
            return Outcome::Ok(());
        }
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let slaves = try_outcome!(Self::fetch_local_slaves(cx, rel, ids, single).await);
        let index = index_by(slaves, &rel.slave_id_field);
        try_result!(merge_records(entities, rel, &index, |slave| dict_value(rel, slave)));
        Outcome::Ok(())
    }

    /// Fetch remote slave records: `get_by` with `=` for a single entity,
    /// `list_by` with `IN` for a batch. `None` when a failure was ignored.
    async fn fetch_remote_slaves(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        ids: Vec<Value>,
        single: bool,
        with_dict: bool,
    ) -> Outcome<Option<Vec<Record>>, Error> {
        let Some((name, client)) = rel.remote_client() else {
            return Outcome::Ok(None);
        };
        let single = single && ids.len() == 1;
        let param = QueryParam::new(vec![id_criteria(&rel.slave_id_field, ids, single)]).with_dict(with_dict);
        if single {
            let found = try_outcome!(
                call_remote(self.policy.as_ref(), &rel.field, name, "get_by", client.get_by(cx, param)).await
            );
            Outcome::Ok(found.map(|record| record.into_iter().collect()))
        } else {
            call_remote(self.policy.as_ref(), &rel.field, name, "list_by", client.list_by(cx, param)).await
        }
    }

    async fn remote_one_to_one<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        with_dict: bool,
    ) -> Outcome<(), Error> {
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let with_dict = with_dict && rel.load_slave_dict;
        let Some(slaves) = try_outcome!(self.fetch_remote_slaves(cx, rel, ids, single, with_dict).await) else {
            return Outcome::Ok(());
        };
        let index = index_by(slaves, &rel.slave_id_field);
        try_result!(merge_records(entities, rel, &index, |slave| slave.clone().into()));
        Outcome::Ok(())
    }

    async fn remote_dict<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        one_to_one_built: bool,
    ) -> Outcome<(), Error> {
        if let (true, Some(source)) = (one_to_one_built, rel.equal_one_to_one_field.as_deref()) {
            tracing::debug!(relation = %rel.field, source = %source, "Reusing remote one-to-one for dictionary");
            try_result!(Self::dict_from_one_to_one(rel, source, entities));
            return Outcome::Ok(());
        }
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let Some(slaves) = try_outcome!(self.fetch_remote_slaves(cx, rel, ids, single, false).await) else {
            return Outcome::Ok(());
        };
        let index = index_by(slaves, &rel.slave_id_field);
        try_result!(merge_records(entities, rel, &index, |slave| dict_value(rel, slave)));
        Outcome::Ok(())
    }

    async fn local_one_to_many<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        predicates: &[relmodel_query::Criteria],
    ) -> Outcome<(), Error> {
        let (Some(service), Some(aggregation)) = (rel.local_service(), rel.aggregation.as_ref()) else {
            return Outcome::Ok(());
        };
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let conditions = try_result!(one_to_many_conditions(service, rel, ids, single, predicates));
        let rows = try_outcome!(
            service
                .aggregate(
                    cx,
                    conditions,
                    &rel.slave_id_field,
                    aggregation.aggregation_type,
                    &aggregation.field,
                )
                .await
        );
        tracing::debug!(relation = %rel.field, groups = rows.len(), "Aggregated one-to-many");
        try_result!(merge_aggregation(entities, rel, rows));
        Outcome::Ok(())
    }

    async fn local_many_to_many<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        predicates: &[relmodel_query::Criteria],
    ) -> Outcome<(), Error> {
        let Some(link) = rel.link.as_ref() else {
            return Outcome::Ok(());
        };
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let plan = try_result!(plan_local_many_to_many(rel, ids, single, predicates));
        let rows = try_outcome!(link.service.fetch(cx, &plan.statement).await);
        tracing::debug!(relation = %rel.field, groups = rows.len(), "Aggregated many-to-many");
        try_result!(merge_aggregation(entities, rel, rows));
        Outcome::Ok(())
    }

    async fn remote_one_to_many<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
        single: bool,
        predicates: &[relmodel_query::Criteria],
    ) -> Outcome<(), Error> {
        let (Some((name, client)), Some(aggregation)) = (rel.remote_client(), rel.aggregation.as_ref()) else {
            return Outcome::Ok(());
        };
        let ids = master_ids(entities, &rel.master_id_field);
        if ids.is_empty() {
            return Outcome::Ok(());
        }
        let mut criteria = predicates.to_vec();
        criteria.push(id_criteria(&rel.slave_id_field, ids, single));
        let param = AggregationParam {
            kind: AggregationKind::OneToMany,
            aggregation_type: aggregation.aggregation_type,
            aggregation_field: aggregation.field.clone(),
            group_field: Some(rel.slave_id_field.clone()),
            in_filter_field: None,
            grouped_in_filter_values: Vec::new(),
            criteria,
        };
        let rows = try_outcome!(
            call_remote(
                self.policy.as_ref(),
                &rel.field,
                name,
                "aggregate_by",
                client.aggregate_by(cx, param),
            )
            .await
        );
        if let Some(rows) = rows {
            try_result!(merge_aggregation(entities, rel, rows));
        }
        Outcome::Ok(())
    }

    /// Attach the raw join-table rows of a single master.
    async fn many_to_many<E: Entity>(
        &self,
        cx: &Cx,
        rel: &CompiledRelation,
        entities: &mut [E],
    ) -> Outcome<(), Error> {
        let Some(link) = rel.link.as_ref() else {
            return Outcome::Ok(());
        };
        for entity in entities.iter_mut() {
            let id = entity.get_field(&rel.master_id_field);
            if id.is_null() {
                continue;
            }
            let criteria = [relmodel_query::Criteria::eq(link.master_id_field.clone(), id)];
            let rows = try_outcome!(link.service.list_by(cx, &criteria, None).await);
            let value = Value::Array(rows.into_iter().map(Value::from).collect());
            try_result!(entity.set_field(&rel.field, value));
        }
        Outcome::Ok(())
    }
}
