//! Read paths of one entity type, with relation assembly on top.

use crate::config::ConfigHandle;
use asupersync::{Cx, Outcome};
use relmodel_core::{Entity, EntityMeta, Error, Record, Value};
use relmodel_query::Criteria;
use relmodel_relation::{
    Assembler, LocalService, PredicateMap, RelationParam, RemoteErrorPolicy, remote::distinct,
    try_outcome,
};
use std::sync::Arc;

/// Data service of one entity type.
///
/// Wraps the entity's `LocalService` and the shared `Assembler`, rebound to
/// this service's own configuration for remote failures. Every
/// `*_with_relation` read and every `build_relation_for_*` call applies the
/// service-level aggregation predicates first, then the caller's.
#[derive(Debug, Clone)]
pub struct DataService {
    local: Arc<LocalService>,
    assembler: Assembler,
    config: Arc<ConfigHandle>,
    aggregation_predicates: PredicateMap,
}

impl DataService {
    pub fn new(local: Arc<LocalService>, assembler: Assembler, config: Arc<ConfigHandle>) -> Self {
        let policy: Arc<dyn RemoteErrorPolicy> = config.clone();
        Self {
            local,
            assembler: assembler.with_policy(policy),
            config,
            aggregation_predicates: PredicateMap::new(),
        }
    }

    /// Predicates added to every aggregate relation this service assembles.
    pub fn with_aggregation_predicates(mut self, predicates: PredicateMap) -> Self {
        self.aggregation_predicates = predicates;
        self
    }

    pub fn name(&self) -> &str {
        self.local.name()
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        self.local.meta()
    }

    pub fn local(&self) -> &Arc<LocalService> {
        &self.local
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    fn predicates(&self, extra: &PredicateMap) -> PredicateMap {
        let mut merged = self.aggregation_predicates.clone();
        merged.merge(extra);
        merged
    }

    pub async fn get_by_id(&self, cx: &Cx, id: &Value) -> Outcome<Option<Record>, Error> {
        self.local.get_by_id(cx, id).await
    }

    /// Live rows whose `field` is in `values`, optionally ordered (`"score DESC, name"`).
    pub async fn get_in_list(
        &self,
        cx: &Cx,
        field: &str,
        values: Vec<Value>,
        order_by: Option<&str>,
    ) -> Outcome<Vec<Record>, Error> {
        self.local.get_in_list(cx, field, values, order_by).await
    }

    pub async fn get_all_list(&self, cx: &Cx) -> Outcome<Vec<Record>, Error> {
        self.local.list_by(cx, &[], None).await
    }

    pub async fn get_list_by(
        &self,
        cx: &Cx,
        criteria: &[Criteria],
        order_by: Option<&str>,
    ) -> Outcome<Vec<Record>, Error> {
        self.local.list_by(cx, criteria, order_by).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, request), fields(entity = %self.name()))]
    pub async fn get_by_id_with_relation(
        &self,
        cx: &Cx,
        id: &Value,
        request: &RelationParam,
    ) -> Outcome<Option<Record>, Error> {
        let Some(mut record) = try_outcome!(self.local.get_by_id(cx, id).await) else {
            return Outcome::Ok(None);
        };
        try_outcome!(
            self.build_relation_for_data(cx, &mut record, request, &PredicateMap::new())
                .await
        );
        Outcome::Ok(Some(record))
    }

    pub async fn get_all_list_with_relation(
        &self,
        cx: &Cx,
        request: &RelationParam,
    ) -> Outcome<Vec<Record>, Error> {
        self.get_list_with_relation(cx, &[], None, request).await
    }

    #[tracing::instrument(level = "debug", skip(self, cx, criteria, request), fields(entity = %self.name()))]
    pub async fn get_list_with_relation(
        &self,
        cx: &Cx,
        criteria: &[Criteria],
        order_by: Option<&str>,
        request: &RelationParam,
    ) -> Outcome<Vec<Record>, Error> {
        let mut records = try_outcome!(self.local.list_by(cx, criteria, order_by).await);
        try_outcome!(
            self.build_relation_for_data_list(cx, &mut records, request, &PredicateMap::new())
                .await
        );
        Outcome::Ok(records)
    }

    /// Enrich one entity of this service's type.
    pub async fn build_relation_for_data<E: Entity>(
        &self,
        cx: &Cx,
        entity: &mut E,
        request: &RelationParam,
        predicates: &PredicateMap,
    ) -> Outcome<(), Error> {
        let predicates = self.predicates(predicates);
        self.assembler
            .assemble_one(cx, self.name(), entity, request, &predicates)
            .await
    }

    /// Enrich a batch of entities of this service's type.
    pub async fn build_relation_for_data_list<E: Entity>(
        &self,
        cx: &Cx,
        entities: &mut [E],
        request: &RelationParam,
        predicates: &PredicateMap,
    ) -> Outcome<(), Error> {
        let predicates = self.predicates(predicates);
        self.assembler
            .assemble_list(cx, self.name(), entities, request, &predicates)
            .await
    }

    pub async fn exist_id(&self, cx: &Cx, id: &Value) -> Outcome<bool, Error> {
        let found = try_outcome!(self.local.get_by_id(cx, id).await);
        Outcome::Ok(found.is_some())
    }

    /// True when exactly one live row has `field = value`.
    pub async fn exist_one(&self, cx: &Cx, field: &str, value: &Value) -> Outcome<bool, Error> {
        if field == self.meta().id_field {
            return self.exist_id(cx, value).await;
        }
        let count = try_outcome!(
            self.local
                .count_by(cx, &[Criteria::eq(field, value.clone())])
                .await
        );
        Outcome::Ok(count == 1)
    }

    /// True when every id names a live row.
    pub async fn exist_all_primary_keys(&self, cx: &Cx, ids: Vec<Value>) -> Outcome<bool, Error> {
        let id_field = self.meta().id_field.clone();
        self.exist_unique_key_list(cx, &id_field, ids).await
    }

    /// True when every distinct value of a unique field names a live row.
    /// An empty list is false.
    pub async fn exist_unique_key_list(
        &self,
        cx: &Cx,
        field: &str,
        values: Vec<Value>,
    ) -> Outcome<bool, Error> {
        let values = distinct(values.into_iter());
        if values.is_empty() {
            return Outcome::Ok(false);
        }
        let expected = values.len();
        let count = try_outcome!(
            self.local
                .count_by(cx, &[Criteria::in_list(field, values)])
                .await
        );
        Outcome::Ok(usize::try_from(count).is_ok_and(|c| c == expected))
    }
}
