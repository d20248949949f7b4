//! Remote calls and the remote many-to-many aggregation coordinator.

use crate::policy::{RemoteErrorPolicy, handle_remote_failure};
use crate::schema::CompiledRelation;
use crate::store::BoxOutcome;
use asupersync::{Cx, Outcome};
use relmodel_core::{Error, Record, RemoteDataError, Result, SchemaError, SchemaErrorKind, Value, ValueKey};
use relmodel_query::{
    AggregationKind, AggregationParam, Condition, Criteria, GroupedInFilter, Operator, QueryParam,
    ResponseResult,
};
use std::collections::{BTreeMap, HashSet};

/// Await a remote call and unwrap its envelope.
///
/// `Some(data)` on success. On failure (transport error or `success: false`)
/// the policy decides: `None` to continue without data, or `Err` to abort.
pub async fn call_remote<T: Default>(
    policy: &dyn RemoteErrorPolicy,
    relation: &str,
    service: &str,
    operation: &'static str,
    call: BoxOutcome<'_, ResponseResult<T>>,
) -> Outcome<Option<T>, Error> {
    let failure = match call.await {
        Outcome::Ok(response) => match response.into_result(service, operation) {
            Ok(data) => return Outcome::Ok(Some(data)),
            Err(e) => e,
        },
        Outcome::Err(Error::Remote(e)) => Error::Remote(e),
        Outcome::Err(e) => Error::Remote(RemoteDataError {
            service: service.to_string(),
            operation,
            message: e.to_string(),
        }),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    match handle_remote_failure(policy, relation, failure) {
        Ok(()) => Outcome::Ok(None),
        Err(e) => Outcome::Err(e),
    }
}

/// `field = id` for a single entity, `field IN (...)` for a batch.
pub fn id_criteria(field: &str, mut ids: Vec<Value>, single: bool) -> Criteria {
    if single && ids.len() == 1 {
        Criteria::eq(field, ids.remove(0))
    } else {
        Criteria::in_list(field, ids)
    }
}

/// Predicates of a remote many-to-many aggregate split by target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePredicates {
    /// Applied locally to the join table
    pub relation: Vec<Criteria>,
    /// Sent to the remote slave service
    pub slave: Vec<Criteria>,
}

/// Split predicates into join-table and remote-slave buckets by model tag.
/// Untagged predicates apply to the join table.
pub fn split_predicates(rel: &CompiledRelation, predicates: &[Criteria]) -> Result<RemotePredicates> {
    let relation_model = rel
        .link
        .as_ref()
        .map(|l| l.service.name().to_string())
        .unwrap_or_default();
    let mut out = RemotePredicates::default();
    for criteria in predicates {
        match criteria.model.as_deref() {
            None => out.relation.push(criteria.clone()),
            Some(model) if model == relation_model => out.relation.push(criteria.clone()),
            Some(model) if model == rel.slave_model => out.slave.push(criteria.clone()),
            Some(model) => {
                return Err(SchemaError {
                    kind: SchemaErrorKind::Invalid,
                    entity: Some(relation_model),
                    message: format!(
                        "predicate on '{}.{}' does not belong to relation '{}'",
                        model, criteria.field, rel.field
                    ),
                }
                .into());
            }
        }
    }
    Ok(out)
}

/// Resolve a many-to-many aggregate whose slave lives in a remote service.
///
/// Returns the `KEY`/`VALUE` rows to merge, or `None` when a remote failure
/// was ignored by policy.
#[tracing::instrument(level = "debug", skip_all, fields(relation = %rel.field))]
pub async fn remote_many_to_many(
    cx: &Cx,
    policy: &dyn RemoteErrorPolicy,
    rel: &CompiledRelation,
    master_ids: Vec<Value>,
    single: bool,
    predicates: &[Criteria],
) -> Outcome<Option<Vec<Record>>, Error> {
    let (Some(link), Some(aggregation), Some((client_name, client))) =
        (&rel.link, &rel.aggregation, rel.remote_client())
    else {
        return Outcome::Err(Error::schema(
            SchemaErrorKind::Invalid,
            format!("relation '{}' is not a compiled remote many-to-many aggregate", rel.field),
        ));
    };
    let split = try_result!(split_predicates(rel, predicates));
    let relation = link.service.as_ref();
    let master_filter = try_result!(relation.column(&link.master_id_field));

    let relation_conditions = |extra: Option<Condition>| -> Result<Vec<Condition>> {
        let mut conditions = vec![Condition::eq_or_in(master_filter.clone(), master_ids.clone(), single)];
        conditions.extend(relation.criteria_conditions(&strip_models(&split.relation))?);
        conditions.extend(extra);
        Ok(conditions)
    };

    if aggregation.on_relation && split.slave.is_empty() {
        tracing::debug!("Aggregating on join table without remote call");
        let conditions = try_result!(relation_conditions(None));
        let rows = try_outcome!(
            relation
                .aggregate(
                    cx,
                    conditions,
                    &link.master_id_field,
                    aggregation.aggregation_type,
                    &aggregation.field,
                )
                .await
        );
        return Outcome::Ok(Some(rows));
    }

    // Stage one: local projection of (master id, slave id) pairs.
    let mut projection_criteria = strip_models(&split.relation);
    projection_criteria.push(id_criteria(&link.master_id_field, master_ids.clone(), single));
    let pairs = try_outcome!(
        relation
            .project_by(
                cx,
                &projection_criteria,
                &[link.master_id_field.clone(), link.slave_id_field.clone()],
            )
            .await
    );

    if aggregation.on_relation {
        let slave_ids = distinct(pairs.iter().map(|r| r.get_or_null(&link.slave_id_field)));
        if slave_ids.is_empty() {
            return Outcome::Ok(Some(Vec::new()));
        }
        // Stage two: let the remote slave filter the candidate slave ids.
        let mut criteria = split.slave.clone();
        criteria.push(Criteria::in_list(rel.slave_id_field.clone(), slave_ids));
        let param = QueryParam::new(criteria).select(vec![rel.slave_id_field.clone()]);
        let filtered = try_outcome!(
            call_remote(
                policy,
                &rel.field,
                client_name,
                "list_map_by",
                client.list_map_by(cx, param),
            )
            .await
        );
        let Some(filtered) = filtered else {
            return Outcome::Ok(None);
        };
        let kept = distinct(filtered.iter().map(|r| r.get_or_null(&rel.slave_id_field)));
        if kept.is_empty() {
            return Outcome::Ok(Some(Vec::new()));
        }
        // Stage three: aggregate the join table over the surviving slave ids.
        let slave_column = try_result!(relation.column(&link.slave_id_field));
        let conditions = try_result!(relation_conditions(Some(Condition::compare(
            slave_column,
            Operator::In,
            Value::Array(kept),
        ))));
        let rows = try_outcome!(
            relation
                .aggregate(
                    cx,
                    conditions,
                    &link.master_id_field,
                    aggregation.aggregation_type,
                    &aggregation.field,
                )
                .await
        );
        return Outcome::Ok(Some(rows));
    }

    // Aggregated field lives on the remote slave: ship the grouped slave-id sets.
    let groups = group_pairs(&pairs, &link.master_id_field, &link.slave_id_field);
    if groups.is_empty() {
        return Outcome::Ok(Some(Vec::new()));
    }
    let param = AggregationParam {
        kind: AggregationKind::ManyToMany,
        aggregation_type: aggregation.aggregation_type,
        aggregation_field: aggregation.field.clone(),
        group_field: None,
        in_filter_field: Some(rel.slave_id_field.clone()),
        grouped_in_filter_values: groups,
        criteria: split.slave.clone(),
    };
    call_remote(
        policy,
        &rel.field,
        client_name,
        "aggregate_by",
        client.aggregate_by(cx, param),
    )
    .await
}

fn strip_models(criteria: &[Criteria]) -> Vec<Criteria> {
    criteria
        .iter()
        .cloned()
        .map(|mut c| {
            c.model = None;
            c
        })
        .collect()
}

/// Non-null values in first-seen order, deduplicated by identity.
pub fn distinct(values: impl Iterator<Item = Value>) -> Vec<Value> {
    let mut seen: HashSet<ValueKey> = HashSet::new();
    values
        .filter(|v| v.key().is_some_and(|k| seen.insert(k)))
        .collect()
}

fn group_pairs(pairs: &[Record], master_field: &str, slave_field: &str) -> Vec<GroupedInFilter> {
    let mut groups: BTreeMap<ValueKey, (Value, Vec<Value>)> = BTreeMap::new();
    for pair in pairs {
        let master = pair.get_or_null(master_field);
        let slave = pair.get_or_null(slave_field);
        let (Some(key), false) = (master.key(), slave.is_null()) else {
            continue;
        };
        groups
            .entry(key)
            .or_insert_with(|| (master.clone(), Vec::new()))
            .1
            .push(slave);
    }
    groups
        .into_values()
        .map(|(key, values)| GroupedInFilter {
            key,
            values: distinct(values.into_iter()),
        })
        .collect()
}
