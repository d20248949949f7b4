//! Statement planning for local aggregate relations.

use crate::schema::{CompiledAggregation, CompiledLink, CompiledRelation};
use crate::source::LocalService;
use relmodel_core::{Error, Result, SchemaError, SchemaErrorKind, Value};
use relmodel_query::{
    ColumnRef, Condition, Criteria, SelectStatement, build_grouped_query,
    only_select_relation_table,
};

/// A planned many-to-many aggregate statement.
#[derive(Debug, Clone)]
pub struct ManyToManyPlan {
    pub only_select_relation_table: bool,
    pub statement: SelectStatement,
}

fn invalid(entity: &str, message: String) -> Error {
    SchemaError {
        kind: SchemaErrorKind::Invalid,
        entity: Some(entity.to_string()),
        message,
    }
    .into()
}

pub(crate) fn parts(rel: &CompiledRelation) -> Result<(&CompiledLink, &CompiledAggregation, &LocalService)> {
    match (&rel.link, &rel.aggregation) {
        (Some(link), Some(aggregation)) => {
            let slave = rel.local_service().map(AsRef::as_ref);
            match slave {
                Some(slave) => Ok((link, aggregation, slave)),
                None => Ok((link, aggregation, link.service.as_ref())),
            }
        }
        _ => Err(invalid(
            &rel.slave_model,
            format!("relation '{}' is not a compiled many-to-many aggregate", rel.field),
        )),
    }
}

/// WHERE conditions of a local one-to-many aggregate: the master filter plus
/// the caller's predicates, all on the slave table.
pub fn one_to_many_conditions(
    service: &LocalService,
    rel: &CompiledRelation,
    master_ids: Vec<Value>,
    single: bool,
    predicates: &[Criteria],
) -> Result<Vec<Condition>> {
    let mut conditions = vec![Condition::eq_or_in(
        service.column(&rel.slave_id_field)?,
        master_ids,
        single,
    )];
    conditions.extend(service.criteria_conditions(predicates)?);
    Ok(conditions)
}

/// Plan a local many-to-many aggregate.
///
/// The statement groups join-table rows by master id. The slave table joins in
/// only when the aggregated field lives on the slave or a predicate targets
/// the slave model. Predicates without a model tag apply to the join table.
/// Soft-delete filters are added for every table in the FROM list.
pub fn plan_local_many_to_many(
    rel: &CompiledRelation,
    master_ids: Vec<Value>,
    single: bool,
    predicates: &[Criteria],
) -> Result<ManyToManyPlan> {
    let (link, aggregation, slave) = parts(rel)?;
    let relation = link.service.as_ref();
    let relation_meta = relation.meta();

    let only = only_select_relation_table(aggregation.on_relation, &rel.slave_model, predicates);

    let group = relation.column(&link.master_id_field)?;
    let aggregation_meta = if aggregation.on_relation {
        relation_meta
    } else {
        slave.meta()
    };
    let grouped = build_grouped_query(
        &group.table,
        &group.column,
        aggregation_meta,
        &aggregation.field,
        aggregation.aggregation_type,
    )?;

    let mut statement = SelectStatement::from_table(relation_meta.table.clone());
    if !only {
        statement = statement.join_table(slave.meta().table.clone()).filter(Condition::ColumnsEqual(
            relation.column(&link.slave_id_field)?,
            slave.column(&rel.slave_id_field)?,
        ));
    }

    statement = statement.filter(Condition::eq_or_in(group, master_ids, single));

    for criteria in predicates {
        let target = match criteria.model.as_deref() {
            None => relation,
            Some(model) if model == relation_meta.name => relation,
            Some(model) if model == rel.slave_model && !only => slave,
            Some(model) => {
                return Err(invalid(
                    &relation_meta.name,
                    format!(
                        "predicate on '{}.{}' does not belong to relation '{}'",
                        model, criteria.field, rel.field
                    ),
                ));
            }
        };
        let column: ColumnRef = target.column(&criteria.field)?;
        statement = statement.filter(Condition::compare(
            column,
            criteria.operator,
            criteria.value.clone(),
        ));
    }

    if let Some(normal) = relation.normal_filter() {
        statement = statement.filter(normal);
    }
    if !only {
        if let Some(normal) = slave.normal_filter() {
            statement = statement.filter(normal);
        }
    }

    statement = statement
        .select(grouped.select_list())
        .group_by(grouped.group_by());

    tracing::debug!(
        relation = %rel.field,
        only_select_relation_table = only,
        "Planned many-to-many aggregate"
    );

    Ok(ManyToManyPlan {
        only_select_relation_table: only,
        statement,
    })
}
