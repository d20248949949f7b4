//! Local slave sources: store-backed services and constant dictionaries.

use crate::store::LocalStore;
use asupersync::{Cx, Outcome};
use relmodel_core::{DeletedFlag, EntityMeta, Error, Record, Result, SchemaError, SchemaErrorKind, Value, ValueKey};
use relmodel_query::{
    AggregationType, COUNT_ALIAS, ColumnRef, Condition, Criteria, Operator, SelectList,
    SelectStatement, build_grouped_query,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to one entity type's table.
///
/// Every statement issued through a service filters out logically deleted
/// rows when the entity has a deleted-flag field, and every returned row is
/// re-keyed from column names to field names.
pub struct LocalService {
    meta: Arc<EntityMeta>,
    store: Arc<dyn LocalStore>,
}

impl std::fmt::Debug for LocalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalService")
            .field("entity", &self.meta.name)
            .field("table", &self.meta.table)
            .finish_non_exhaustive()
    }
}

impl LocalService {
    pub fn new(meta: Arc<EntityMeta>, store: Arc<dyn LocalStore>) -> Self {
        Self { meta, store }
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// `table.column` for a field of this entity.
    pub fn column(&self, field: &str) -> Result<ColumnRef> {
        match self.meta.column_of(field) {
            Some(column) => Ok(ColumnRef::new(self.meta.table.clone(), column)),
            None => Err(SchemaError {
                kind: SchemaErrorKind::UnknownField,
                entity: Some(self.meta.name.clone()),
                message: format!("field '{}' has no column mapping", field),
            }
            .into()),
        }
    }

    /// `deleted_flag = NORMAL` for entities supporting logical delete.
    pub fn normal_filter(&self) -> Option<Condition> {
        self.meta.deleted_flag_column().map(|column| {
            Condition::compare(
                ColumnRef::new(self.meta.table.clone(), column),
                Operator::Eq,
                Value::Int(DeletedFlag::NORMAL),
            )
        })
    }

    /// Translate field predicates on this entity into column conditions.
    pub fn criteria_conditions(&self, criteria: &[Criteria]) -> Result<Vec<Condition>> {
        criteria
            .iter()
            .map(|c| {
                if let Some(model) = &c.model {
                    if model != &self.meta.name {
                        return Err(SchemaError {
                            kind: SchemaErrorKind::Invalid,
                            entity: Some(self.meta.name.clone()),
                            message: format!(
                                "predicate on '{}.{}' cannot be applied to '{}'",
                                model, c.field, self.meta.name
                            ),
                        }
                        .into());
                    }
                }
                Ok(Condition::compare(self.column(&c.field)?, c.operator, c.value.clone()))
            })
            .collect()
    }

    /// Re-key a column-keyed row by field name; unmapped columns keep their name.
    pub fn to_fields(&self, row: Record) -> Record {
        let mut out = Record::new();
        for (column, value) in row {
            match self.meta.field_of(&column) {
                Some(field) => out.set(field, value),
                None => out.set(column, value),
            }
        }
        out
    }

    fn statement(&self, mut conditions: Vec<Condition>) -> SelectStatement {
        if let Some(normal) = self.normal_filter() {
            conditions.push(normal);
        }
        SelectStatement::from_table(self.meta.table.clone()).filters(conditions)
    }

    fn order_terms(&self, order_by: Option<&str>) -> Result<Vec<(ColumnRef, bool)>> {
        let Some(order_by) = order_by else {
            return Ok(Vec::new());
        };
        order_by
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| {
                let mut parts = term.split_whitespace();
                let field = parts.next().unwrap_or_default();
                let descending = parts
                    .next()
                    .is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
                Ok((self.column(field)?, descending))
            })
            .collect()
    }

    /// Run a statement and re-key the rows by field name.
    #[tracing::instrument(level = "debug", skip(self, cx, statement), fields(entity = %self.meta.name))]
    pub async fn fetch(&self, cx: &Cx, statement: &SelectStatement) -> Outcome<Vec<Record>, Error> {
        if let Ok(sql) = statement.to_sql() {
            tracing::trace!(sql = %sql, "Local select");
        }
        let rows = try_outcome!(self.store.select(cx, statement).await);
        let keyed = matches!(statement.select, SelectList::All | SelectList::Columns(_));
        let rows = if keyed {
            rows.into_iter().map(|row| self.to_fields(row)).collect()
        } else {
            rows
        };
        Outcome::Ok(rows)
    }

    /// Fetch one live row by primary key.
    pub async fn get_by_id(&self, cx: &Cx, id: &Value) -> Outcome<Option<Record>, Error> {
        let id_field = self.meta.id_field.clone();
        self.get_one_by(cx, &id_field, id).await
    }

    /// Fetch the first live row whose `field` equals `value`.
    pub async fn get_one_by(&self, cx: &Cx, field: &str, value: &Value) -> Outcome<Option<Record>, Error> {
        if value.is_null() {
            return Outcome::Ok(None);
        }
        let column = try_result!(self.column(field));
        let stmt = self.statement(vec![Condition::compare(column, Operator::Eq, value.clone())]);
        let rows = try_outcome!(self.fetch(cx, &stmt).await);
        Outcome::Ok(rows.into_iter().next())
    }

    /// Fetch live rows whose `field` is in `values`. No query is issued for an empty set.
    ///
    /// `order_by` is a comma-separated list of field names, each optionally followed by `DESC`.
    pub async fn get_in_list(
        &self,
        cx: &Cx,
        field: &str,
        values: Vec<Value>,
        order_by: Option<&str>,
    ) -> Outcome<Vec<Record>, Error> {
        if values.is_empty() {
            return Outcome::Ok(Vec::new());
        }
        let column = try_result!(self.column(field));
        let mut stmt = self.statement(vec![Condition::compare(
            column,
            Operator::In,
            Value::Array(values),
        )]);
        for (column, descending) in try_result!(self.order_terms(order_by)) {
            stmt = stmt.order_by(column, descending);
        }
        self.fetch(cx, &stmt).await
    }

    /// Fetch live rows matching all predicates.
    pub async fn list_by(
        &self,
        cx: &Cx,
        criteria: &[Criteria],
        order_by: Option<&str>,
    ) -> Outcome<Vec<Record>, Error> {
        let conditions = try_result!(self.criteria_conditions(criteria));
        let mut stmt = self.statement(conditions);
        for (column, descending) in try_result!(self.order_terms(order_by)) {
            stmt = stmt.order_by(column, descending);
        }
        self.fetch(cx, &stmt).await
    }

    /// Fetch live rows matching all predicates, keeping only `fields`.
    pub async fn project_by(
        &self,
        cx: &Cx,
        criteria: &[Criteria],
        fields: &[String],
    ) -> Outcome<Vec<Record>, Error> {
        let conditions = try_result!(self.criteria_conditions(criteria));
        let columns = try_result!(
            fields
                .iter()
                .map(|f| self.column(f))
                .collect::<Result<Vec<_>>>()
        );
        let stmt = self.statement(conditions).select(SelectList::Columns(columns));
        self.fetch(cx, &stmt).await
    }

    /// Count live rows matching all predicates.
    pub async fn count_by(&self, cx: &Cx, criteria: &[Criteria]) -> Outcome<i64, Error> {
        let conditions = try_result!(self.criteria_conditions(criteria));
        let stmt = self.statement(conditions).select(SelectList::Count);
        let rows = try_outcome!(self.fetch(cx, &stmt).await);
        let total = rows
            .first()
            .and_then(|r| r.get(COUNT_ALIAS))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Outcome::Ok(total)
    }

    /// Grouped aggregate of `aggregation_field` per `group_field` over live rows
    /// matching `conditions`. Rows carry `KEY` and `VALUE`.
    pub async fn aggregate(
        &self,
        cx: &Cx,
        conditions: Vec<Condition>,
        group_field: &str,
        aggregation_type: AggregationType,
        aggregation_field: &str,
    ) -> Outcome<Vec<Record>, Error> {
        let group = try_result!(self.column(group_field));
        let grouped = try_result!(build_grouped_query(
            &group.table,
            &group.column,
            &self.meta,
            aggregation_field,
            aggregation_type,
        ));
        let stmt = self
            .statement(conditions)
            .select(grouped.select_list())
            .group_by(grouped.group_by());
        self.fetch(cx, &stmt).await
    }
}

/// An in-memory id → display name table.
#[derive(Debug, Clone, Default)]
pub struct ConstDict {
    name: String,
    entries: HashMap<ValueKey, String>,
}

impl ConstDict {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    pub fn entry(mut self, id: impl Into<Value>, name: impl Into<String>) -> Self {
        if let Some(key) = id.into().key() {
            self.entries.insert(key, name.into());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookup(&self, id: &Value) -> Option<&str> {
        id.key()
            .and_then(|key| self.entries.get(&key))
            .map(String::as_str)
    }

    /// `{id, name}` for a known id.
    pub fn dict_value(&self, id: &Value) -> Option<Record> {
        self.lookup(id)
            .map(|name| Record::new().with("id", id.clone()).with("name", name))
    }
}
