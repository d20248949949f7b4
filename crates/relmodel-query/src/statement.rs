//! SELECT statements over typed column references.

use crate::aggregate::{AggregationType, KEY, VALUE};
use crate::criteria::{Operator, render_literal};
use crate::ident::validate_identifier;
use relmodel_core::{Result, Value};
use std::fmt;

/// Alias of the single column returned by a `SelectList::Count` statement.
pub const COUNT_ALIAS: &str = "TOTAL";

/// A `table.column` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.column)?;
        Ok(())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One conjunct of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column <op> literal`
    Compare {
        column: ColumnRef,
        operator: Operator,
        value: Value,
    },
    /// `left = right`, a join condition
    ColumnsEqual(ColumnRef, ColumnRef),
}

impl Condition {
    pub fn compare(column: ColumnRef, operator: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column,
            operator,
            value: value.into(),
        }
    }

    /// `column = value` for one value, `column IN (...)` for many.
    pub fn eq_or_in(column: ColumnRef, mut values: Vec<Value>, single: bool) -> Self {
        if single && values.len() == 1 {
            Condition::compare(column, Operator::Eq, values.remove(0))
        } else {
            Condition::compare(column, Operator::In, Value::Array(values))
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Condition::Compare { column, .. } => column.validate(),
            Condition::ColumnsEqual(l, r) => {
                l.validate()?;
                r.validate()
            }
        }
    }

    /// Render this condition as SQL text.
    pub fn to_sql(&self) -> String {
        self.render(None)
    }

    /// Render with `?` placeholders, appending the bound values to `params`.
    pub fn to_parameterized_sql(&self, params: &mut Vec<Value>) -> String {
        self.render(Some(params))
    }

    fn render(&self, params: Option<&mut Vec<Value>>) -> String {
        match self {
            Condition::Compare {
                column,
                operator,
                value,
            } => {
                if operator.is_unary() {
                    format!("{} {}", column, operator.as_str())
                } else {
                    format!("{} {} {}", column, operator.as_str(), operand(value, params))
                }
            }
            Condition::ColumnsEqual(l, r) => format!("{} = {}", l, r),
        }
    }
}

/// A literal, or placeholders for it when collecting parameters. Each array
/// item gets its own placeholder.
fn operand(value: &Value, params: Option<&mut Vec<Value>>) -> String {
    let Some(params) = params else {
        return render_literal(value);
    };
    match value {
        Value::Array(items) => {
            params.extend(items.iter().cloned());
            format!("({})", vec!["?"; items.len()].join(", "))
        }
        other => {
            params.push(other.clone());
            "?".to_string()
        }
    }
}

/// What a statement selects.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    /// Every column of the first table
    All,
    /// The listed columns; result rows are keyed by column name
    Columns(Vec<ColumnRef>),
    /// `key AS KEY, FUNC(value) AS VALUE`, paired with a GROUP BY on `key`
    Grouped {
        key: ColumnRef,
        function: AggregationType,
        value: ColumnRef,
    },
    /// `COUNT(*) AS TOTAL`
    Count,
}

/// Ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub descending: bool,
}

/// A SELECT statement issued to a local store.
///
/// Stores render it with [`SelectStatement::to_parameterized_sql`] and bind
/// the values; [`SelectStatement::to_sql`] inlines them for logs and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub tables: Vec<String>,
    pub select: SelectList,
    pub conditions: Vec<Condition>,
    pub group_by: Option<ColumnRef>,
    pub order_by: Vec<OrderBy>,
}

impl SelectStatement {
    /// `SELECT * FROM table`.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            tables: vec![table.into()],
            select: SelectList::All,
            conditions: Vec::new(),
            group_by: None,
            order_by: Vec::new(),
        }
    }

    /// Add a table to the FROM list if not already present.
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        if !self.tables.contains(&table) {
            self.tables.push(table);
        }
        self
    }

    pub fn select(mut self, select: SelectList) -> Self {
        self.select = select;
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn group_by(mut self, column: ColumnRef) -> Self {
        self.group_by = Some(column);
        self
    }

    pub fn order_by(mut self, column: ColumnRef, descending: bool) -> Self {
        self.order_by.push(OrderBy { column, descending });
        self
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    /// Validate every identifier the statement would render.
    pub fn validate(&self) -> Result<()> {
        for table in &self.tables {
            validate_identifier(table)?;
        }
        match &self.select {
            SelectList::All | SelectList::Count => {}
            SelectList::Columns(cols) => {
                for c in cols {
                    c.validate()?;
                }
            }
            SelectList::Grouped { key, value, .. } => {
                key.validate()?;
                value.validate()?;
            }
        }
        for c in &self.conditions {
            c.validate()?;
        }
        if let Some(g) = &self.group_by {
            g.validate()?;
        }
        for o in &self.order_by {
            o.column.validate()?;
        }
        Ok(())
    }

    /// The select-list fragment.
    pub fn select_sql(&self) -> String {
        match &self.select {
            SelectList::All => match self.tables.as_slice() {
                [_] | [] => "*".to_string(),
                [first, ..] => format!("{}.*", first),
            },
            SelectList::Columns(cols) => cols
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            SelectList::Grouped {
                key,
                function,
                value,
            } => format!(
                "{} AS {}, {}({}) AS {}",
                key,
                KEY,
                function.function_name(),
                value,
                VALUE
            ),
            SelectList::Count => format!("COUNT(*) AS {}", COUNT_ALIAS),
        }
    }

    /// The WHERE fragment without the keyword; empty when unfiltered.
    pub fn where_sql(&self) -> String {
        self.conditions
            .iter()
            .map(Condition::to_sql)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Render the full statement with inlined literals.
    pub fn to_sql(&self) -> Result<String> {
        self.render(None)
    }

    /// Render the full statement with `?` placeholders and the values to bind,
    /// in placeholder order.
    pub fn to_parameterized_sql(&self) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.render(Some(&mut params))?;
        Ok((sql, params))
    }

    fn render(&self, mut params: Option<&mut Vec<Value>>) -> Result<String> {
        self.validate()?;
        let mut sql = format!("SELECT {} FROM {}", self.select_sql(), self.tables.join(", "));
        if !self.conditions.is_empty() {
            let mut terms = Vec::with_capacity(self.conditions.len());
            for condition in &self.conditions {
                terms.push(condition.render(params.as_deref_mut()));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&terms.join(" AND "));
        }
        if let Some(g) = &self.group_by {
            sql.push_str(&format!(" GROUP BY {}", g));
        }
        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    if o.descending {
                        format!("{} DESC", o.column)
                    } else {
                        o.column.to_string()
                    }
                })
                .collect();
            sql.push_str(&format!(" ORDER BY {}", terms.join(", ")));
        }
        tracing::trace!(sql = %sql, "Rendered select");
        Ok(sql)
    }
}
