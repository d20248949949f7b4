//! `LocalStore` over one SQLite connection.

#![allow(clippy::borrow_as_ptr, clippy::ptr_as_ptr)]

use crate::types;
use asupersync::{Cx, Outcome};
use libsqlite3_sys as ffi;
use relmodel_core::{Error, QueryError, Record, Result, Value};
use relmodel_query::{
    COUNT_ALIAS, KEY, SelectList, SelectStatement, VALUE, validate_identifier,
};
use relmodel_relation::{BoxOutcome, LocalStore};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Mutex, PoisonError};

// libsqlite3-sys blocklists `sqlite3_close_v2` from its generated bindings;
// the bundled SQLite library still exports it.
unsafe extern "C" {
    fn sqlite3_close_v2(db: *mut ffi::sqlite3) -> c_int;
}

/// The raw connection handle, only touched under the store's mutex.
struct SqliteInner {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is opened with SQLITE_OPEN_FULLMUTEX and every use goes
// through the Mutex in `SqliteStore`.
unsafe impl Send for SqliteInner {}

/// A prepared statement, finalized on drop.
struct Prepared(*mut ffi::sqlite3_stmt);

impl Drop for Prepared {
    fn drop(&mut self) {
        // SAFETY: the handle came from sqlite3_prepare_v2 and is finalized once.
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

/// A local relational store backed by SQLite.
///
/// Statements run synchronously on the calling task; the connection is
/// serialized by a mutex. Every `SelectStatement` executed through
/// [`SqliteStore::execute`] (and so through `LocalStore::select`) is appended
/// to a history.
pub struct SqliteStore {
    inner: Mutex<SqliteInner>,
    path: String,
    executed: Mutex<Vec<SelectStatement>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("executed", &self.statement_count())
            .finish_non_exhaustive()
    }
}

fn query_error(sql: Option<&str>, message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        sql: sql.map(str::to_string),
        message: message.into(),
        source: None,
    })
}

/// Last error message on `db`.
///
/// # Safety
/// `db` must be a valid connection handle.
unsafe fn last_error(db: *mut ffi::sqlite3) -> String {
    // SAFETY: upheld by the caller; sqlite3_errmsg never returns null for a valid handle.
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

fn error_string(rc: c_int) -> String {
    // SAFETY: sqlite3_errstr returns a static string for any code.
    unsafe { CStr::from_ptr(ffi::sqlite3_errstr(rc)) }
        .to_string_lossy()
        .into_owned()
}

/// Result column names a statement promises, in select-list order.
/// `None` defers to the names SQLite reports.
fn result_columns(statement: &SelectStatement) -> Option<Vec<String>> {
    match &statement.select {
        SelectList::All => None,
        SelectList::Columns(cols) => Some(cols.iter().map(|c| c.column.clone()).collect()),
        SelectList::Grouped { .. } => Some(vec![KEY.to_string(), VALUE.to_string()]),
        SelectList::Count => Some(vec![COUNT_ALIAS.to_string()]),
    }
}

impl SqliteStore {
    /// Open (or create) a database file; `":memory:"` opens a private in-memory database.
    pub fn open(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let c_path = CString::new(path.as_str())
            .map_err(|_| query_error(None, "invalid database path: contains null byte"))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags =
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE | ffi::SQLITE_OPEN_FULLMUTEX;

        // SAFETY: valid pointers; the return code is checked below.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                error_string(rc)
            } else {
                // SAFETY: db is a handle sqlite3_open_v2 allocated; closed right after.
                unsafe {
                    let message = last_error(db);
                    ffi::sqlite3_close(db);
                    message
                }
            };
            return Err(query_error(
                None,
                format!("failed to open database '{}': {}", path, message),
            ));
        }

        tracing::debug!(path = %path, "Opened SQLite store");
        Ok(Self {
            inner: Mutex::new(SqliteInner { db }),
            path,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL directly without preparing (DDL, scripts).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let c_sql =
            CString::new(sql).map_err(|_| query_error(Some(sql), "SQL contains null byte"))?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: all pointers are valid for the duration of the call.
        let rc = unsafe {
            ffi::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc != ffi::SQLITE_OK {
            let message = if errmsg.is_null() {
                error_string(rc)
            } else {
                // SAFETY: errmsg was allocated by sqlite3_exec and is freed once.
                unsafe {
                    let message = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    message
                }
            };
            return Err(query_error(Some(sql), message));
        }
        Ok(())
    }

    /// Insert one column-keyed row into `table` with bound values.
    pub fn insert(&self, table: &str, row: &Record) -> Result<()> {
        validate_identifier(table)?;
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let mut columns = Vec::with_capacity(row.len());
            for name in row.names() {
                validate_identifier(name)?;
                columns.push(name);
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };
        let params: Vec<Value> = row.iter().map(|(_, v)| v.clone()).collect();
        self.run(&sql, &params, None)?;
        Ok(())
    }

    pub fn insert_all(&self, table: &str, rows: impl IntoIterator<Item = Record>) -> Result<()> {
        for row in rows {
            self.insert(table, &row)?;
        }
        Ok(())
    }

    /// Number of rows in `table`, deleted or not. Not recorded in the history.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        let statement = SelectStatement::from_table(table).select(SelectList::Count);
        let rows = self.fetch(&statement)?;
        let total = rows
            .first()
            .and_then(|r| r.get(COUNT_ALIAS))
            .and_then(Value::as_i64)
            .unwrap_or_default();
        Ok(usize::try_from(total).unwrap_or_default())
    }

    /// Run arbitrary SQL with bound parameters; rows are keyed by the names SQLite reports.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.run(sql, params, None)
    }

    /// Render `statement` with placeholders, run it and record it in the history.
    pub fn execute(&self, statement: &SelectStatement) -> Result<Vec<Record>> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.clone());
        self.fetch(statement)
    }

    fn fetch(&self, statement: &SelectStatement) -> Result<Vec<Record>> {
        let (sql, params) = statement.to_parameterized_sql()?;
        tracing::debug!(sql = %sql, params = params.len(), "Executing select");
        self.run(&sql, &params, result_columns(statement).as_deref())
    }

    /// Prepare, bind and step `sql`, collecting every row.
    fn run(&self, sql: &str, params: &[Value], names: Option<&[String]>) -> Result<Vec<Record>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let c_sql =
            CString::new(sql).map_err(|_| query_error(Some(sql), "SQL contains null byte"))?;

        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: db is valid and c_sql is NUL-terminated.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(inner.db, c_sql.as_ptr(), -1, &mut raw, ptr::null_mut())
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid.
            return Err(query_error(Some(sql), unsafe { last_error(inner.db) }));
        }
        let stmt = Prepared(raw);

        for (i, param) in params.iter().enumerate() {
            let index = c_int::try_from(i + 1)
                .map_err(|_| query_error(Some(sql), "too many parameters"))?;
            // SAFETY: stmt is valid and the index is 1-based.
            let rc = unsafe { types::bind_value(stmt.0, index, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid.
                let message = unsafe { last_error(inner.db) };
                return Err(query_error(
                    Some(sql),
                    format!("failed to bind parameter {}: {}", index, message),
                ));
            }
        }

        // SAFETY: stmt is valid.
        let col_count = unsafe { ffi::sqlite3_column_count(stmt.0) };
        let mut columns = Vec::new();
        for i in 0..col_count {
            let promised = usize::try_from(i)
                .ok()
                .and_then(|i| names.and_then(|n| n.get(i)))
                .cloned();
            // SAFETY: stmt is valid and i < col_count.
            let name = promised
                .or_else(|| unsafe { types::column_name(stmt.0, i) })
                .unwrap_or_else(|| format!("col{}", i));
            columns.push(name);
        }

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid.
            match unsafe { ffi::sqlite3_step(stmt.0) } {
                ffi::SQLITE_ROW => {
                    let mut row = Record::new();
                    for (i, name) in (0..col_count).zip(&columns) {
                        // SAFETY: stmt just returned SQLITE_ROW and i < col_count.
                        row.set(name.clone(), unsafe { types::read_column(stmt.0, i) });
                    }
                    rows.push(row);
                }
                ffi::SQLITE_DONE => break,
                _ => {
                    // SAFETY: db is valid.
                    return Err(query_error(Some(sql), unsafe { last_error(inner.db) }));
                }
            }
        }
        Ok(rows)
    }

    /// Statements executed so far, oldest first.
    pub fn executed(&self) -> Vec<SelectStatement> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of executed statements that touched `table`.
    pub fn statements_on(&self, table: &str) -> usize {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.has_table(table))
            .count()
    }

    pub fn statement_count(&self) -> usize {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear_history(&self) {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !inner.db.is_null() {
            // SAFETY: db is valid and closed once; prepared statements are
            // finalized by the time `run` returns.
            unsafe {
                sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl LocalStore for SqliteStore {
    fn select<'a>(&'a self, _cx: &'a Cx, statement: &'a SelectStatement) -> BoxOutcome<'a, Vec<Record>> {
        let result = self.execute(statement);
        Box::pin(async move { result.map_or_else(Outcome::Err, Outcome::Ok) })
    }
}
