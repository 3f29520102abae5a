/// Query Execution Module
///
/// Runs one SQL statement, classifies it by its leading keyword and either
/// binds the rows into a `ResultModel` or reports the affected-row count.
/// There is no SQL parser here: statements are passed to the driver verbatim,
/// one at a time.

use crate::core::{AdminError, Result};
use crate::tabular::{CellValue, ResultModel, TabularResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Batch, Connection, Statement};
use std::sync::Arc;
use tracing::debug;

/// Leading keywords of statements that produce rows.
///
/// Everything else (DML, DDL, transaction control) reports an affected count.
const ROW_KEYWORDS: &[&str] = &[
    "SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "WITH", "VALUES",
];

/// First word of a statement, after whitespace, comments and opening parens
static LEADING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?s:\s+|--[^\n]*(?:\n|$)|/\*.*?\*/|\()*([A-Za-z]+)")
        .expect("leading keyword pattern is valid")
});

/// How a statement is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Row-returning: fetch everything and replace the result model
    Rows,
    /// Anything else: execute and report the affected-row count
    Mutation,
}

impl StatementKind {
    /// Classifies a statement by its leading keyword (case-insensitive)
    pub fn from_sql(sql: &str) -> Self {
        let keyword = LEADING_KEYWORD
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_uppercase());

        match keyword {
            Some(word) if ROW_KEYWORDS.contains(&word.as_str()) => StatementKind::Rows,
            _ => StatementKind::Mutation,
        }
    }
}

/// Successful outcome of one statement
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The statement produced rows; this is the result now held by the model
    Rows(Arc<TabularResult>),
    /// The statement changed this many rows; the model was left untouched
    Affected(usize),
}

/// Query execution service that operates on a database connection
pub struct QueryGateway<'a> {
    connection: &'a Connection,
}

impl<'a> QueryGateway<'a> {
    /// Creates a new QueryGateway for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryGateway { connection }
    }

    /// Executes one statement.
    ///
    /// Row-producing statements replace the contents of `model`; all others
    /// leave it as it was and report the affected-row count.
    ///
    /// # Errors
    ///
    /// `EmptyStatement` for blank input, `Driver` (message and SQL verbatim)
    /// when the database rejects the statement or the input holds more than
    /// one statement. Nothing is retried.
    pub fn execute(&self, sql: &str, model: &ResultModel) -> Result<Execution> {
        let statement = sql.trim();
        if statement.is_empty() {
            return Err(AdminError::EmptyStatement);
        }

        let kind = StatementKind::from_sql(statement);
        debug!(?kind, sql = statement, "executing statement");

        match kind {
            StatementKind::Rows => {
                let result = Arc::new(self.fetch(statement)?);
                model.install(Arc::clone(&result));
                Ok(Execution::Rows(result))
            }
            StatementKind::Mutation => {
                let mut stmt = self.prepare_single(statement)?;
                let affected = if stmt.column_count() == 0 {
                    stmt.execute([]).map_err(|e| AdminError::driver(e, statement))?
                } else {
                    // RETURNING clause: the change is applied while stepping
                    let mut rows = stmt.query([]).map_err(|e| AdminError::driver(e, statement))?;
                    while rows.next().map_err(|e| AdminError::driver(e, statement))?.is_some() {}
                    self.connection.changes() as usize
                };
                debug!(affected, "statement executed");
                Ok(Execution::Affected(affected))
            }
        }
    }

    /// Prepares `sql`, which must hold exactly one statement.
    ///
    /// Trailing semicolons, whitespace and comments are allowed.
    fn prepare_single(&self, sql: &str) -> Result<Statement<'a>> {
        let mut batch = Batch::new(self.connection, sql);
        let stmt = batch
            .next()
            .map_err(|e| AdminError::driver(e, sql))?
            .ok_or(AdminError::EmptyStatement)?;
        match batch.next() {
            Ok(None) => Ok(stmt),
            _ => Err(AdminError::Driver {
                message: "only one statement is accepted per execution".to_string(),
                sql: sql.to_string(),
            }),
        }
    }

    /// Runs a row-producing statement and returns all of its rows without
    /// touching any model.
    pub fn fetch(&self, sql: &str) -> Result<TabularResult> {
        let mut stmt = self.prepare_single(sql)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = stmt.column_count();

        let rows = stmt
            .query_map([], |row| {
                (0..column_count)
                    .map(|i| row.get_ref(i).map(CellValue::from))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(|e| AdminError::driver(e, sql))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| AdminError::driver(e, sql))?;

        TabularResult::new(columns, rows)
    }
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(f) => CellValue::Real(f),
            ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            CellValue::Null => ValueRef::Null,
            CellValue::Integer(i) => ValueRef::Integer(*i),
            CellValue::Real(f) => ValueRef::Real(*f),
            CellValue::Text(t) => ValueRef::Text(t.as_bytes()),
            CellValue::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}
