//! Bulk Mutation Engine
//!
//! Batch insert, single-row insert, multi-row delete and cell updates against
//! one table.
//! Every operation runs inside a single transaction: the first failing
//! record rolls the whole batch back and stops processing, so a failed
//! batch never leaves rows of its own behind.

use crate::codec::ParsedRecord;
use crate::core::db::schema::{quote_identifier, TableSchema};
use crate::core::{AdminError, Result};
use crate::tabular::{CellValue, TabularResult};
use rusqlite::{params, params_from_iter, Connection, Transaction};
use tracing::{debug, info, warn};

/// How field text is bound on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOptions {
    /// Strip surrounding whitespace from every field before binding
    pub trim_values: bool,
}

impl Default for InsertOptions {
    fn default() -> Self {
        InsertOptions { trim_values: true }
    }
}

/// The record that stopped a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Zero-based position of the record or row in the input
    pub index: usize,
    /// Driver message
    pub message: String,
    /// Statement that failed
    pub sql: String,
}

/// A pending change to one cell, keyed on its row's primary-key value
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    /// Primary-key value of the edited row, as loaded
    pub key: CellValue,
    /// Edited column
    pub column: String,
    /// New value
    pub value: CellValue,
}

/// Counts of a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cause: Option<BatchFailure>,
}

impl BatchOutcome {
    fn completed(count: usize) -> Self {
        BatchOutcome {
            attempted: count,
            succeeded: count,
            failed: 0,
            cause: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.cause.is_none()
    }

    /// Turns a rolled-back batch into `PartialBatchFailure`.
    pub fn into_result(self) -> Result<Self> {
        match self.cause {
            None => Ok(self),
            Some(cause) => Err(AdminError::PartialBatchFailure {
                index: cause.index,
                attempted: self.attempted,
                succeeded: self.succeeded,
                message: cause.message,
                sql: cause.sql,
            }),
        }
    }
}

/// `INSERT` covering the first `width` columns of `schema`, with positional
/// placeholders. Columns past `width` are left to their defaults.
pub fn insert_statement(schema: &TableSchema, width: usize) -> String {
    let table = quote_identifier(&schema.table);
    if width == 0 {
        return format!("INSERT INTO {} DEFAULT VALUES", table);
    }

    let columns: Vec<String> = schema.columns[..width]
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect();
    let placeholders: Vec<String> = (1..=width).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// `DELETE` of one row keyed on `key_column`
pub fn delete_statement(table: &str, key_column: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_identifier(table),
        quote_identifier(key_column)
    )
}

/// `UPDATE` of one column of one row keyed on `key_column`
pub fn update_statement(table: &str, column: &str, key_column: &str) -> String {
    format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        quote_identifier(table),
        quote_identifier(column),
        quote_identifier(key_column)
    )
}

/// The single primary-key column row edits are keyed on.
///
/// # Errors
///
/// `SchemaUnavailable` when the table has no key or a composite one.
pub fn key_column(schema: &TableSchema) -> Result<&str> {
    schema.primary_key.as_deref().ok_or_else(|| {
        AdminError::SchemaUnavailable(format!(
            "table '{}' has no single-column primary key; row editing is unsupported",
            schema.table
        ))
    })
}

/// Inserts `records` into `schema.table` as one transaction.
///
/// Fields map to columns by position. A short record binds only the columns
/// it covers; extra fields are ignored. Statements are prepared once per
/// shape and reused from the connection's statement cache.
///
/// A failing record is reported in the outcome (not as `Err`); `Err` is
/// reserved for failures of the transaction itself.
pub fn insert_records(
    conn: &mut Connection,
    schema: &TableSchema,
    records: &[ParsedRecord],
    options: InsertOptions,
) -> Result<BatchOutcome> {
    if schema.columns.is_empty() {
        return Err(AdminError::SchemaUnavailable(format!(
            "table '{}' has no columns",
            schema.table
        )));
    }

    info!(table = %schema.table, records = records.len(), "batch insert");
    run_batch(conn, records.len(), |tx, index| {
        let record = &records[index];
        let width = record.len().min(schema.columns.len());
        let sql = insert_statement(schema, width);
        let values = record.fields()[..width].iter().map(|field| {
            if options.trim_values {
                field.trim()
            } else {
                field.as_str()
            }
        });

        let mut stmt = tx.prepare_cached(&sql).map_err(|e| failure(index, e, &sql))?;
        stmt.execute(params_from_iter(values))
            .map_err(|e| failure(index, e, &sql))?;
        Ok(())
    })
}

/// Inserts a single interactively supplied record.
pub fn insert_row(
    conn: &mut Connection,
    schema: &TableSchema,
    record: &ParsedRecord,
    options: InsertOptions,
) -> Result<BatchOutcome> {
    insert_records(conn, schema, std::slice::from_ref(record), options)
}

/// Deletes the given rows of `result` from `schema.table` as one transaction.
///
/// Each row is keyed on its primary-key cell.
///
/// # Errors
///
/// `SchemaUnavailable` when the table has no single-column primary key or the
/// key column is not part of `result`; `OutOfRange` for a row index outside
/// `result`. Both are checked before the transaction opens.
pub fn delete_rows(
    conn: &mut Connection,
    schema: &TableSchema,
    result: &TabularResult,
    rows: &[usize],
) -> Result<BatchOutcome> {
    let key_column = key_column(schema)?;
    let key_index = result.column_index(key_column).ok_or_else(|| {
        AdminError::SchemaUnavailable(format!(
            "primary key column '{}' is not part of the current result",
            key_column
        ))
    })?;
    let keys: Vec<&CellValue> = rows
        .iter()
        .map(|&row| result.value_at(row, key_index))
        .collect::<Result<_>>()?;

    let sql = delete_statement(&schema.table, key_column);
    info!(table = %schema.table, rows = keys.len(), "batch delete");
    run_batch(conn, keys.len(), |tx, index| {
        let mut stmt = tx.prepare_cached(&sql).map_err(|e| failure(index, e, &sql))?;
        let deleted = stmt
            .execute(params![keys[index]])
            .map_err(|e| failure(index, e, &sql))?;
        debug!(index, deleted, "row delete");
        Ok(())
    })
}

/// Applies `edits` to `schema.table` as one transaction, one `UPDATE` per
/// edit in the given order.
///
/// An edit whose key no longer matches any row fails the batch, so edits
/// never vanish silently.
pub fn update_cells(
    conn: &mut Connection,
    schema: &TableSchema,
    edits: &[CellEdit],
) -> Result<BatchOutcome> {
    let key_column = key_column(schema)?;
    if let Some(edit) = edits.iter().find(|e| schema.column(&e.column).is_none()) {
        return Err(AdminError::SchemaUnavailable(format!(
            "table '{}' has no column '{}'",
            schema.table, edit.column
        )));
    }

    info!(table = %schema.table, edits = edits.len(), "batch update");
    run_batch(conn, edits.len(), |tx, index| {
        let edit = &edits[index];
        let sql = update_statement(&schema.table, &edit.column, key_column);
        let mut stmt = tx.prepare_cached(&sql).map_err(|e| failure(index, e, &sql))?;
        let updated = stmt
            .execute(params![edit.value, edit.key])
            .map_err(|e| failure(index, e, &sql))?;
        if updated == 0 {
            return Err(BatchFailure {
                index,
                message: format!("no row with {} = {} exists any more", key_column, edit.key),
                sql,
            });
        }
        Ok(())
    })
}

/// Runs `step` for indices `0..total` inside one transaction.
///
/// Stops at the first failing step and rolls back; commits once when every
/// step succeeded.
fn run_batch<F>(conn: &mut Connection, total: usize, mut step: F) -> Result<BatchOutcome>
where
    F: FnMut(&Transaction<'_>, usize) -> std::result::Result<(), BatchFailure>,
{
    let tx = conn
        .transaction()
        .map_err(|e| AdminError::driver(e, "BEGIN"))?;

    for index in 0..total {
        if let Err(cause) = step(&tx, index) {
            warn!(
                index,
                succeeded = index,
                attempted = total,
                error = %cause.message,
                "batch step failed, rolling back"
            );
            tx.rollback().map_err(|e| AdminError::driver(e, "ROLLBACK"))?;
            return Ok(BatchOutcome {
                attempted: total,
                succeeded: index,
                failed: 1,
                cause: Some(cause),
            });
        }
    }

    tx.commit().map_err(|e| AdminError::driver(e, "COMMIT"))?;
    debug!(total, "batch committed");
    Ok(BatchOutcome::completed(total))
}

fn failure(index: usize, err: rusqlite::Error, sql: &str) -> BatchFailure {
    BatchFailure {
        index,
        message: err.to_string(),
        sql: sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::schema::SchemaIntrospector;
    use crate::core::db::query::QueryGateway;

    fn setup() -> (Connection, TableSchema) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE people (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE,
                city TEXT DEFAULT 'unknown'
            );",
        )
        .unwrap();
        let schema = SchemaIntrospector::new(&conn).resolve_schema("people").unwrap();
        (conn, schema)
    }

    fn record(fields: &[&str]) -> ParsedRecord {
        fields.iter().copied().collect()
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM people", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_statement_shapes() {
        let (_conn, schema) = setup();
        assert_eq!(
            insert_statement(&schema, 2),
            r#"INSERT INTO "people" ("id", "name") VALUES (?1, ?2)"#
        );
        assert_eq!(insert_statement(&schema, 0), r#"INSERT INTO "people" DEFAULT VALUES"#);
        assert_eq!(
            delete_statement("people", "id"),
            r#"DELETE FROM "people" WHERE "id" = ?1"#
        );
    }

    #[test]
    fn test_insert_all_records() {
        let (mut conn, schema) = setup();
        let records = vec![
            record(&["1", "Alice", "alice@example.com", "Paris"]),
            record(&["2", " Bob ", "bob@example.com", "Oslo"]),
        ];

        let outcome = insert_records(&mut conn, &schema, &records, InsertOptions::default()).unwrap();
        assert_eq!(outcome, BatchOutcome::completed(2));
        assert!(outcome.is_success());
        assert_eq!(count(&conn), 2);

        let name: String = conn
            .query_row("SELECT name FROM people WHERE id = 2", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Bob");
    }

    #[test]
    fn test_failing_record_rolls_back_everything() {
        let (mut conn, schema) = setup();
        let records = vec![
            record(&["1", "a", "a@x"]),
            record(&["2", "b", "b@x"]),
            record(&["3", "c", "a@x"]),
            record(&["4", "d", "d@x"]),
            record(&["5", "e", "e@x"]),
        ];

        let outcome = insert_records(&mut conn, &schema, &records, InsertOptions::default()).unwrap();
        assert_eq!(outcome.attempted, 5);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.failed, 1);
        let cause = outcome.cause.clone().unwrap();
        assert_eq!(cause.index, 2);
        assert!(cause.message.contains("UNIQUE"));
        assert_eq!(count(&conn), 0);

        match outcome.into_result() {
            Err(AdminError::PartialBatchFailure { index, attempted, succeeded, sql, .. }) => {
                assert_eq!((index, attempted, succeeded), (2, 5, 2));
                assert_eq!(sql, r#"INSERT INTO "people" ("id", "name", "email") VALUES (?1, ?2, ?3)"#);
            }
            other => panic!("Expected PartialBatchFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_short_records_use_defaults_and_long_records_are_cut() {
        let (mut conn, schema) = setup();
        let records = vec![
            record(&["1", "Short"]),
            record(&["2", "Long", "l@x", "Rome", "ignored", "also ignored"]),
        ];

        let outcome = insert_records(&mut conn, &schema, &records, InsertOptions::default()).unwrap();
        assert!(outcome.is_success());

        let cities = QueryGateway::new(&conn)
            .fetch("SELECT city, email FROM people ORDER BY id")
            .unwrap();
        assert_eq!(cities.value_at(0, 0).unwrap(), &CellValue::from("unknown"));
        assert_eq!(cities.value_at(0, 1).unwrap(), &CellValue::Null);
        assert_eq!(cities.value_at(1, 0).unwrap(), &CellValue::from("Rome"));
    }

    #[test]
    fn test_trim_can_be_disabled() {
        let (mut conn, schema) = setup();
        let options = InsertOptions { trim_values: false };
        insert_row(&mut conn, &schema, &record(&["1", "  padded  "]), options).unwrap();

        let name: String = conn
            .query_row("SELECT name FROM people", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "  padded  ");
    }

    #[test]
    fn test_empty_batch_commits_nothing() {
        let (mut conn, schema) = setup();
        let outcome = insert_records(&mut conn, &schema, &[], InsertOptions::default()).unwrap();
        assert_eq!(outcome, BatchOutcome::completed(0));
    }

    #[test]
    fn test_delete_rows_by_primary_key() {
        let (mut conn, schema) = setup();
        conn.execute_batch(
            "INSERT INTO people (id, name) VALUES (10, 'a'), (20, 'b'), (30, 'c');",
        )
        .unwrap();
        let result = QueryGateway::new(&conn)
            .fetch("SELECT name, id FROM people ORDER BY id")
            .unwrap();

        let outcome = delete_rows(&mut conn, &schema, &result, &[0, 2]).unwrap();
        assert_eq!(outcome, BatchOutcome::completed(2));

        let left: i64 = conn
            .query_row("SELECT id FROM people", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 20);
    }

    #[test]
    fn test_delete_rejects_bad_rows_before_touching_data() {
        let (mut conn, schema) = setup();
        conn.execute("INSERT INTO people (id, name) VALUES (1, 'a')", []).unwrap();
        let result = QueryGateway::new(&conn).fetch("SELECT * FROM people").unwrap();

        let err = delete_rows(&mut conn, &schema, &result, &[0, 1]).unwrap_err();
        assert!(matches!(err, AdminError::OutOfRange { row: 1, .. }));
        assert_eq!(count(&conn), 1);

        let without_key = QueryGateway::new(&conn).fetch("SELECT name FROM people").unwrap();
        let err = delete_rows(&mut conn, &schema, &without_key, &[0]).unwrap_err();
        assert!(matches!(err, AdminError::SchemaUnavailable(_)));
    }

    #[test]
    fn test_delete_without_primary_key_is_unsupported() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE log (line TEXT); INSERT INTO log VALUES ('x');")
            .unwrap();
        let schema = SchemaIntrospector::new(&conn).resolve_schema("log").unwrap();
        let result = QueryGateway::new(&conn).fetch("SELECT * FROM log").unwrap();

        match delete_rows(&mut conn, &schema, &result, &[0]) {
            Err(AdminError::SchemaUnavailable(msg)) => assert!(msg.contains("unsupported")),
            other => panic!("Expected SchemaUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_failure_rolls_back() {
        let (mut conn, schema) = setup();
        conn.execute_batch(
            "
            CREATE TABLE orders (id INTEGER PRIMARY KEY, person_id INTEGER REFERENCES people(id));
            PRAGMA foreign_keys = ON;
            INSERT INTO people (id, name) VALUES (1, 'a'), (2, 'b');
            INSERT INTO orders (id, person_id) VALUES (1, 2);
        ",
        )
        .unwrap();
        let result = QueryGateway::new(&conn)
            .fetch("SELECT * FROM people ORDER BY id")
            .unwrap();

        let outcome = delete_rows(&mut conn, &schema, &result, &[0, 1]).unwrap();
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.cause.as_ref().map(|c| c.index), Some(1));
        assert_eq!(count(&conn), 2);
    }

    fn edit(key: i64, column: &str, value: &str) -> CellEdit {
        CellEdit {
            key: CellValue::Integer(key),
            column: column.to_string(),
            value: CellValue::from(value),
        }
    }

    #[test]
    fn test_update_cells_applies_every_edit() {
        let (mut conn, schema) = setup();
        conn.execute_batch("INSERT INTO people (id, name) VALUES (1, 'a'), (2, 'b');")
            .unwrap();
        assert_eq!(
            update_statement("people", "name", "id"),
            r#"UPDATE "people" SET "name" = ?1 WHERE "id" = ?2"#
        );

        let edits = vec![edit(1, "name", "Ann"), edit(2, "city", "Lima"), edit(1, "id", "10")];
        let outcome = update_cells(&mut conn, &schema, &edits).unwrap();
        assert_eq!(outcome, BatchOutcome::completed(3));

        let rows = QueryGateway::new(&conn)
            .fetch("SELECT id, name, city FROM people ORDER BY id")
            .unwrap();
        assert_eq!(rows.value_at(0, 0).unwrap(), &CellValue::Integer(2));
        assert_eq!(rows.value_at(0, 2).unwrap(), &CellValue::from("Lima"));
        assert_eq!(rows.value_at(1, 0).unwrap(), &CellValue::Integer(10));
        assert_eq!(rows.value_at(1, 1).unwrap(), &CellValue::from("Ann"));
    }

    #[test]
    fn test_update_of_missing_row_rolls_back() {
        let (mut conn, schema) = setup();
        conn.execute_batch("INSERT INTO people (id, name) VALUES (1, 'a');")
            .unwrap();

        let edits = vec![edit(1, "name", "changed"), edit(99, "name", "ghost")];
        let outcome = update_cells(&mut conn, &schema, &edits).unwrap();
        assert_eq!((outcome.succeeded, outcome.failed), (1, 1));
        let cause = outcome.cause.unwrap();
        assert_eq!(cause.index, 1);
        assert!(cause.message.contains("99"));

        let name: String = conn
            .query_row("SELECT name FROM people WHERE id = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn test_update_rejects_unknown_column() {
        let (mut conn, schema) = setup();
        let err = update_cells(&mut conn, &schema, &[edit(1, "nickname", "x")]).unwrap_err();
        assert!(matches!(err, AdminError::SchemaUnavailable(_)));
    }
}
