/// Session Module
///
/// A `Session` is the explicit context every operation runs in: the single
/// open connection, the table currently being browsed (with its filter and
/// sort), the shared result model and the cell edits not yet submitted.
/// There is no global state, so several sessions can coexist.

use crate::bulk::{self, BatchOutcome, CellEdit, InsertOptions};
use crate::codec::{self, Dialect, ParsedRecord};
use crate::core::db::query::{Execution, QueryGateway};
use crate::core::db::schema::{quote_identifier, SchemaIntrospector, TableSchema};
use crate::core::{AdminError, Result};
use crate::tabular::{CellValue, ResultModel, TabularResult};
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The table being browsed and how it is narrowed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableView {
    /// Current table (None when showing an ad-hoc query only)
    pub table: Option<String>,
    /// Raw `WHERE` condition, without the keyword
    pub filter: Option<String>,
    /// Raw `ORDER BY` expression, without the keywords
    pub sort: Option<String>,
}

impl TableView {
    /// The `SELECT` that loads this view, if a table is set
    pub fn select_sql(&self) -> Option<String> {
        let table = self.table.as_deref()?;
        let mut sql = format!("SELECT * FROM {}", quote_identifier(table));
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(sort) = &self.sort {
            sql.push_str(" ORDER BY ");
            sql.push_str(sort);
        }
        Some(sql)
    }
}

/// Connection plus view state for one user of the engine
#[derive(Debug)]
pub struct Session {
    connection: Option<Connection>,
    path: Option<PathBuf>,
    view: TableView,
    results: Arc<ResultModel>,
    /// Result installed by the last view load; row edits apply only while
    /// the model still holds it
    loaded: Option<Arc<TabularResult>>,
    pending: Vec<CellEdit>,
    insert_options: InsertOptions,
}

impl Session {
    /// Opens the SQLite database at `path`
    ///
    /// # Returns
    ///
    /// A connected session, or `AdminError::Driver` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| AdminError::driver(e, format!("-- open {}", path.display())))?;
        info!(path = %path.display(), "connected");
        Session::with_connection(conn, Some(path.to_path_buf()))
    }

    /// Opens a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AdminError::driver(e, "-- open :memory:"))?;
        Session::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        const INIT_SQL: &str = "PRAGMA foreign_keys = ON;";
        conn.execute_batch(INIT_SQL)
            .map_err(|e| AdminError::driver(e, INIT_SQL))?;

        Ok(Session {
            connection: Some(conn),
            path,
            view: TableView::default(),
            results: Arc::new(ResultModel::new()),
            loaded: None,
            pending: Vec::new(),
            insert_options: InsertOptions::default(),
        })
    }

    /// Sets how imported and inserted field text is bound
    pub fn set_insert_options(&mut self, options: InsertOptions) {
        self.insert_options = options;
    }

    /// Closes the connection and drops the current result and view
    pub fn close(&mut self) -> Result<()> {
        self.forget_view();
        if let Some(conn) = self.connection.take() {
            conn.close()
                .map_err(|(_, e)| AdminError::driver(e, "-- close"))?;
            info!("disconnected");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Path of the open database file (None for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn view(&self) -> &TableView {
        &self.view
    }

    /// Shared handle to the result model, for readers on other threads
    pub fn results(&self) -> Arc<ResultModel> {
        Arc::clone(&self.results)
    }

    /// The current result snapshot
    pub fn current_result(&self) -> Arc<TabularResult> {
        self.results.snapshot()
    }

    fn connection(&self, sql: &str) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| not_connected(sql))
    }

    fn introspector(&self) -> Result<SchemaIntrospector<'_>> {
        self.connection
            .as_ref()
            .map(SchemaIntrospector::new)
            .ok_or_else(|| AdminError::SchemaUnavailable("no open connection".to_string()))
    }

    fn active_table(&self) -> Result<String> {
        self.view.table.clone().ok_or(AdminError::NoActiveTable)
    }

    /// The current result, provided it is the loaded view of the active
    /// table and not an ad-hoc query result
    fn view_result(&self) -> Result<Arc<TabularResult>> {
        self.active_table()?;
        let snapshot = self.results.snapshot();
        match &self.loaded {
            Some(loaded) if Arc::ptr_eq(loaded, &snapshot) => Ok(snapshot),
            _ => Err(AdminError::NoActiveTable),
        }
    }

    fn forget_view(&mut self) {
        if !self.pending.is_empty() {
            debug!(edits = self.pending.len(), "discarding pending edits");
        }
        self.view = TableView::default();
        self.loaded = None;
        self.pending.clear();
        self.results.clear();
    }

    // ---- Ad-hoc SQL -------------------------------------------------------

    /// Executes one statement through the query gateway.
    ///
    /// The result model is only replaced by row-producing statements.
    pub fn execute(&mut self, sql: &str) -> Result<Execution> {
        let conn = self.connection(sql.trim())?;
        QueryGateway::new(conn).execute(sql, &self.results)
    }

    /// Executes one statement and, if it mutated data, reloads the current
    /// table view. A view whose table no longer exists is dropped.
    pub fn execute_and_refresh(&mut self, sql: &str) -> Result<Execution> {
        let execution = self.execute(sql)?;
        if let (Execution::Affected(_), Some(table)) = (&execution, self.view.table.clone()) {
            if self.tables()?.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
                self.refresh()?;
            } else {
                debug!(table = %table, "current table is gone, clearing view");
                self.forget_view();
            }
        }
        Ok(execution)
    }

    // ---- Table browsing ---------------------------------------------------

    pub fn tables(&self) -> Result<Vec<String>> {
        self.introspector()?.list_tables()
    }

    /// Resolves the schema of `table` afresh
    pub fn schema(&self, table: &str) -> Result<TableSchema> {
        self.introspector()?.resolve_schema(table)
    }

    /// Makes `table` the current table (no filter, no sort) and loads it
    pub fn browse(&mut self, table: &str) -> Result<Arc<TabularResult>> {
        self.schema(table)?;
        let view = TableView {
            table: Some(table.to_string()),
            ..TableView::default()
        };
        self.load_view(view)
    }

    /// Applies a raw `WHERE` condition to the current table
    pub fn set_filter(&mut self, filter: Option<String>) -> Result<Arc<TabularResult>> {
        self.active_table()?;
        let view = TableView {
            filter: filter.filter(|f| !f.trim().is_empty()),
            ..self.view.clone()
        };
        self.load_view(view)
    }

    /// Applies a raw `ORDER BY` expression to the current table
    pub fn set_sort(&mut self, sort: Option<String>) -> Result<Arc<TabularResult>> {
        self.active_table()?;
        let view = TableView {
            sort: sort.filter(|s| !s.trim().is_empty()),
            ..self.view.clone()
        };
        self.load_view(view)
    }

    /// Drops filter and sort and reloads the current table
    pub fn reset_view(&mut self) -> Result<Arc<TabularResult>> {
        let view = TableView {
            table: Some(self.active_table()?),
            ..TableView::default()
        };
        self.load_view(view)
    }

    /// Reloads the current view
    pub fn refresh(&mut self) -> Result<Arc<TabularResult>> {
        self.active_table()?;
        self.load_view(self.view.clone())
    }

    /// Loads `view` and installs it only if the load succeeded
    fn load_view(&mut self, view: TableView) -> Result<Arc<TabularResult>> {
        let sql = view.select_sql().ok_or(AdminError::NoActiveTable)?;
        let result = Arc::new(QueryGateway::new(self.connection(&sql)?).fetch(&sql)?);
        self.results.install(Arc::clone(&result));
        if view.table != self.view.table && !self.pending.is_empty() {
            debug!(edits = self.pending.len(), "table changed, discarding pending edits");
            self.pending.clear();
        }
        self.loaded = Some(Arc::clone(&result));
        self.view = view;
        debug!(sql = %sql, rows = result.row_count(), "view loaded");
        Ok(result)
    }

    // ---- Bulk transfer ----------------------------------------------------

    /// Imports a CSV file into the current table
    pub fn import_csv(&mut self, path: impl AsRef<Path>) -> Result<BatchOutcome> {
        let text = fs::read_to_string(path.as_ref())?;
        info!(path = %path.as_ref().display(), "importing CSV");
        self.import_csv_text(&text)
    }

    /// Imports CSV text (first non-empty line is the header) into the current table
    pub fn import_csv_text(&mut self, text: &str) -> Result<BatchOutcome> {
        let records = codec::decode_block(text, &Dialect::CSV);
        self.insert_records(&records)
    }

    /// Inserts clipboard text (tab-separated, no header) into the current table
    pub fn paste(&mut self, text: &str) -> Result<BatchOutcome> {
        let records = codec::decode_block(text, &Dialect::CLIPBOARD);
        self.insert_records(&records)
    }

    /// Inserts one interactively entered record into the current table
    pub fn insert_row(&mut self, record: ParsedRecord) -> Result<BatchOutcome> {
        let table = self.active_table()?;
        let schema = self.schema(&table)?;
        let options = self.insert_options;
        let conn = self.connection_mut("INSERT")?;
        let outcome = bulk::insert_row(conn, &schema, &record, options)?.into_result()?;
        self.refresh_after_commit();
        Ok(outcome)
    }

    /// Deletes rows of the current table view, keyed on its primary key.
    ///
    /// Fails with `NoActiveTable` when the result model holds an ad-hoc query
    /// result instead of the table view.
    pub fn delete_rows(&mut self, rows: &[usize]) -> Result<BatchOutcome> {
        let table = self.active_table()?;
        let snapshot = self.view_result()?;
        let schema = self.schema(&table)?;
        let conn = self.connection_mut("DELETE")?;
        let outcome = bulk::delete_rows(conn, &schema, &snapshot, rows)?.into_result()?;
        self.refresh_after_commit();
        Ok(outcome)
    }

    fn insert_records(&mut self, records: &[ParsedRecord]) -> Result<BatchOutcome> {
        let table = self.active_table()?;
        let schema = self.schema(&table)?;
        let options = self.insert_options;
        let conn = self.connection_mut("INSERT")?;
        let outcome = bulk::insert_records(conn, &schema, records, options)?.into_result()?;
        self.refresh_after_commit();
        Ok(outcome)
    }

    /// Reloads the view after a committed batch. The batch stands even if
    /// the reload fails, so the failure is only logged.
    fn refresh_after_commit(&mut self) {
        if let Err(e) = self.refresh() {
            warn!(error = %e, "changes committed but the view could not be reloaded");
        }
    }

    // ---- Cell editing -----------------------------------------------------

    /// Records a new value for one cell of the current table view.
    ///
    /// Nothing is written until `submit_changes`. Editing the same cell
    /// twice keeps the last value.
    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<CellValue>) -> Result<()> {
        let table = self.active_table()?;
        let result = self.view_result()?;
        result.value_at(row, col)?;
        let schema = self.schema(&table)?;
        let key_column = bulk::key_column(&schema)?;
        let key_index = result.column_index(key_column).ok_or_else(|| {
            AdminError::SchemaUnavailable(format!(
                "primary key column '{}' is not part of the current result",
                key_column
            ))
        })?;

        let edit = CellEdit {
            key: result.value_at(row, key_index)?.clone(),
            column: result.header_name(col)?.to_string(),
            value: value.into(),
        };
        debug!(row, column = %edit.column, "cell edited");
        match self
            .pending
            .iter_mut()
            .find(|e| e.key == edit.key && e.column == edit.column)
        {
            Some(existing) => existing.value = edit.value,
            None => self.pending.push(edit),
        }
        Ok(())
    }

    /// Edits recorded since the last submit or revert
    pub fn pending_edits(&self) -> &[CellEdit] {
        &self.pending
    }

    /// Writes every pending edit as one transaction.
    ///
    /// On success the edits are cleared and the view reloaded. On failure
    /// nothing is written and the edits stay pending.
    pub fn submit_changes(&mut self) -> Result<BatchOutcome> {
        let table = self.active_table()?;
        if self.pending.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let schema = self.schema(&table)?;
        let key_column = bulk::key_column(&schema)?.to_string();

        // Edits are keyed on the loaded key, so key changes go last
        let mut edits = self.pending.clone();
        edits.sort_by_key(|e| e.column.eq_ignore_ascii_case(&key_column));

        let conn = self.connection_mut("UPDATE")?;
        let outcome = bulk::update_cells(conn, &schema, &edits)?.into_result()?;
        self.pending.clear();
        info!(table = %table, edits = outcome.succeeded, "changes submitted");
        self.refresh_after_commit();
        Ok(outcome)
    }

    /// Drops every pending edit; returns how many were dropped
    pub fn revert_changes(&mut self) -> Result<usize> {
        self.active_table()?;
        let dropped = self.pending.len();
        self.pending.clear();
        debug!(dropped, "changes reverted");
        Ok(dropped)
    }

    fn connection_mut(&mut self, sql: &str) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or_else(|| not_connected(sql))
    }

    /// Writes the current result to `path` as CSV; returns the number of data rows
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let snapshot = self.results.snapshot();
        fs::write(path.as_ref(), codec::encode_block(&snapshot, &Dialect::CSV))?;
        info!(path = %path.as_ref().display(), rows = snapshot.row_count(), "exported CSV");
        Ok(snapshot.row_count())
    }

    /// Clipboard text for a selection of `(row, col)` cells of the current result
    pub fn copy_selection(&self, cells: &[(usize, usize)]) -> Result<String> {
        codec::encode_selection(&self.results.snapshot(), cells)
    }
}

fn not_connected(sql: &str) -> AdminError {
    AdminError::Driver {
        message: "no open database connection".to_string(),
        sql: sql.to_string(),
    }
}
