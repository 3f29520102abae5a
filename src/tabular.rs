//! Tabular Result Model
//!
//! The in-memory grid bound from a query's result set: column names in
//! projection order and rows of dynamically typed cells. A `ResultModel`
//! holds the current grid as an immutable snapshot that is swapped whole on
//! every execution, so readers never observe a half-replaced result.

use crate::codec::{self, Dialect};
use crate::core::{AdminError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A single cell value.
///
/// Cells keep the storage class the database reported; conversion to text
/// is lazy (`as_text`).
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Text used for display, export and clipboard copy. `NULL` renders empty.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CellValue::Null => Cow::Borrowed(""),
            CellValue::Integer(i) => Cow::Owned(i.to_string()),
            CellValue::Real(f) => Cow::Owned(f.to_string()),
            CellValue::Text(t) => Cow::Borrowed(t),
            CellValue::Blob(b) => Cow::Owned(format!("<BLOB: {} bytes>", b.len())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            other => serde_json::Value::String(other.as_text().into_owned()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

/// An immutable grid: column names plus rows aligned positionally with them.
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TabularResult {
    /// Builds a result, rejecting any row whose width differs from the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(AdminError::RowShape {
                row,
                expected: columns.len(),
                found: cells.len(),
            });
        }
        Ok(TabularResult { columns, rows })
    }

    /// Builds a result of text cells.
    pub fn from_text_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<S>>) -> Result<Self> {
        TabularResult::new(
            columns.into_iter().map(Into::into).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(|s| CellValue::Text(s.into())).collect())
                .collect(),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cell at (`row`, `col`), or `OutOfRange`.
    pub fn value_at(&self, row: usize, col: usize) -> Result<&CellValue> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .ok_or_else(|| self.out_of_range(row, col))
    }

    /// Returns the label of column `col`.
    ///
    /// The label doubles as the candidate column identifier when a write
    /// needs to locate a column in the result.
    pub fn header_name(&self, col: usize) -> Result<&str> {
        self.columns
            .get(col)
            .map(String::as_str)
            .ok_or_else(|| self.out_of_range(0, col))
    }

    /// Position of the first column named `name` (ASCII case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    fn out_of_range(&self, row: usize, col: usize) -> AdminError {
        AdminError::OutOfRange {
            row,
            col,
            rows: self.row_count(),
            cols: self.column_count(),
        }
    }

    /// Renders the grid as a simple string with headers and rows.
    pub fn render(&self) -> String {
        let mut output = String::new();
        if !self.columns.is_empty() {
            output.push_str(&self.columns.join(" | "));
            output.push('\n');
            let underline: Vec<String> = self
                .columns
                .iter()
                .map(|h| "-".repeat(h.len() + 2))
                .collect();
            output.push_str(&underline.join("-|-"));
            output.push('\n');
        }
        for row in &self.rows {
            let row_content: Vec<Cow<'_, str>> = row.iter().map(CellValue::as_text).collect();
            output.push_str(&row_content.join(" | "));
            output.push('\n');
        }
        output
    }

    /// Exports the grid data to a specified format.
    /// Supported formats: CSV, TSV (clipboard), JSON, Markdown.
    pub fn export(&self, format: &str) -> Result<String> {
        match format.to_lowercase().as_str() {
            "csv" => Ok(codec::encode_block(self, &Dialect::CSV)),
            "tsv" | "clipboard" => Ok(codec::encode_block(self, &Dialect::CLIPBOARD)),
            "json" => self.export_to_json(),
            "markdown" => Ok(self.export_to_markdown()),
            _ => Err(AdminError::Ui(format!(
                "Unsupported export format: '{}'. Supported formats: csv, tsv, json, markdown",
                format
            ))),
        }
    }

    fn export_to_json(&self) -> Result<String> {
        let rows: Vec<BTreeMap<&str, serde_json::Value>> = self
            .rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter().map(CellValue::to_json))
                    .collect()
            })
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }

    fn export_to_markdown(&self) -> String {
        let mut output = String::new();
        if self.columns.is_empty() {
            return output;
        }
        output.push_str(&self.columns.join(" | "));
        output.push('\n');
        let underline: Vec<String> = self.columns.iter().map(|h| "-".repeat(h.len())).collect();
        output.push_str(&underline.join(" | "));
        output.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|cell| cell.as_text().replace('|', "\\|"))
                .collect();
            output.push_str(&cells.join(" | "));
            output.push('\n');
        }
        output
    }
}

/// Holder of the current result.
///
/// `replace` swaps the whole snapshot under a single write; readers clone the
/// `Arc` and keep a consistent view for as long as they need it.
#[derive(Debug, Default)]
pub struct ResultModel {
    current: RwLock<Arc<TabularResult>>,
}

impl ResultModel {
    pub fn new() -> Self {
        ResultModel::default()
    }

    /// The current result. Later replacements do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<TabularResult> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Validates and installs a new result built from `columns` and `rows`.
    pub fn replace(&self, columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Arc<TabularResult>> {
        let result = Arc::new(TabularResult::new(columns, rows)?);
        self.install(Arc::clone(&result));
        Ok(result)
    }

    /// Installs an already-built result.
    pub fn install(&self, result: Arc<TabularResult>) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = result;
    }

    /// Drops the current result (disconnect).
    pub fn clear(&self) {
        self.install(Arc::new(TabularResult::default()));
    }

    pub fn column_count(&self) -> usize {
        self.snapshot().column_count()
    }

    pub fn row_count(&self) -> usize {
        self.snapshot().row_count()
    }

    pub fn value_at(&self, row: usize, col: usize) -> Result<CellValue> {
        self.snapshot().value_at(row, col).cloned()
    }

    pub fn header_name(&self, col: usize) -> Result<String> {
        self.snapshot().header_name(col).map(str::to_string)
    }
}
