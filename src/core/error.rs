/// dbadmin Error Module
///
/// This module defines the error taxonomy shared by every layer of the
/// engine. Errors are structured values: a kind, a human-readable detail
/// and, where one exists, the offending statement text.
use thiserror::Error;

/// Error type for every engine operation.
///
/// None of these are retried automatically; each one is actionable by the
/// caller (fix the SQL, pick another table, reconnect).
#[derive(Error, Debug)]
pub enum AdminError {
    /// The submitted statement was blank after trimming
    #[error("Cannot execute an empty SQL statement")]
    EmptyStatement,

    /// Connection, syntax or permission failure reported by the database
    #[error("Database error: {message} (SQL: {sql})")]
    Driver {
        /// The driver's message, verbatim
        message: String,
        /// The statement that failed, verbatim
        sql: String,
    },

    /// Table, columns or primary key could not be resolved
    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// Result-model access outside the current bounds
    #[error("Cell ({row}, {col}) is out of range for a {rows}x{cols} result")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A batch stopped at record `index` and was rolled back
    #[error(
        "Batch failed at record {index} after {succeeded} of {attempted} records; rolled back: {message} (SQL: {sql})"
    )]
    PartialBatchFailure {
        index: usize,
        attempted: usize,
        succeeded: usize,
        message: String,
        /// The statement the failing record was bound to
        sql: String,
    },

    /// A row whose width does not match the column list
    #[error("Row {row} has {found} cells, expected {expected}")]
    RowShape {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A table-scoped operation was requested with no table selected
    #[error("No active table - browse a table first")]
    NoActiveTable,

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Presentation errors (unknown export format and the like)
    #[error("UI error: {0}")]
    Ui(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdminError {
    /// Wraps a driver error together with the statement that produced it.
    pub fn driver(err: rusqlite::Error, sql: impl Into<String>) -> Self {
        AdminError::Driver {
            message: err.to_string(),
            sql: sql.into(),
        }
    }

    /// Returns the offending statement text, if this error carries one.
    pub fn sql(&self) -> Option<&str> {
        match self {
            AdminError::Driver { sql, .. } | AdminError::PartialBatchFailure { sql, .. } => {
                Some(sql)
            }
            _ => None,
        }
    }
}

/// Type alias for Result to use AdminError as the error type.
pub type Result<T> = std::result::Result<T, AdminError>;
