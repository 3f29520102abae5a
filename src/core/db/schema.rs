/// Schema Introspection Module
///
/// Resolves a table's column list and primary key from live database
/// metadata. Nothing here is cached: every insert, paste or delete resolves
/// the schema again so a concurrent ALTER is picked up.

use crate::core::{AdminError, Result};
use rusqlite::{Connection, Row};
use tracing::debug;

/// A column as declared in the table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "INTEGER", "TEXT"); empty when undeclared
    pub declared_type: String,
    /// Whether the column is declared NOT NULL
    pub not_null: bool,
    /// Default value expression (if any)
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it
    pub pk_ordinal: u32,
}

impl ColumnDef {
    /// Creates a ColumnDef from a `pragma_table_info` result row
    fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ColumnDef {
            name: row.get(1)?,
            declared_type: row.get(2)?,
            not_null: row.get(3)?,
            default_value: row.get(4)?,
            pk_ordinal: row.get(5)?,
        })
    }
}

/// Column layout and key of one table, resolved on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as requested
    pub table: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Single-column primary key, `None` when absent or composite
    pub primary_key: Option<String>,
}

impl TableSchema {
    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks a column up by name, ignoring ASCII case
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Metadata queries against a live connection
#[derive(Debug, Clone, Copy)]
pub struct SchemaIntrospector<'a> {
    connection: &'a Connection,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        SchemaIntrospector { connection }
    }

    /// Ordered column list of `table`.
    ///
    /// # Errors
    ///
    /// `SchemaUnavailable` if the table does not exist or metadata cannot be read.
    pub fn resolve_columns(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let columns = self.table_info(table)?;
        if columns.is_empty() {
            return Err(AdminError::SchemaUnavailable(format!(
                "table '{}' does not exist",
                table
            )));
        }
        Ok(columns)
    }

    /// The single primary-key column of `table`, if it has one.
    ///
    /// Tables without a declared key and tables with a composite key both
    /// resolve to `None`; callers must not guess a key column.
    pub fn resolve_primary_key(&self, table: &str) -> Result<Option<String>> {
        let columns = self.resolve_columns(table)?;
        Ok(primary_key_of(&columns))
    }

    /// Columns and primary key of `table` from a single metadata query
    pub fn resolve_schema(&self, table: &str) -> Result<TableSchema> {
        let columns = self.resolve_columns(table)?;
        let primary_key = primary_key_of(&columns);
        debug!(
            table,
            columns = columns.len(),
            primary_key = primary_key.as_deref().unwrap_or("<none>"),
            "resolved table schema"
        );
        Ok(TableSchema {
            table: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// User tables, sorted by name
    pub fn list_tables(&self) -> Result<Vec<String>> {
        const SQL: &str = "SELECT name FROM sqlite_master
             WHERE type='table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name";

        let mut stmt = self.connection.prepare(SQL).map_err(unavailable)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(names)
    }

    fn table_info(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let mut stmt = self
            .connection
            .prepare("SELECT * FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(unavailable)?;
        let columns = stmt
            .query_map([table], |row| ColumnDef::from_pragma_row(row))
            .map_err(unavailable)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(unavailable)?;
        Ok(columns)
    }
}

fn primary_key_of(columns: &[ColumnDef]) -> Option<String> {
    let mut keys = columns.iter().filter(|c| c.pk_ordinal > 0);
    match (keys.next(), keys.next()) {
        (Some(key), None) => Some(key.name.clone()),
        _ => None,
    }
}

fn unavailable(err: rusqlite::Error) -> AdminError {
    AdminError::SchemaUnavailable(err.to_string())
}

/// Quotes an identifier for use in generated SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
