/// # Test Utilities Module
///
/// Shared fixtures for unit tests: an isolated in-memory session with a
/// sample schema, assertion helpers for `AdminError` and generators for
/// bulk-transfer input.

use crate::core::db::Session;
use crate::core::{AdminError, Result};

/// Schema used by the sample fixture.
///
/// `users` and `posts` carry single-column primary keys; `post_tags` has a
/// composite key and so cannot be edited row by row.
pub const SAMPLE_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL,
        active BOOLEAN DEFAULT 1
    );

    CREATE TABLE posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        body TEXT,
        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
    );

    CREATE TABLE post_tags (
        post_id INTEGER NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (post_id, tag)
    );
";

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub name: String,
    pub session: Session,
}

impl DatabaseFixture {
    /// Create an empty in-memory database
    pub fn new(name: &str) -> Result<Self> {
        Ok(DatabaseFixture {
            name: name.to_string(),
            session: Session::open_in_memory()?,
        })
    }

    /// Create fixture with the sample schema and a few rows
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let mut fixture = Self::new(name)?;
        fixture.setup_standard_schema()?;
        fixture.populate_sample_data()?;
        Ok(fixture)
    }

    pub fn setup_standard_schema(&mut self) -> Result<()> {
        for statement in SAMPLE_SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            self.session.execute(statement)?;
        }
        Ok(())
    }

    /// Inserts three users and their posts through ordinary SQL
    pub fn populate_sample_data(&mut self) -> Result<()> {
        for sql in [
            "INSERT INTO users (username, email) VALUES ('alice', 'alice@example.com')",
            "INSERT INTO users (username, email) VALUES ('bob', 'bob@example.com')",
            "INSERT INTO users (username, email, active) VALUES ('charlie', 'charlie@example.com', 0)",
            "INSERT INTO posts (user_id, title, body) VALUES (1, 'Welcome', 'First post')",
            "INSERT INTO posts (user_id, title, body) VALUES (2, 'Trip, part 1', 'Paris')",
            "INSERT INTO post_tags VALUES (1, 'intro'), (2, 'travel')",
        ] {
            self.session.execute(sql)?;
        }
        Ok(())
    }

    /// Number of rows currently stored in `table`
    pub fn count(&mut self, table: &str) -> i64 {
        let result = self
            .session
            .execute(&format!("SELECT COUNT(*) FROM {}", table))
            .expect("count query failed");
        match result {
            crate::core::db::Execution::Rows(rows) => match rows.value_at(0, 0) {
                Ok(crate::tabular::CellValue::Integer(n)) => *n,
                other => panic!("unexpected count cell {:?}", other),
            },
            other => panic!("count query returned {:?}", other),
        }
    }
}

/// Error testing utilities specific to AdminError patterns
pub mod error_testing {
    use super::AdminError;

    /// Test that a result is an error matching `expected_variant`
    pub fn assert_error_type<T: std::fmt::Debug>(
        result: &std::result::Result<T, AdminError>,
        expected_variant: fn(&AdminError) -> bool,
        context: &str,
    ) {
        match result {
            Err(err) => assert!(expected_variant(err), "unexpected error {:?} in {}", err, context),
            Ok(value) => panic!("Expected error but got Ok({:?}) in {}", value, context),
        }
    }

    /// Test that the error message mentions `fragment` (case-insensitive)
    pub fn assert_error_mentions<T>(
        result: &std::result::Result<T, AdminError>,
        fragment: &str,
        context: &str,
    ) {
        match result {
            Ok(_) => panic!("Expected AdminError but got Ok in {}", context),
            Err(e) => {
                let message = e.to_string();
                assert!(
                    message.to_lowercase().contains(&fragment.to_lowercase()),
                    "Expected '{}' in error message '{}' context: {}",
                    fragment,
                    message,
                    context
                );
            }
        }
    }
}

/// Input generators for bulk-transfer tests
pub mod generators {
    /// CSV document for `users`: a header then `rows` records
    pub fn users_csv(rows: usize) -> String {
        let mut csv = String::from("id,username,email\n");
        for i in 0..rows {
            csv.push_str(&format!("{},user{},\"user{}@example.com\"\n", 100 + i, i, i));
        }
        csv
    }

    /// Clipboard block for `users` whose values need no quoting
    pub fn users_clipboard(rows: usize) -> String {
        (0..rows)
            .map(|i| format!("{}\tpasted{}\tpasted{}@example.com", 200 + i, i, i))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::error_testing::*;
    use super::*;

    #[test]
    fn test_database_fixture_creation() {
        let fixture = DatabaseFixture::new("test_create").unwrap();
        assert_eq!(fixture.name, "test_create");
        assert!(fixture.session.tables().unwrap().is_empty());
    }

    #[test]
    fn test_sample_data_fixture() {
        let mut fixture = DatabaseFixture::with_sample_data("test_sample").unwrap();
        assert_eq!(fixture.session.tables().unwrap(), ["post_tags", "posts", "users"]);
        assert_eq!(fixture.count("users"), 3);
        assert_eq!(fixture.count("posts"), 2);
    }

    #[test]
    fn test_generated_csv_imports() {
        let mut fixture = DatabaseFixture::with_sample_data("test_generated").unwrap();
        fixture.session.browse("users").unwrap();

        let outcome = fixture.session.import_csv_text(&generators::users_csv(4)).unwrap();
        assert_eq!(outcome.succeeded, 4);
        let outcome = fixture.session.paste(&generators::users_clipboard(2)).unwrap();
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(fixture.count("users"), 9);
    }

    #[test]
    fn test_error_helpers() {
        let mut fixture = DatabaseFixture::with_sample_data("test_errors").unwrap();
        let result = fixture.session.execute("SELECT * FROM missing");
        assert_error_type(&result, |e| matches!(e, AdminError::Driver { .. }), "missing table");
        assert_error_mentions(&result, "no such table", "missing table");

        let result = fixture.session.schema("missing");
        assert_error_type(&result, |e| matches!(e, AdminError::SchemaUnavailable(_)), "schema");
    }

    #[test]
    fn test_composite_key_blocks_row_delete() {
        let mut fixture = DatabaseFixture::with_sample_data("test_composite").unwrap();
        fixture.session.browse("post_tags").unwrap();
        let result = fixture.session.delete_rows(&[0]);
        assert_error_type(
            &result,
            |e| matches!(e, AdminError::SchemaUnavailable(_)),
            "composite key delete",
        );
        assert_eq!(fixture.count("post_tags"), 2);
    }
}
