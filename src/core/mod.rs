/// Core Module for dbadmin
///
/// Shared infrastructure: the database layer (session, query gateway,
/// schema introspection) and the error taxonomy every component reports in.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{AdminError, Result};
