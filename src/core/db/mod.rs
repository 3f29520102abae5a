/// Database Module
///
/// The database layer is split into three concerns:
/// - **Session** (`session.rs`): owns the connection and the current table view
/// - **Schema Introspection** (`schema.rs`): resolves columns and primary keys
/// - **Query Execution** (`query.rs`): runs and classifies SQL statements
///
/// All operations report `AdminError`.
pub mod query;
pub mod schema;
pub mod session;

pub use query::*;
pub use schema::*;
pub use session::*;
