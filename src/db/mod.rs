//! Database access for the monitor
//!
//! Listeners never see a concrete driver. They talk to a [`Session`], a narrow
//! capability exposing `execute` and `commit`, opened from a long-lived
//! [`Connector`]. The SQLite connector is the bundled backend.

pub mod reader;
pub mod session;
pub mod sqlite;
pub mod template;

pub use reader::{rows_to_string, ReadStrategy, RowReader, COLUMN_SEPARATOR};
pub use session::{Connector, Session};
pub use sqlite::{PoolConfig, SqliteConnector};
pub use template::{QueryTemplate, RenderedQuery, Substitution, TemplateError};

/// Database errors
///
/// Every variant is treated as a transient link failure by the listener
/// boundary: logged, throttled and retried on the next pass.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),
}
