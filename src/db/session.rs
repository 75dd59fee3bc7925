use super::DbError;
use crate::data::{Row, Value};

/// A scoped unit of work against the monitored database
///
/// Dropping a session without calling [`Session::commit`] releases it and
/// discards the transaction.
pub trait Session {
    /// Execute a statement and collect every resulting row
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Commit the session's transaction
    fn commit(&mut self) -> Result<(), DbError>;
}

/// Long-lived factory for [`Session`]s
pub trait Connector {
    /// Open a session, validating or reconnecting the underlying link first
    fn session(&mut self) -> Result<Box<dyn Session + '_>, DbError>;
}
