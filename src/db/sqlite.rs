//! SQLite connector with a single pooled connection

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Transaction};

use super::{Connector, DbError, Session};
use crate::data::{Row, Value};

/// Pooling policy for the single monitor connection
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Reopen a connection once it is older than this
    pub recycle: Option<Duration>,
    /// Validate the connection with `SELECT 1` before each session
    pub pre_ping: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            recycle: Some(Duration::from_secs(60)),
            pre_ping: true,
        }
    }
}

impl PoolConfig {
    pub fn with_recycle(mut self, recycle: Option<Duration>) -> Self {
        self.recycle = recycle;
        self
    }

    pub fn with_pre_ping(mut self, pre_ping: bool) -> Self {
        self.pre_ping = pre_ping;
        self
    }
}

struct Pooled {
    conn: Connection,
    opened_at: Instant,
}

/// Read-only SQLite connector
///
/// The connection is opened lazily and reused (last in, first out) until it
/// fails its ping or exceeds the recycle age.
pub struct SqliteConnector {
    path: PathBuf,
    config: PoolConfig,
    pooled: Option<Pooled>,
}

impl SqliteConnector {
    pub fn new(path: impl AsRef<Path>, config: PoolConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            pooled: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_usable(&self, pooled: &Pooled) -> bool {
        if let Some(recycle) = self.config.recycle {
            if pooled.opened_at.elapsed() >= recycle {
                tracing::debug!(path = %self.path.display(), "Recycling database connection");
                return false;
            }
        }
        if self.config.pre_ping {
            if let Err(e) = pooled.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
                tracing::debug!(path = %self.path.display(), error = %e, "Connection ping failed");
                return false;
            }
        }
        true
    }

    fn checkout(&mut self) -> Result<&mut Connection, DbError> {
        let reusable = match self.pooled.take() {
            Some(pooled) if self.is_usable(&pooled) => Some(pooled),
            _ => None,
        };

        let pooled = match reusable {
            Some(pooled) => pooled,
            None => {
                let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = Connection::open_with_flags(&self.path, flags)
                    .map_err(|e| DbError::Connect(format!("{}: {}", self.path.display(), e)))?;
                tracing::debug!(path = %self.path.display(), "Opened database connection");
                Pooled {
                    conn,
                    opened_at: Instant::now(),
                }
            }
        };

        Ok(&mut self.pooled.insert(pooled).conn)
    }
}

impl Connector for SqliteConnector {
    fn session(&mut self) -> Result<Box<dyn Session + '_>, DbError> {
        let conn = self.checkout()?;
        let tx = conn
            .transaction()
            .map_err(|e| DbError::Connect(e.to_string()))?;
        Ok(Box::new(SqliteSession { tx: Some(tx) }))
    }
}

/// One transaction on the pooled connection, rolled back on drop unless committed
pub struct SqliteSession<'c> {
    tx: Option<Transaction<'c>>,
}

impl Session for SqliteSession<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| DbError::Query("session already committed".to_string()))?;

        let mut stmt = tx.prepare(sql).map_err(query_error)?;
        let column_count = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(query_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_error)? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(from_sql(row.get_ref(idx).map_err(query_error)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn commit(&mut self) -> Result<(), DbError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().map_err(|e| DbError::Connect(e.to_string()))?;
        }
        Ok(())
    }
}

fn query_error(e: rusqlite::Error) -> DbError {
    DbError::Query(e.to_string())
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int64(i) => SqlValue::Integer(*i),
        Value::Float64(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}
