//! Tablewatch: Database Table Monitor
//!
//! Polls tables of a relational database on a fixed interval and mails a
//! human-readable report when something changes.
//!
//! # Listeners
//!
//! - **Row add**: reports every growth in row count, with the newest row and
//!   optionally the file that row names
//! - **Row count**: reports once when a table reaches a threshold, re-arming
//!   when it drops below again
//! - **Max value**: reports every new maximum of a column, optionally with
//!   rows from a follow-up query
//!
//! A listener that loses its database link keeps polling and reports the
//! outage once it has lasted longer than the link failure threshold.
//!
//! # Delivery
//!
//! Reports are composed as mail (sender, recipient, subject, plain-text body)
//! and handed to the configured targets. Mail leaves the process through a
//! `Webhook` target pointing at an HTTP mail relay; the default `Log` target
//! only writes reports to the log.
//!
//! # Example
//!
//! ```no_run
//! use tablewatch::db::{PoolConfig, SqliteConnector};
//! use tablewatch::files::FileReader;
//! use tablewatch::monitor::{Listener, MailConfig, Monitor, Notifier};
//!
//! # async fn example() {
//! let connector = SqliteConnector::new("/data/runs.db", PoolConfig::default());
//! let notifier = Notifier::new("gpu-01", MailConfig::default());
//! let mut monitor = Monitor::new(connector, notifier);
//!
//! monitor.add_listener(Listener::row_add(
//!     "bad_code",
//!     Some(FileReader::new(1, "/data/project/")),
//! ));
//! monitor.add_listener(Listener::row_count("ds_result", 10));
//!
//! monitor.run().await;
//! # }
//! ```

pub mod data;
pub mod db;
pub mod files;
pub mod monitor;

// Re-export commonly used types
pub use data::{Row, Value};
pub use db::{Connector, DbError, RowReader, Session, SqliteConnector};
pub use monitor::{Listener, MonitorConfig, Monitor, Notifier};
