//! The polling loop

use std::future::Future;
use std::time::Duration;

use super::config::DEFAULT_INTERVAL;
use super::listener::Listener;
use super::notifier::Notifier;
use crate::db::Connector;

/// Runs every listener in registration order, then sleeps
pub struct Monitor<C> {
    /// Long-lived session factory shared by all listeners
    connector: C,
    /// Notifier for sending reports
    notifier: Notifier,
    /// Registered listeners
    listeners: Vec<Listener>,
    /// Pause after each pass
    interval: Duration,
}

impl<C: Connector> Monitor<C> {
    /// Create a monitor with no listeners
    pub fn new(connector: C, notifier: Notifier) -> Self {
        Self {
            connector,
            notifier,
            listeners: Vec::new(),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Set the pause between passes
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Register a listener; it runs after all earlier ones
    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// List all listeners
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Give every listener one poll
    ///
    /// Listener failures are handled inside each listener, so every listener
    /// runs even when an earlier one fails.
    pub async fn run_pass(&mut self) {
        for listener in &mut self.listeners {
            listener.listen(&mut self.connector, &self.notifier).await;
        }
        tracing::debug!(listeners = self.listeners.len(), "Monitor pass complete");
    }

    /// Poll forever
    pub async fn run(&mut self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Poll until `shutdown` resolves; an in-flight pass always completes
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tracing::info!(
            listeners = self.listeners.len(),
            interval_secs = self.interval.as_secs(),
            "Monitor started"
        );

        loop {
            self.run_pass().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("Monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    use crate::db::testing::DownConnector;
    use crate::db::{PoolConfig, SqliteConnector};
    use crate::monitor::config::MailConfig;
    use crate::monitor::notifier::{Mailbox, NotifyTarget};

    fn notifier(mailbox: &Mailbox) -> Notifier {
        Notifier::new(
            "lab",
            MailConfig::default().with_targets(vec![NotifyTarget::Mailbox(mailbox.clone())]),
        )
    }

    fn seeded_db() -> (tempfile::TempDir, std::path::PathBuf, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.db");
        let writer = Connection::open(&path).unwrap();
        writer
            .execute_batch(
                "CREATE TABLE orders (id INTEGER);
                 CREATE TABLE results (id INTEGER);
                 INSERT INTO orders VALUES (1);",
            )
            .unwrap();
        (dir, path, writer)
    }

    #[tokio::test]
    async fn test_pass_runs_listeners_in_order() {
        let (_dir, path, writer) = seeded_db();
        let mailbox = Mailbox::new();
        let mut monitor = Monitor::new(
            SqliteConnector::new(&path, PoolConfig::default()),
            notifier(&mailbox),
        );
        monitor.add_listener(Listener::max_value("results", "id", None));
        monitor.add_listener(Listener::max_value("orders", "id", None));

        monitor.run_pass().await;
        writer.execute("INSERT INTO results VALUES (5)", []).unwrap();
        monitor.run_pass().await;

        let subjects: Vec<_> = mailbox.messages().into_iter().map(|m| m.subject).collect();
        assert_eq!(
            subjects,
            vec![
                "lab Table 'orders' MaxValueListener of 'id'",
                "lab Table 'results' MaxValueListener of 'id'",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_block_others() {
        let (_dir, path, _writer) = seeded_db();
        let mailbox = Mailbox::new();
        let mut monitor = Monitor::new(
            SqliteConnector::new(&path, PoolConfig::default()),
            notifier(&mailbox),
        );
        monitor.add_listener(Listener::row_count("no_such_table", 1));
        monitor.add_listener(Listener::row_count("orders", 1));

        monitor.run_pass().await;

        assert!(monitor.listeners()[0].link_failure().failing_since().is_some());
        assert!(monitor.listeners()[1].link_failure().failing_since().is_none());
        assert_eq!(mailbox.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_survived() {
        let mailbox = Mailbox::new();
        let mut monitor = Monitor::new(DownConnector, notifier(&mailbox));
        monitor.add_listener(Listener::row_add("orders", None));
        monitor.add_listener(Listener::row_count("orders", 1));

        monitor.run_pass().await;
        monitor.run_pass().await;

        for listener in monitor.listeners() {
            assert!(listener.link_failure().failing_since().is_some());
        }
        // Within the threshold nothing is reported
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_run_until_stops_after_current_pass() {
        let (_dir, path, _writer) = seeded_db();
        let mailbox = Mailbox::new();
        let mut monitor = Monitor::new(
            SqliteConnector::new(&path, PoolConfig::default()),
            notifier(&mailbox),
        )
        .with_interval(Duration::from_secs(3600));
        monitor.add_listener(Listener::row_count("orders", 1));

        monitor.run_until(async {}).await;

        assert_eq!(mailbox.len(), 1);
    }
}
