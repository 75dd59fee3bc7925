//! Change-detecting listeners
//!
//! A listener owns one detection strategy plus the last observation it made.
//! Each pass it opens a session, compares what it sees now against that
//! memory and reports strict changes. Connectivity problems are tracked
//! separately so an outage is reported once per threshold period rather than
//! once per pass.

use std::fmt::Write;
use std::time::{Duration, Instant};

use super::config::DEFAULT_LINK_FAILURE_THRESHOLD;
use super::notifier::{Notifier, NotifierError};
use crate::data::Value;
use crate::db::{rows_to_string, Connector, DbError, RowReader, Session};
use crate::files::{lines_to_string, FileReader};

/// Title of the report sent when the database stays unreachable
pub const LOST_LINK_TITLE: &str = "DatabaseMonitor Lost Database Link";

/// Tracks how long a listener's database link has been failing
#[derive(Debug, Clone)]
pub struct LinkFailure {
    since: Option<Instant>,
    threshold: Duration,
}

impl LinkFailure {
    pub fn new(threshold: Duration) -> Self {
        Self {
            since: None,
            threshold,
        }
    }

    /// Start of the current failure period, if any
    pub fn failing_since(&self) -> Option<Instant> {
        self.since
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Record a failed poll at `now`
    ///
    /// Returns true when the failure has lasted longer than the threshold.
    /// The period then restarts at `now`, so a continuing outage is reported
    /// again only after another full threshold.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        match self.since {
            None => {
                self.since = Some(now);
                false
            }
            Some(since) if now.saturating_duration_since(since) > self.threshold => {
                self.since = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    /// Forget the current failure period
    pub fn clear(&mut self) {
        self.since = None;
    }
}

/// Detection strategy and its last observation
#[derive(Debug, Clone)]
pub enum ListenerKind {
    /// Reports every strict increase of the row count
    RowAdd {
        last_row: RowReader,
        file_reader: Option<FileReader>,
        /// `None` until the first successful count
        row_count: Option<usize>,
    },
    /// Reports the first pass at or above `threshold` rows
    RowCount {
        all_rows: RowReader,
        threshold: usize,
        notified: bool,
    },
    /// Reports every strictly greater `MAX(column)`
    MaxValue {
        reader: RowReader,
        column: String,
        addition: Option<RowReader>,
        /// `None` until the first non-null aggregate
        max_value: Option<Value>,
    },
}

/// Failure while assembling or delivering a report
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report query failed: {0}")]
    Db(#[from] DbError),

    #[error("Report delivery failed: {0}")]
    Notify(#[from] NotifierError),

    #[error("Table '{0}' returned no last row")]
    NoLastRow(String),
}

/// A stateful rule polling one table
#[derive(Debug, Clone)]
pub struct Listener {
    table: String,
    kind: ListenerKind,
    link: LinkFailure,
}

impl Listener {
    /// Report row growth of `table`, optionally attaching the file named by the last row
    pub fn row_add(table: impl Into<String>, file_reader: Option<FileReader>) -> Self {
        let table = table.into();
        Self::new(
            table.clone(),
            ListenerKind::RowAdd {
                last_row: RowReader::last_row(table),
                file_reader,
                row_count: None,
            },
        )
    }

    /// Report when `table` reaches `threshold` rows
    pub fn row_count(table: impl Into<String>, threshold: usize) -> Self {
        let table = table.into();
        Self::new(
            table.clone(),
            ListenerKind::RowCount {
                all_rows: RowReader::all_rows(table),
                threshold,
                notified: false,
            },
        )
    }

    /// Report new maxima of `column`, optionally with rows from `addition`
    ///
    /// The addition reader receives the new maximum as parameter 0.
    pub fn max_value(
        table: impl Into<String>,
        column: impl Into<String>,
        addition: Option<RowReader>,
    ) -> Self {
        let table = table.into();
        let column = column.into();
        Self::new(
            table.clone(),
            ListenerKind::MaxValue {
                reader: RowReader::max_value(table, column.clone()),
                column,
                addition,
                max_value: None,
            },
        )
    }

    fn new(table: String, kind: ListenerKind) -> Self {
        Self {
            table,
            kind,
            link: LinkFailure::new(DEFAULT_LINK_FAILURE_THRESHOLD),
        }
    }

    pub fn with_link_failure_threshold(mut self, threshold: Duration) -> Self {
        self.link = LinkFailure::new(threshold);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn kind(&self) -> &ListenerKind {
        &self.kind
    }

    pub fn link_failure(&self) -> &LinkFailure {
        &self.link
    }

    /// Name used in report titles
    pub fn name(&self) -> &'static str {
        match self.kind {
            ListenerKind::RowAdd { .. } => "RowAddListener",
            ListenerKind::RowCount { .. } => "RowCountListener",
            ListenerKind::MaxValue { .. } => "MaxValueListener",
        }
    }

    /// Poll once
    pub async fn listen(&mut self, connector: &mut dyn Connector, notifier: &Notifier) {
        self.listen_at(connector, notifier, Instant::now()).await
    }

    /// Poll once, using `now` for link failure bookkeeping
    pub async fn listen_at(
        &mut self,
        connector: &mut dyn Connector,
        notifier: &Notifier,
        now: Instant,
    ) {
        match self.poll(connector, notifier).await {
            Ok(()) => {
                if self.link.failing_since().is_some() {
                    tracing::info!(table = %self.table, listener = self.name(), "Database link restored");
                }
                self.link.clear();
            }
            Err(e) => {
                tracing::error!(
                    table = %self.table,
                    listener = self.name(),
                    error = %e,
                    "Listener poll failed"
                );
                if self.link.record_failure(now) {
                    let body = format!("Report by DBListener:\n{}", e);
                    if let Err(e) = notifier.send(LOST_LINK_TITLE, &body).await {
                        tracing::error!(
                            table = %self.table,
                            error = %e,
                            "Failed to send lost link notification"
                        );
                    }
                }
            }
        }
    }

    /// Open a session, query and commit; the session is dropped on every path
    async fn poll(
        &mut self,
        connector: &mut dyn Connector,
        notifier: &Notifier,
    ) -> Result<(), DbError> {
        let mut session = connector.session()?;
        self.query(session.as_mut(), notifier).await?;
        session.commit()
    }

    /// Compare the table against the stored observation and report changes
    ///
    /// Errors returned here are link failures. Failures while building or
    /// sending a report are turned into an error report instead.
    pub async fn query(
        &mut self,
        session: &mut dyn Session,
        notifier: &Notifier,
    ) -> Result<(), DbError> {
        let name = self.name();
        let Self { table, kind, .. } = self;

        match kind {
            ListenerKind::RowAdd {
                last_row,
                file_reader,
                row_count,
            } => {
                let n = count_rows(session, table)?;
                if let Some(previous) = *row_count {
                    if n > previous {
                        let title = format!("Table '{}' RowAddListener", table);
                        let outcome = async {
                            let body = row_add_report(
                                session,
                                table,
                                last_row,
                                file_reader.as_ref(),
                                n - previous,
                                n,
                            )?;
                            notifier.send(&title, &body).await?;
                            Ok::<_, ReportError>(())
                        }
                        .await;
                        if let Err(e) = outcome {
                            report_failure(notifier, name, &title, &e).await;
                        }
                    }
                }
                *row_count = Some(n);
            }
            ListenerKind::RowCount {
                all_rows,
                threshold,
                notified,
            } => {
                let rows = all_rows.read(session, None)?.unwrap_or_default();
                let reached = rows.len() >= *threshold;
                if reached && !*notified {
                    let title = format!("Table '{}' RowCountListener", table);
                    let body = format!(
                        "The row count of table '{}' is {}.\nAll rows:\n{}",
                        table,
                        rows.len(),
                        rows_to_string(&rows)
                    );
                    if let Err(e) = notifier.send(&title, &body).await {
                        report_failure(notifier, name, &title, &e.into()).await;
                    }
                }
                *notified = reached;
            }
            ListenerKind::MaxValue {
                reader,
                column,
                addition,
                max_value,
            } => {
                let observed = reader
                    .read(session, None)?
                    .and_then(|rows| rows.into_iter().next())
                    .and_then(|row| row.into_iter().next())
                    .filter(|value| !value.is_null());

                if let Some(value) = observed {
                    let is_new_max = max_value.as_ref().map_or(true, |max| value > *max);
                    if is_new_max {
                        *max_value = Some(value.clone());
                        let title = format!("Table '{}' MaxValueListener of '{}'", table, column);
                        let outcome = async {
                            let mut body = format!("The max value of '{}' is {}.\n", column, value);
                            if let Some(addition) = addition {
                                body.push_str("The addition content:\n");
                                let rows = addition
                                    .read(session, Some(std::slice::from_ref(&value)))?
                                    .unwrap_or_default();
                                body.push_str(&rows_to_string(&rows));
                            }
                            notifier.send(&title, &body).await?;
                            Ok::<_, ReportError>(())
                        }
                        .await;
                        if let Err(e) = outcome {
                            report_failure(notifier, name, &title, &e).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn count_rows(session: &mut dyn Session, table: &str) -> Result<usize, DbError> {
    let rows = RowReader::all_rows(table).read(session, None)?;
    Ok(rows.map_or(0, |rows| rows.len()))
}

fn row_add_report(
    session: &mut dyn Session,
    table: &str,
    last_row: &RowReader,
    file_reader: Option<&FileReader>,
    added: usize,
    total: usize,
) -> Result<String, ReportError> {
    let rows = last_row
        .read(session, None)?
        .ok_or_else(|| ReportError::NoLastRow(table.to_string()))?;

    let mut body = format!(
        "The table '{}' is +{} of {} row(s).\nThe last row:\n{}",
        table,
        added,
        total,
        rows_to_string(&rows)
    );

    if let Some(reader) = file_reader {
        let _ = write!(body, "\n\nThe file content of Column {}:\n", reader.column());
        match rows.first().and_then(|row| reader.read_file(row)) {
            Some(lines) => body.push_str(&lines_to_string(&lines, None, None)),
            None => body.push_str("(file unavailable)"),
        }
    }

    Ok(body)
}

/// Log a report failure and send an error report in its place
///
/// A failure to send the error report itself is logged and dropped.
async fn report_failure(notifier: &Notifier, listener: &str, title: &str, error: &ReportError) {
    tracing::error!(listener = listener, title = %title, error = %error, "Failed to build or send report");

    let body = format!("Report by {}:\n{}", listener, error);
    if let Err(e) = notifier.send(&format!("Error: {}", title), &body).await {
        tracing::error!(
            listener = listener,
            title = %title,
            error = %e,
            "Failed to send error report"
        );
    }
}
