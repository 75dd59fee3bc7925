//! Monitor configuration types

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::listener::Listener;
use super::notifier::NotifyTarget;
use crate::db::{QueryTemplate, RowReader, Substitution};
use crate::files::FileReader;

/// Default pause between polling passes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default time a link failure must persist before it is reported
pub const DEFAULT_LINK_FAILURE_THRESHOLD: Duration = Duration::from_secs(600);

/// Monitor settings, usually loaded from a TOML wiring file
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Pause after each full pass over the listeners
    #[serde(default = "default_interval", with = "duration_serde")]
    pub interval: Duration,
    /// How long a link failure persists before a lost-link report
    #[serde(default = "default_link_failure_threshold", with = "duration_serde")]
    pub link_failure_threshold: Duration,
    /// Report delivery
    #[serde(default)]
    pub mail: MailConfig,
    /// Listeners, in registration order
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            link_failure_threshold: DEFAULT_LINK_FAILURE_THRESHOLD,
            mail: MailConfig::default(),
            listeners: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Parse a wiring file
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a wiring file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_link_failure_threshold(mut self, threshold: Duration) -> Self {
        self.link_failure_threshold = threshold;
        self
    }

    pub fn with_listener(mut self, spec: ListenerSpec) -> Self {
        self.listeners.push(spec);
        self
    }

    /// Build every configured listener
    ///
    /// `dir_path` is the project directory that file-reading listeners
    /// resolve row values against.
    pub fn build_listeners(&self, dir_path: &str) -> Result<Vec<Listener>, ConfigError> {
        self.listeners
            .iter()
            .map(|spec| {
                spec.build(dir_path)
                    .map(|l| l.with_link_failure_threshold(self.link_failure_threshold))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be non-zero".to_string()));
        }
        if self.mail.targets.is_empty() {
            return Err(ConfigError::Invalid(
                "mail.targets must name at least one target".to_string(),
            ));
        }
        for spec in &self.listeners {
            spec.validate()?;
        }
        Ok(())
    }
}

/// Addresses and transports for reports
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Sender address
    #[serde(default = "default_from")]
    pub from: String,
    /// Recipient address
    #[serde(default = "default_to")]
    pub to: String,
    /// Delivery targets
    #[serde(default = "default_targets")]
    pub targets: Vec<NotifyTarget>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            to: default_to(),
            targets: default_targets(),
        }
    }
}

impl MailConfig {
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn with_targets(mut self, targets: Vec<NotifyTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_target(mut self, target: NotifyTarget) -> Self {
        self.targets.push(target);
        self
    }

    /// Whether any target hands reports to a mail relay
    ///
    /// Without a `Webhook` target reports only reach the log.
    pub fn delivers_externally(&self) -> bool {
        self.targets
            .iter()
            .any(|t| matches!(t, NotifyTarget::Webhook { .. }))
    }
}

/// Declarative form of one listener
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenerSpec {
    /// Report every growth of `table`
    RowAdd {
        table: String,
        /// Column of the last row naming a file under the project directory
        #[serde(default)]
        file_column: Option<i64>,
    },
    /// Report when `table` first reaches `threshold` rows
    RowCount { table: String, threshold: usize },
    /// Report every new maximum of `column`
    MaxValue {
        table: String,
        column: String,
        /// Table read for extra report content
        #[serde(default)]
        addition_table: Option<String>,
        /// Fragment appended to `SELECT * FROM addition_table`, `{}` is the new max
        #[serde(default)]
        addition_condition: Option<String>,
        /// Bind the new max as a parameter instead of splicing it in
        #[serde(default)]
        bind_params: bool,
    },
}

impl ListenerSpec {
    pub fn table(&self) -> &str {
        match self {
            ListenerSpec::RowAdd { table, .. }
            | ListenerSpec::RowCount { table, .. }
            | ListenerSpec::MaxValue { table, .. } => table,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.table().trim().is_empty() {
            return Err(ConfigError::Invalid("listener table must not be empty".to_string()));
        }
        if let ListenerSpec::MaxValue {
            addition_table,
            addition_condition,
            ..
        } = self
        {
            if addition_condition.is_some() && addition_table.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "listener on '{}' has addition_condition without addition_table",
                    self.table()
                )));
            }
        }
        Ok(())
    }

    /// Construct the listener
    pub fn build(&self, dir_path: &str) -> Result<Listener, ConfigError> {
        self.validate()?;
        let listener = match self {
            ListenerSpec::RowAdd { table, file_column } => {
                let file_reader = file_column.map(|column| {
                    FileReader::new(column, format!("{}/", dir_path.trim_end_matches('/')))
                });
                Listener::row_add(table.clone(), file_reader)
            }
            ListenerSpec::RowCount { table, threshold } => {
                Listener::row_count(table.clone(), *threshold)
            }
            ListenerSpec::MaxValue {
                table,
                column,
                addition_table,
                addition_condition,
                bind_params,
            } => {
                let addition = addition_table.as_ref().map(|addition_table| {
                    let substitution = if *bind_params {
                        Substitution::Bind
                    } else {
                        Substitution::Inline
                    };
                    let template =
                        QueryTemplate::new(addition_condition.clone().unwrap_or_default())
                            .with_substitution(substitution);
                    RowReader::condition(addition_table.clone(), template)
                });
                Listener::max_value(table.clone(), column.clone(), addition)
            }
        };
        Ok(listener)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_link_failure_threshold() -> Duration {
    DEFAULT_LINK_FAILURE_THRESHOLD
}

fn default_from() -> String {
    "tablewatch@localhost".to_string()
}

fn default_to() -> String {
    "admin@localhost".to_string()
}

fn default_targets() -> Vec<NotifyTarget> {
    vec![NotifyTarget::Log]
}

/// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    struct DurationHelper {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let helper = DurationHelper::deserialize(deserializer)?;
        Ok(Duration::new(helper.secs, helper.nanos))
    }
}
