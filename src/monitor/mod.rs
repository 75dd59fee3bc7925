//! Table monitoring service
//!
//! Listeners poll tables through a shared connector on a fixed interval and
//! mail a report when they see a change.

pub mod config;
pub mod listener;
pub mod notifier;
pub mod runner;

pub use config::{ConfigError, ListenerSpec, MailConfig, MonitorConfig};
pub use listener::{LinkFailure, Listener, ListenerKind, ReportError, LOST_LINK_TITLE};
pub use notifier::{Mailbox, Message, Notifier, NotifierError, NotifyTarget};
pub use runner::Monitor;
