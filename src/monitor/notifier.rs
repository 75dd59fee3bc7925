//! Notification delivery for listener reports

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use super::config::MailConfig;

/// Display name used for the recipient of every report
const RECIPIENT_NAME: &str = "Administrator";

/// A composed plain-text report
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub from: String,
    pub from_name: String,
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

/// Where composed messages are delivered
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// POST the message as JSON to an HTTP mail relay
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Keep messages in process
    #[serde(skip)]
    Mailbox(Mailbox),
}

/// In-process message sink
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every delivered message, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    fn push(&self, message: Message) {
        self.messages.lock().push(message);
    }
}

/// Formats reports and hands them to every configured target
pub struct Notifier {
    monitor_name: String,
    mail: MailConfig,
    client: reqwest::Client,
}

impl Notifier {
    /// Create a new notifier
    pub fn new(monitor_name: impl Into<String>, mail: MailConfig) -> Self {
        Self {
            monitor_name: monitor_name.into(),
            mail,
            client: reqwest::Client::new(),
        }
    }

    pub fn monitor_name(&self) -> &str {
        &self.monitor_name
    }

    /// Build the message for a report without sending it
    pub fn compose(&self, title: &str, body: &str) -> Message {
        Message {
            from: self.mail.from.clone(),
            from_name: format!("{} DatabaseMonitor", self.monitor_name),
            to: self.mail.to.clone(),
            to_name: RECIPIENT_NAME.to_string(),
            subject: format!("{} {}", self.monitor_name, title),
            body: body.to_string(),
            date: Utc::now(),
        }
    }

    /// Compose a report and deliver it to all targets
    pub async fn send(&self, title: &str, body: &str) -> Result<(), NotifierError> {
        let message = self.compose(title, body);
        let mut errors = Vec::new();

        for target in &self.mail.targets {
            if let Err(e) = self.deliver(target, &message).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotifierError::Multiple(errors))
        }
    }

    /// Send to a single target
    async fn deliver(&self, target: &NotifyTarget, message: &Message) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    monitor = %self.monitor_name,
                    to = %message.to,
                    "{}\n{}",
                    message.subject,
                    message.body
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                self.send_webhook(url, headers, message).await
            }
            NotifyTarget::Mailbox(mailbox) => {
                mailbox.push(message.clone());
                Ok(())
            }
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        message: &Message,
    ) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "monitor": self.monitor_name,
            "from": { "address": message.from, "name": message.from_name },
            "to": { "address": message.to, "name": message.to_name },
            "subject": message.subject,
            "text": message.body,
            "timestamp": message.date.to_rfc3339(),
        });

        let mut request = self.client.post(url).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            url = %url,
            subject = %message.subject,
            "Webhook notification sent"
        );

        Ok(())
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(targets: Vec<NotifyTarget>) -> MailConfig {
        MailConfig::default()
            .with_from("monitor@lab.example")
            .with_to("admin@lab.example")
            .with_targets(targets)
    }

    #[test]
    fn test_compose_prefixes_subject() {
        let notifier = Notifier::new("gpu-01", mail(vec![]));
        let message = notifier.compose("Table 'orders' RowAddListener", "body");

        assert_eq!(message.subject, "gpu-01 Table 'orders' RowAddListener");
        assert_eq!(message.from_name, "gpu-01 DatabaseMonitor");
        assert_eq!(message.to_name, "Administrator");
        assert_eq!(message.from, "monitor@lab.example");
        assert_eq!(message.to, "admin@lab.example");
    }

    #[tokio::test]
    async fn test_mailbox_and_log_delivery() {
        let mailbox = Mailbox::new();
        let notifier = Notifier::new(
            "gpu-01",
            mail(vec![NotifyTarget::Log, NotifyTarget::Mailbox(mailbox.clone())]),
        );

        notifier.send("title", "line one\nline two").await.unwrap();

        let messages = mailbox.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "line one\nline two");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_reported() {
        let mailbox = Mailbox::new();
        let notifier = Notifier::new(
            "gpu-01",
            mail(vec![
                NotifyTarget::Webhook {
                    url: "http://127.0.0.1:9/relay".to_string(),
                    headers: HashMap::new(),
                },
                NotifyTarget::Mailbox(mailbox.clone()),
            ]),
        );

        let err = notifier.send("title", "body").await.unwrap_err();
        assert!(matches!(err, NotifierError::Multiple(ref errs) if errs.len() == 1));
        // Remaining targets still receive the message
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_target_config_parsing() {
        #[derive(Deserialize)]
        struct Targets {
            targets: Vec<NotifyTarget>,
        }

        let parsed: Targets = toml::from_str(
            r#"
            [[targets]]
            type = "Log"

            [[targets]]
            type = "Webhook"
            url = "https://relay.example/send"
            headers = { Authorization = "Bearer abc" }
            "#,
        )
        .unwrap();

        assert!(matches!(parsed.targets[0], NotifyTarget::Log));
        match &parsed.targets[1] {
            NotifyTarget::Webhook { url, headers } => {
                assert_eq!(url, "https://relay.example/send");
                assert_eq!(headers["Authorization"], "Bearer abc");
            }
            other => panic!("unexpected target {:?}", other),
        }
    }
}
