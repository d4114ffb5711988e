//! Notifier trait for sending alerts

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::monitor::{NotificationIntent, NotificationKind};

/// A notification to be sent, rendered from a [`NotificationIntent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub endpoint_name: String,
    pub endpoint_url: String,
    pub title: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub timestamp_epoch_ms: u64,
}

impl Notification {
    pub fn from_intent(intent: &NotificationIntent) -> Self {
        let name = &intent.endpoint_name;
        let time = humantime::format_rfc3339_seconds(intent.timestamp);

        let (title, message) = match intent.kind {
            NotificationKind::Failure => {
                let status = intent
                    .status_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "N/A".to_string());
                let mut message = format!(
                    "The health check for '{}' has FAILED.\n\nURL: {}\nError: {}\nStatus Code: {}\nTime: {}\n",
                    name, intent.endpoint_url, intent.detail, status, time
                );
                if let Some(previous) = intent.previous_alert {
                    message.push_str(&format!(
                        "\nThis is a recurring alert. Previous alert sent at: {}\n",
                        humantime::format_rfc3339_seconds(previous)
                    ));
                }
                (format!("{} is DOWN", name), message)
            }
            NotificationKind::Recovery => (
                format!("{} has RECOVERED", name),
                format!(
                    "The health check for '{}' has RECOVERED.\n\nURL: {}\nDetail: {}\nTime: {}\n",
                    name, intent.endpoint_url, intent.detail, time
                ),
            ),
        };

        Self {
            kind: intent.kind,
            endpoint_name: name.clone(),
            endpoint_url: intent.endpoint_url.clone(),
            title,
            message,
            status_code: intent.status_code,
            timestamp_epoch_ms: epoch_ms(intent.timestamp),
        }
    }
}

/// Record of a sent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub endpoint_name: String,
    pub notifier_type: String,
    pub kind: NotificationKind,
    pub title: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp_epoch_ms: u64,
}

/// Trait for sending notifications
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Get the notifier type name (e.g. "pushover")
    fn type_name(&self) -> &str;

    /// Send a notification
    async fn notify(&self, notification: &Notification) -> crate::Result<()>;
}

/// Writes alerts to the log. Installed when no other notifier is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn type_name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> crate::Result<()> {
        tracing::warn!(
            "ALERT [{}] {}: {}",
            notification.kind,
            notification.title,
            notification.message.trim_end().replace('\n', " | ")
        );
        Ok(())
    }
}

pub(crate) fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
