//! Pushover notification client

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::NotifierConfig;
use crate::io::HttpClient;
use crate::monitor::NotificationKind;
use crate::notifier::{Notification, Notifier};

const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

/// Pushover notification sender
pub struct PushoverNotifier {
    api_token: String,
    user_key: String,
    title_prefix: String,
    failure_priority: i8,
    recovery_priority: i8,
    sound: Option<String>,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for PushoverNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverNotifier")
            .field("title_prefix", &self.title_prefix)
            .finish()
    }
}

impl PushoverNotifier {
    pub fn new(config: &NotifierConfig, http: Arc<dyn HttpClient>) -> crate::Result<Self> {
        let NotifierConfig::Pushover {
            api_token,
            user_key,
            title_prefix,
            failure_priority,
            recovery_priority,
            sound,
        } = config
        else {
            return Err(crate::HealthwatchError::Config(format!(
                "expected a pushover notifier, got '{}'",
                config.type_name()
            )));
        };

        tracing::debug!("Created PushoverNotifier with title prefix '{}'", title_prefix);

        Ok(Self {
            api_token: api_token.clone(),
            user_key: user_key.clone(),
            title_prefix: title_prefix.clone(),
            failure_priority: *failure_priority,
            recovery_priority: *recovery_priority,
            sound: sound.clone(),
            http,
        })
    }

    fn title(&self, notification: &Notification) -> String {
        if self.title_prefix.is_empty() {
            notification.title.clone()
        } else {
            format!("{}: {}", self.title_prefix, notification.title)
        }
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn type_name(&self) -> &str {
        "pushover"
    }

    async fn notify(&self, notification: &Notification) -> crate::Result<()> {
        let title = self.title(notification);
        let priority = match notification.kind {
            NotificationKind::Failure => self.failure_priority,
            NotificationKind::Recovery => self.recovery_priority,
        };

        let priority_str = priority.to_string();
        let mut params = vec![
            ("token", self.api_token.as_str()),
            ("user", self.user_key.as_str()),
            ("title", title.as_str()),
            ("message", notification.message.as_str()),
            ("priority", priority_str.as_str()),
            ("url", notification.endpoint_url.as_str()),
        ];
        if let Some(sound) = &self.sound {
            params.push(("sound", sound.as_str()));
        }

        tracing::debug!(
            "Sending Pushover notification: title='{}', priority={}",
            title,
            priority
        );

        let response = self.http.post_form(PUSHOVER_API_URL, &params).await?;

        if response.status != 200 {
            return Err(crate::HealthwatchError::Notifier(format!(
                "Pushover API returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Pushover notification sent successfully");
        Ok(())
    }
}
