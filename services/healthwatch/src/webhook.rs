//! Generic JSON webhook notifier

use std::sync::Arc;

use async_trait::async_trait;

use crate::io::HttpClient;
use crate::notifier::{Notification, Notifier};

/// POSTs each notification as a JSON document to a fixed URL
pub struct WebhookNotifier {
    url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed a token
        f.debug_struct("WebhookNotifier").finish()
    }
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, notification: &Notification) -> crate::Result<()> {
        let body = serde_json::to_value(notification)?;

        tracing::debug!("Sending webhook notification '{}'", notification.title);
        let response = self.http.post_json(&self.url, &body).await?;

        if !(200..300).contains(&response.status) {
            return Err(crate::HealthwatchError::Notifier(format!(
                "Webhook returned status {}: {}",
                response.status, response.body
            )));
        }
        Ok(())
    }
}
