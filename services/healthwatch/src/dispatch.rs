//! Fan a notification out to every configured notifier

use std::sync::Arc;
use std::time::Duration;

use crate::notifier::{Notification, NotificationRecord, Notifier};
use crate::state::StateHandle;

/// Send `notification` through each notifier in turn.
///
/// Every attempt is bounded by `timeout` and recorded in the shared history.
/// Returns true when at least one notifier delivered it.
pub async fn deliver(
    notification: &Notification,
    notifiers: &[Arc<dyn Notifier>],
    state: &StateHandle,
    timeout: Duration,
) -> bool {
    let mut delivered = false;

    for notifier in notifiers {
        let notifier_type = notifier.type_name().to_string();
        tracing::debug!(
            "Dispatching to '{}' for '{}': {}",
            notifier_type,
            notification.endpoint_name,
            notification.title
        );

        let result = match tokio::time::timeout(timeout, notifier.notify(notification)).await {
            Ok(result) => result,
            Err(_) => Err(crate::HealthwatchError::Timeout(timeout)),
        };

        match &result {
            Ok(()) => delivered = true,
            Err(e) => tracing::warn!(
                "Notification via '{}' for '{}' failed: {}",
                notifier_type,
                notification.endpoint_name,
                e
            ),
        }

        let record = NotificationRecord {
            endpoint_name: notification.endpoint_name.clone(),
            notifier_type,
            kind: notification.kind,
            title: notification.title.clone(),
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            timestamp_epoch_ms: notification.timestamp_epoch_ms,
        };
        state.write().await.add_notification(record);
    }

    delivered
}
