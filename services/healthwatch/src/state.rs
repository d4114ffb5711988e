//! Shared state for endpoint statuses and notification history

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::endpoint::Endpoint;
use crate::monitor::{Availability, EndpointState};
use crate::notifier::NotificationRecord;
use crate::probe::CheckResult;

/// Status of a single endpoint as reported by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub name: String,
    pub url: String,
    pub availability: Availability,
    pub last_check_epoch_ms: Option<u64>,
    pub last_change_epoch_ms: Option<u64>,
    pub last_status_code: Option<u16>,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_alert_epoch_ms: Option<u64>,
    pub check_interval_ms: u64,
}

/// Shared state accessible by the engine and the API server
#[derive(Debug)]
pub struct SharedState {
    pub endpoints: Vec<EndpointStatus>,
    pub history: VecDeque<NotificationRecord>,
    pub history_max_size: usize,
    pub started_at: Instant,
}

impl SharedState {
    pub fn new(endpoints: &[Endpoint], history_max_size: usize) -> Self {
        let endpoints = endpoints
            .iter()
            .map(|e| EndpointStatus {
                name: e.name.clone(),
                url: e.url.clone(),
                availability: Availability::Up,
                last_check_epoch_ms: None,
                last_change_epoch_ms: None,
                last_status_code: None,
                last_latency_ms: None,
                last_error: None,
                consecutive_failures: 0,
                last_alert_epoch_ms: None,
                check_interval_ms: e.check_interval.as_millis() as u64,
            })
            .collect();

        Self {
            endpoints,
            history: VecDeque::with_capacity(history_max_size),
            history_max_size,
            started_at: Instant::now(),
        }
    }

    /// Record a completed check and the state it led to.
    ///
    /// Returns the number of consecutive failed checks, or `None` for an
    /// unknown endpoint.
    pub fn record_check(
        &mut self,
        name: &str,
        result: &CheckResult,
        next: &EndpointState,
        now_ms: u64,
    ) -> Option<u32> {
        let status = self.endpoints.iter_mut().find(|e| e.name == name)?;

        if status.availability != next.availability {
            status.last_change_epoch_ms = Some(now_ms);
        }
        status.availability = next.availability;
        status.last_check_epoch_ms = Some(now_ms);
        status.last_status_code = result.status_code;
        status.last_latency_ms = Some(result.latency.as_millis() as u64);
        status.last_error = result.cause().map(|c| c.to_string());
        status.last_alert_epoch_ms = next.last_alert.map(crate::notifier::epoch_ms);

        if result.is_healthy() {
            status.consecutive_failures = 0;
        } else {
            status.consecutive_failures += 1;
        }
        Some(status.consecutive_failures)
    }

    /// Note a delivered failure alert
    pub fn record_alert(&mut self, name: &str, at_ms: u64) {
        if let Some(status) = self.endpoints.iter_mut().find(|e| e.name == name) {
            status.last_alert_epoch_ms = Some(at_ms);
        }
    }

    pub fn get_endpoint(&self, name: &str) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Add a notification to history
    pub fn add_notification(&mut self, record: NotificationRecord) {
        if self.history_max_size == 0 {
            return;
        }
        if self.history.len() >= self.history_max_size {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(endpoints: &[Endpoint], history_max_size: usize) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(endpoints, history_max_size)))
}
