//! Per-endpoint availability state machine and alert throttling
//!
//! [`EndpointMonitor::process`] is a pure function of the current state, the
//! check result and the time. It returns the next state, an optional
//! notification decision and the metric updates for the cycle. Whether a
//! failure alert was actually delivered is fed back separately through
//! [`EndpointMonitor::record_delivery`], so an alert that failed to go out is
//! decided again on the next failing check.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::metrics::{MetricUpdates, NotificationMetric};
use crate::probe::{CheckOutcome, CheckResult};

/// Whether an endpoint is currently considered available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Up,
    Down,
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Up => write!(f, "Up"),
            Availability::Down => write!(f, "Down"),
        }
    }
}

/// State owned by a single endpoint's monitor.
///
/// `last_alert` is only ever `Some` while `availability` is `Down`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState {
    pub availability: Availability,
    pub last_alert: Option<SystemTime>,
}

impl Default for EndpointState {
    fn default() -> Self {
        Self {
            availability: Availability::Up,
            last_alert: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Failure,
    Recovery,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Failure => write!(f, "failure"),
            NotificationKind::Recovery => write!(f, "recovery"),
        }
    }
}

/// A decided, not yet delivered alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub endpoint_name: String,
    pub endpoint_url: String,
    pub kind: NotificationKind,
    pub detail: String,
    pub status_code: Option<u16>,
    pub timestamp: SystemTime,
    /// Last successfully delivered failure alert, set for recurring alerts
    pub previous_alert: Option<SystemTime>,
}

impl NotificationIntent {
    pub fn is_recurring(&self) -> bool {
        self.kind == NotificationKind::Failure && self.previous_alert.is_some()
    }

    /// Counter label for a successful delivery of this intent
    pub fn delivered_metric(&self) -> NotificationMetric {
        match self.kind {
            NotificationKind::Recovery => NotificationMetric::Recovery,
            NotificationKind::Failure if self.previous_alert.is_some() => {
                NotificationMetric::FailureRecurring
            }
            NotificationKind::Failure => NotificationMetric::FailureInitial,
        }
    }
}

/// Everything one check cycle decided
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub next: EndpointState,
    pub intent: Option<NotificationIntent>,
    pub metrics: MetricUpdates,
}

/// Owns the state of exactly one endpoint
#[derive(Debug, Clone)]
pub struct EndpointMonitor {
    endpoint: Arc<Endpoint>,
    state: EndpointState,
}

impl EndpointMonitor {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        Self::with_state(endpoint, EndpointState::default())
    }

    pub fn with_state(endpoint: Arc<Endpoint>, state: EndpointState) -> Self {
        Self { endpoint, state }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> &EndpointState {
        &self.state
    }

    /// Decide the outcome of one check without touching the current state
    pub fn process(&self, result: &CheckResult, now: SystemTime) -> Evaluation {
        let metrics = MetricUpdates {
            up: result.is_healthy(),
            status_code: result.status_code,
            checked_at: now,
            outcome: result.outcome_label(),
            latency: result.latency,
        };

        let (next, intent) = match (&self.state.availability, &result.outcome) {
            (Availability::Up, CheckOutcome::Healthy) => (self.state.clone(), None),
            (Availability::Down, CheckOutcome::Healthy) => {
                let detail = match result.status_code {
                    Some(code) => format!("Healthy again (status {})", code),
                    None => "Healthy again".to_string(),
                };
                let intent = self.intent(NotificationKind::Recovery, detail, result, now, None);
                (EndpointState::default(), Some(intent))
            }
            (_, CheckOutcome::Unhealthy(cause)) => {
                let next = EndpointState {
                    availability: Availability::Down,
                    last_alert: self.state.last_alert,
                };
                let intent = self.failure_alert_due(now).then(|| {
                    self.intent(
                        NotificationKind::Failure,
                        cause.to_string(),
                        result,
                        now,
                        self.state.last_alert,
                    )
                });
                (next, intent)
            }
        };

        Evaluation {
            next,
            intent,
            metrics,
        }
    }

    /// Install the state returned by [`process`](Self::process)
    pub fn commit(&mut self, next: EndpointState) {
        self.state = next;
    }

    /// Note that `intent` reached at least one notifier.
    ///
    /// Only failure alerts delivered while the endpoint is still down move the
    /// suppression window.
    pub fn record_delivery(&mut self, intent: &NotificationIntent) {
        if intent.kind == NotificationKind::Failure
            && self.state.availability == Availability::Down
        {
            self.state.last_alert = Some(intent.timestamp);
        }
    }

    fn failure_alert_due(&self, now: SystemTime) -> bool {
        match self.state.last_alert {
            None => true,
            Some(last) => {
                // A clock that stepped backwards counts as no time elapsed
                let elapsed = now.duration_since(last).unwrap_or(Duration::ZERO);
                elapsed >= self.endpoint.suppression_window
            }
        }
    }

    fn intent(
        &self,
        kind: NotificationKind,
        detail: String,
        result: &CheckResult,
        now: SystemTime,
        previous_alert: Option<SystemTime>,
    ) -> NotificationIntent {
        NotificationIntent {
            endpoint_name: self.endpoint.name.clone(),
            endpoint_url: self.endpoint.url.clone(),
            kind,
            detail,
            status_code: result.status_code,
            timestamp: now,
            previous_alert,
        }
    }
}
