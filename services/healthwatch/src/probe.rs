//! Health probes and their classified results

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::io::HttpClient;
use crate::HealthwatchError;

/// Why a check was considered unhealthy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// A response arrived but its status did not match the expectation
    BadStatus(u16),
    Timeout,
    /// Refused, reset, DNS failure and the like
    ConnectionError(String),
    Other(String),
}

impl FailureCause {
    /// Label used for the check-outcome counter
    pub fn label(&self) -> &'static str {
        match self {
            FailureCause::BadStatus(_) => "bad_status",
            FailureCause::Timeout => "timeout",
            FailureCause::ConnectionError(_) => "connection_error",
            FailureCause::Other(_) => "error",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::BadStatus(code) => write!(f, "Bad status code: {}", code),
            FailureCause::Timeout => write!(f, "Request timeout"),
            FailureCause::ConnectionError(detail) => write!(f, "Connection error: {}", detail),
            FailureCause::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Healthy,
    Unhealthy(FailureCause),
}

/// The classified result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub outcome: CheckOutcome,
    pub latency: Duration,
    pub status_code: Option<u16>,
}

impl CheckResult {
    pub fn healthy(status_code: u16, latency: Duration) -> Self {
        Self {
            outcome: CheckOutcome::Healthy,
            latency,
            status_code: Some(status_code),
        }
    }

    pub fn unhealthy(cause: FailureCause, latency: Duration) -> Self {
        let status_code = match cause {
            FailureCause::BadStatus(code) => Some(code),
            _ => None,
        };
        Self {
            outcome: CheckOutcome::Unhealthy(cause),
            latency,
            status_code,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Healthy)
    }

    pub fn cause(&self) -> Option<&FailureCause> {
        match &self.outcome {
            CheckOutcome::Healthy => None,
            CheckOutcome::Unhealthy(cause) => Some(cause),
        }
    }

    /// Label used for the check-outcome counter
    pub fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            CheckOutcome::Healthy => "success",
            CheckOutcome::Unhealthy(cause) => cause.label(),
        }
    }
}

/// Performs a single health check against an endpoint.
///
/// Implementations never fail: every problem is reported as an unhealthy
/// [`CheckResult`].
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> CheckResult;
}

/// Prober that issues an HTTP GET and checks the status code
pub struct HttpProber {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProber").finish()
    }
}

impl HttpProber {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> CheckResult {
        tracing::debug!("Checking '{}' at {}", endpoint.name, endpoint.url);
        let started = Instant::now();

        // Also bounds the body read, which the client timeout does not cover for every client
        let result = tokio::time::timeout(timeout, self.http.get(&endpoint.url, timeout)).await;
        let latency = started.elapsed();

        match result {
            Ok(Ok(response)) => {
                if endpoint.expect.matches(response.status) {
                    CheckResult::healthy(response.status, latency)
                } else {
                    tracing::debug!(
                        "'{}' returned {} (expected {})",
                        endpoint.name,
                        response.status,
                        endpoint.expect
                    );
                    CheckResult::unhealthy(FailureCause::BadStatus(response.status), latency)
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("Check of '{}' failed: {}", endpoint.name, e);
                let cause = match e {
                    HealthwatchError::Timeout(_) => FailureCause::Timeout,
                    HealthwatchError::Connection(detail) => FailureCause::ConnectionError(detail),
                    other => FailureCause::Other(other.to_string()),
                };
                CheckResult::unhealthy(cause, latency)
            }
            Err(_elapsed) => {
                tracing::debug!("Check of '{}' timed out after {:?}", endpoint.name, timeout);
                CheckResult::unhealthy(FailureCause::Timeout, latency)
            }
        }
    }
}
