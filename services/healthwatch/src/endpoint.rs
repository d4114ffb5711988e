//! Resolved endpoint descriptors and success predicates

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which HTTP status codes count as a healthy response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpectedStatus {
    /// Exactly this status code
    Status { code: u16 },
    /// Any code in `min..=max`
    Range { min: u16, max: u16 },
    /// Any 2xx response
    #[default]
    Success,
}

impl ExpectedStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::Status { code } => status == *code,
            ExpectedStatus::Range { min, max } => (*min..=*max).contains(&status),
            ExpectedStatus::Success => (200..300).contains(&status),
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Status { code } => write!(f, "{}", code),
            ExpectedStatus::Range { min, max } => write!(f, "{}-{}", min, max),
            ExpectedStatus::Success => write!(f, "2xx"),
        }
    }
}

/// A monitored endpoint with all defaults applied.
///
/// Built once at startup from the configuration and shared read-only with the
/// endpoint's task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub url: String,
    pub expect: ExpectedStatus,
    pub check_interval: Duration,
    pub suppression_window: Duration,
}
