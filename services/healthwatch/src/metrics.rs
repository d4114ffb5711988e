//! Endpoint telemetry: the sink trait, per-cycle updates, and a Prometheus registry
//!
//! Every series is labelled with the endpoint's `name` and `url`. The registry
//! keeps everything in memory and renders the Prometheus text exposition format
//! on demand for the `/metrics` route.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::endpoint::Endpoint;

/// Upper bounds of the latency histogram buckets, in seconds
pub const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Identity of an endpoint's metric series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    pub name: String,
    pub url: String,
}

impl From<&Endpoint> for MetricKey {
    fn from(endpoint: &Endpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
        }
    }
}

/// Notification counter labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMetric {
    FailureInitial,
    FailureRecurring,
    Recovery,
    DeliveryFailed,
}

impl NotificationMetric {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationMetric::FailureInitial => "failure_initial",
            NotificationMetric::FailureRecurring => "failure_recurring",
            NotificationMetric::Recovery => "recovery",
            NotificationMetric::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Receives endpoint telemetry. Called concurrently from every endpoint task.
pub trait MetricsSink: Send + Sync {
    fn set_up(&self, key: &MetricKey, up: bool);
    fn set_status_code(&self, key: &MetricKey, code: u16);
    fn set_last_check(&self, key: &MetricKey, epoch_seconds: f64);
    fn inc_check(&self, key: &MetricKey, outcome: &str);
    fn inc_notification(&self, key: &MetricKey, kind: NotificationMetric);
    fn observe_latency(&self, key: &MetricKey, latency: Duration);
}

/// Metric updates for one check cycle, decided by the endpoint monitor
#[derive(Debug, Clone, PartialEq)]
pub struct MetricUpdates {
    pub up: bool,
    pub status_code: Option<u16>,
    pub checked_at: SystemTime,
    pub outcome: &'static str,
    pub latency: Duration,
}

impl MetricUpdates {
    pub fn apply(&self, key: &MetricKey, sink: &dyn MetricsSink) {
        sink.set_up(key, self.up);
        if let Some(code) = self.status_code {
            sink.set_status_code(key, code);
        }
        sink.set_last_check(key, epoch_seconds(self.checked_at));
        sink.inc_check(key, self.outcome);
        sink.observe_latency(key, self.latency);
    }
}

pub(crate) fn epoch_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Debug, Default, Clone)]
struct Histogram {
    buckets: [u64; LATENCY_BUCKETS.len()],
    sum: f64,
    count: u64,
}

impl Histogram {
    fn observe(&mut self, value: f64) {
        for (bucket, bound) in self.buckets.iter_mut().zip(LATENCY_BUCKETS) {
            if value <= bound {
                *bucket += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

#[derive(Debug, Default, Clone)]
struct Series {
    up: Option<f64>,
    status_code: Option<u16>,
    last_check: Option<f64>,
    checks: BTreeMap<String, u64>,
    notifications: BTreeMap<&'static str, u64>,
    latency: Histogram,
}

/// In-memory metrics store with Prometheus text rendering
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    series: Mutex<BTreeMap<MetricKey, Series>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_series<F: FnOnce(&mut Series)>(&self, key: &MetricKey, f: F) {
        let mut series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        f(series.entry(key.clone()).or_default());
    }

    fn read<T, F: FnOnce(&Series) -> T>(&self, key: &MetricKey, f: F) -> Option<T> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series.get(key).map(f)
    }

    pub fn up(&self, key: &MetricKey) -> Option<f64> {
        self.read(key, |s| s.up).flatten()
    }

    pub fn status_code(&self, key: &MetricKey) -> Option<u16> {
        self.read(key, |s| s.status_code).flatten()
    }

    pub fn check_count(&self, key: &MetricKey, outcome: &str) -> u64 {
        self.read(key, |s| s.checks.get(outcome).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn notification_count(&self, key: &MetricKey, kind: NotificationMetric) -> u64 {
        self.read(key, |s| s.notifications.get(kind.label()).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn latency_count(&self, key: &MetricKey) -> u64 {
        self.read(key, |s| s.latency.count).unwrap_or(0)
    }

    /// Render every series in the Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();

        header(&mut out, "healthwatch_endpoint_up", "Endpoint health (1=up, 0=down).", "gauge");
        for (key, s) in series.iter() {
            if let Some(up) = s.up {
                line(&mut out, "healthwatch_endpoint_up", key, &[], up);
            }
        }

        header(&mut out, "healthwatch_http_status_code", "Last HTTP status code received.", "gauge");
        for (key, s) in series.iter() {
            if let Some(code) = s.status_code {
                line(&mut out, "healthwatch_http_status_code", key, &[], f64::from(code));
            }
        }

        header(
            &mut out,
            "healthwatch_last_check_timestamp_seconds",
            "Unix time of the last health check.",
            "gauge",
        );
        for (key, s) in series.iter() {
            if let Some(ts) = s.last_check {
                line(&mut out, "healthwatch_last_check_timestamp_seconds", key, &[], ts);
            }
        }

        header(&mut out, "healthwatch_checks_total", "Health checks by outcome.", "counter");
        for (key, s) in series.iter() {
            for (outcome, count) in &s.checks {
                line(
                    &mut out,
                    "healthwatch_checks_total",
                    key,
                    &[("outcome", outcome.as_str())],
                    *count as f64,
                );
            }
        }

        header(
            &mut out,
            "healthwatch_notifications_total",
            "Notifications by kind.",
            "counter",
        );
        for (key, s) in series.iter() {
            for (kind, count) in &s.notifications {
                line(
                    &mut out,
                    "healthwatch_notifications_total",
                    key,
                    &[("kind", *kind)],
                    *count as f64,
                );
            }
        }

        header(
            &mut out,
            "healthwatch_check_duration_seconds",
            "Health check latency in seconds.",
            "histogram",
        );
        for (key, s) in series.iter() {
            if s.latency.count == 0 {
                continue;
            }
            for (bound, count) in LATENCY_BUCKETS.iter().zip(s.latency.buckets) {
                let le = bound.to_string();
                line(
                    &mut out,
                    "healthwatch_check_duration_seconds_bucket",
                    key,
                    &[("le", &le)],
                    count as f64,
                );
            }
            line(
                &mut out,
                "healthwatch_check_duration_seconds_bucket",
                key,
                &[("le", "+Inf")],
                s.latency.count as f64,
            );
            line(&mut out, "healthwatch_check_duration_seconds_sum", key, &[], s.latency.sum);
            line(
                &mut out,
                "healthwatch_check_duration_seconds_count",
                key,
                &[],
                s.latency.count as f64,
            );
        }

        out
    }
}

impl MetricsSink for MetricsRegistry {
    fn set_up(&self, key: &MetricKey, up: bool) {
        self.with_series(key, |s| s.up = Some(if up { 1.0 } else { 0.0 }));
    }

    fn set_status_code(&self, key: &MetricKey, code: u16) {
        self.with_series(key, |s| s.status_code = Some(code));
    }

    fn set_last_check(&self, key: &MetricKey, epoch_seconds: f64) {
        self.with_series(key, |s| s.last_check = Some(epoch_seconds));
    }

    fn inc_check(&self, key: &MetricKey, outcome: &str) {
        self.with_series(key, |s| *s.checks.entry(outcome.to_string()).or_default() += 1);
    }

    fn inc_notification(&self, key: &MetricKey, kind: NotificationMetric) {
        self.with_series(key, |s| *s.notifications.entry(kind.label()).or_default() += 1);
    }

    fn observe_latency(&self, key: &MetricKey, latency: Duration) {
        self.with_series(key, |s| s.latency.observe(latency.as_secs_f64()));
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);
}

fn line(out: &mut String, name: &str, key: &MetricKey, extra: &[(&str, &str)], value: f64) {
    let _ = write!(
        out,
        "{}{{name=\"{}\",url=\"{}\"",
        name,
        escape_label(&key.name),
        escape_label(&key.url)
    );
    for (label, v) in extra {
        let _ = write!(out, ",{}=\"{}\"", label, escape_label(v));
    }
    let _ = writeln!(out, "}} {}", value);
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
