//! BDD step definitions for the engine and service lifecycle features

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cucumber::{given, then, when};
use tokio_util::sync::CancellationToken;

use healthwatch::config::{Config, EndpointConfig, ServerConfig};
use healthwatch::endpoint::{Endpoint, ExpectedStatus};
use healthwatch::engine::{Engine, Timeouts};
use healthwatch::metrics::{MetricKey, MetricsRegistry};
use healthwatch::notifier::{Notification, Notifier};
use healthwatch::probe::{CheckResult, FailureCause, Prober};
use healthwatch::state::new_state_handle;
use healthwatch::HealthwatchBuilder;

use crate::world::HealthwatchWorld;

// --- Test doubles ---

/// Healthy unless the endpoint is listed as failing or panicking
#[derive(Debug, Default)]
pub struct ScriptedProber {
    failing: Vec<String>,
    panicking: Vec<String>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProber {
    pub fn calls(&self, name: &str) -> u32 {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, endpoint: &Endpoint, _timeout: Duration) -> CheckResult {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(endpoint.name.clone())
            .or_default() += 1;

        if self.panicking.contains(&endpoint.name) {
            panic!("probe of '{}' exploded", endpoint.name);
        }
        if self.failing.contains(&endpoint.name) {
            CheckResult::unhealthy(
                FailureCause::ConnectionError("connection refused".to_string()),
                Duration::from_millis(1),
            )
        } else {
            CheckResult::healthy(200, Duration::from_millis(1))
        }
    }
}

/// Records every notification it is handed
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn titles_for(&self, name: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.endpoint_name == name)
            .map(|n| n.title.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    fn type_name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notification: &Notification) -> healthwatch::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn endpoint(name: &str, interval_ms: u64) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        url: format!("http://{}.local/health", name),
        expect: ExpectedStatus::Success,
        check_interval: Duration::from_millis(interval_ms),
        suppression_window: Duration::from_secs(3600),
    }
}

fn metric_key(world: &HealthwatchWorld, name: &str) -> MetricKey {
    let endpoint = world
        .engine_endpoints
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("no endpoint named '{}'", name));
    MetricKey::from(endpoint)
}

// --- Given steps ---

#[given(expr = "a healthy endpoint {string} checked every {int} milliseconds")]
fn healthy_endpoint(world: &mut HealthwatchWorld, name: String, interval_ms: u64) {
    world.engine_endpoints.push(endpoint(&name, interval_ms));
}

#[given(expr = "a failing endpoint {string} checked every {int} milliseconds")]
fn failing_endpoint(world: &mut HealthwatchWorld, name: String, interval_ms: u64) {
    world.engine_endpoints.push(endpoint(&name, interval_ms));
    let prober = world.engine_prober.get_or_insert_with(Default::default);
    Arc::get_mut(prober)
        .expect("prober already shared")
        .failing
        .push(name);
}

#[given(expr = "an endpoint {string} whose probe panics, checked every {int} milliseconds")]
fn panicking_endpoint(world: &mut HealthwatchWorld, name: String, interval_ms: u64) {
    world.engine_endpoints.push(endpoint(&name, interval_ms));
    let prober = world.engine_prober.get_or_insert_with(Default::default);
    Arc::get_mut(prober)
        .expect("prober already shared")
        .panicking
        .push(name);
}

#[given("an empty healthwatch config")]
fn empty_config(world: &mut HealthwatchWorld) {
    world.lifecycle_config = Some(Config {
        server: ServerConfig {
            enabled: false,
            ..ServerConfig::default()
        },
        ..Config::default()
    });
}

#[given(expr = "a healthwatch config with endpoint {string} at {string}")]
fn config_with_endpoint(world: &mut HealthwatchWorld, name: String, url: String) {
    let config = world.lifecycle_config.get_or_insert_with(|| Config {
        server: ServerConfig {
            enabled: false,
            ..ServerConfig::default()
        },
        ..Config::default()
    });
    config.endpoints.push(EndpointConfig {
        name,
        url,
        expect: ExpectedStatus::Success,
        check_interval_seconds: None,
        suppression_window_seconds: None,
    });
}

#[given("a pre-cancelled cancellation token")]
fn pre_cancelled_token(world: &mut HealthwatchWorld) {
    let token = CancellationToken::new();
    token.cancel();
    world.lifecycle_cancel = Some(token);
}

// --- When steps ---

#[when(expr = "the engine runs for {int} milliseconds")]
async fn engine_runs(world: &mut HealthwatchWorld, millis: u64) {
    let prober = world.engine_prober.get_or_insert_with(Default::default).clone();
    let notifier = world
        .engine_notifier
        .get_or_insert_with(Default::default)
        .clone();
    let metrics = Arc::new(MetricsRegistry::new());
    let state = new_state_handle(&world.engine_endpoints, 100);
    let cancel = CancellationToken::new();

    let engine = Engine::new(
        world.engine_endpoints.clone(),
        prober,
        vec![notifier as Arc<dyn Notifier>],
        metrics.clone(),
        state.clone(),
        Timeouts {
            probe: Duration::from_secs(1),
            notify: Duration::from_secs(1),
        },
        cancel.clone(),
    );

    let handle = tokio::spawn(async move { engine.run().await });
    tokio::time::sleep(Duration::from_millis(millis)).await;
    cancel.cancel();

    world.engine_stopped = Some(
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_ok(),
    );
    world.engine_metrics = Some(metrics);
    world.engine_state = Some(state);
}

fn lifecycle_builder(world: &mut HealthwatchWorld) -> HealthwatchBuilder {
    let config = world.lifecycle_config.take().unwrap_or_default();
    let mut builder = HealthwatchBuilder::new(config)
        .with_prober(Arc::new(ScriptedProber::default()))
        .with_notifiers(vec![
            Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>
        ]);
    if let Some(cancel) = world.lifecycle_cancel.take() {
        builder = builder.with_cancellation_token(cancel);
    }
    builder
}

#[when("the service is built")]
fn service_is_built(world: &mut HealthwatchWorld) {
    let builder = lifecycle_builder(world);
    world.lifecycle_build_succeeded = Some(builder.build().is_ok());
}

#[when("the service is built and started")]
async fn service_is_built_and_started(world: &mut HealthwatchWorld) {
    let builder = lifecycle_builder(world);
    match builder.build() {
        Ok(service) => {
            world.lifecycle_build_succeeded = Some(true);
            let started =
                tokio::time::timeout(Duration::from_secs(5), service.start()).await;
            world.lifecycle_start_succeeded = Some(matches!(started, Ok(Ok(()))));
        }
        Err(_) => {
            world.lifecycle_build_succeeded = Some(false);
            world.lifecycle_start_succeeded = Some(false);
        }
    }
}

// --- Then steps ---

#[then("the engine should stop when cancelled")]
fn engine_stopped(world: &mut HealthwatchWorld) {
    assert_eq!(world.engine_stopped, Some(true), "engine did not stop");
}

#[then(expr = "endpoint {string} should have been checked at least {int} times")]
fn checked_at_least(world: &mut HealthwatchWorld, name: String, count: u32) {
    let prober = world.engine_prober.as_ref().expect("engine never ran");
    let calls = prober.calls(&name);
    assert!(
        calls >= count,
        "expected at least {} checks of '{}', got {}",
        count,
        name,
        calls
    );
}

#[then(expr = "endpoint {string} should be reported {word}")]
async fn reported_as(world: &mut HealthwatchWorld, name: String, availability: String) {
    let state = world.engine_state.as_ref().expect("engine never ran");
    let state = state.read().await;
    let row = state
        .get_endpoint(&name)
        .unwrap_or_else(|| panic!("no status row for '{}'", name));
    assert_eq!(row.availability.to_string(), availability);
}

#[then(expr = "endpoint {string} should have no completed checks")]
async fn no_completed_checks(world: &mut HealthwatchWorld, name: String) {
    let key = metric_key(world, &name);
    let metrics = world.engine_metrics.as_ref().expect("engine never ran");
    assert_eq!(metrics.latency_count(&key), 0);
    assert_eq!(metrics.up(&key), None);

    let state = world.engine_state.as_ref().expect("engine never ran");
    let state = state.read().await;
    assert_eq!(state.get_endpoint(&name).unwrap().last_check_epoch_ms, None);
}

#[then(expr = "the up metric for {string} should be {int}")]
fn up_metric(world: &mut HealthwatchWorld, name: String, value: u8) {
    let key = metric_key(world, &name);
    let metrics = world.engine_metrics.as_ref().expect("engine never ran");
    assert_eq!(metrics.up(&key), Some(f64::from(value)));
}

#[then(expr = "exactly one alert titled {string} should have been sent for {string}")]
fn one_alert_sent(world: &mut HealthwatchWorld, title: String, name: String) {
    let notifier = world.engine_notifier.as_ref().expect("engine never ran");
    assert_eq!(notifier.titles_for(&name), vec![title]);
}

#[then(expr = "no alert should have been sent for {string}")]
fn no_alert_sent(world: &mut HealthwatchWorld, name: String) {
    let notifier = world.engine_notifier.as_ref().expect("engine never ran");
    assert!(notifier.titles_for(&name).is_empty());
}

#[then("the build should succeed")]
fn build_should_succeed(world: &mut HealthwatchWorld) {
    assert_eq!(
        world.lifecycle_build_succeeded,
        Some(true),
        "Expected build to succeed"
    );
}

#[then("the build should fail")]
fn build_should_fail(world: &mut HealthwatchWorld) {
    assert_eq!(
        world.lifecycle_build_succeeded,
        Some(false),
        "Expected build to fail"
    );
}

#[then("the lifecycle should complete successfully")]
fn lifecycle_should_complete(world: &mut HealthwatchWorld) {
    assert_eq!(
        world.lifecycle_build_succeeded,
        Some(true),
        "Expected build to succeed"
    );
    assert_eq!(
        world.lifecycle_start_succeeded,
        Some(true),
        "Expected start to succeed"
    );
}
