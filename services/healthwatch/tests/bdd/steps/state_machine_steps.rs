//! BDD step definitions for the availability state machine feature

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cucumber::{given, then, when};

use healthwatch::endpoint::{Endpoint, ExpectedStatus};
use healthwatch::monitor::{EndpointMonitor, NotificationKind};
use healthwatch::probe::{CheckResult, FailureCause};

use crate::world::HealthwatchWorld;

/// Scenario times are offsets from a fixed instant
fn at(seconds: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seconds)
}

fn process(world: &mut HealthwatchWorld, result: CheckResult, seconds: u64) {
    let monitor = world.monitor.as_mut().expect("no endpoint configured");
    let evaluation = monitor.process(&result, at(seconds));
    monitor.commit(evaluation.next);
    world.last_intent = evaluation.intent.clone();

    if let Some(intent) = evaluation.intent {
        if !world.notifier_failing {
            monitor.record_delivery(&intent);
            world.delivered.push(intent);
        }
    }
}

// --- Given steps ---

#[given(expr = "an endpoint {string} with a suppression window of {int} seconds")]
fn endpoint_with_window(world: &mut HealthwatchWorld, name: String, window: u64) {
    let endpoint = Endpoint {
        name,
        url: "http://service.local/health".to_string(),
        expect: ExpectedStatus::Success,
        check_interval: Duration::from_secs(60),
        suppression_window: Duration::from_secs(window),
    };
    world.monitor = Some(EndpointMonitor::new(Arc::new(endpoint)));
}

#[given("the notifier is failing")]
fn notifier_failing(world: &mut HealthwatchWorld) {
    world.notifier_failing = true;
}

// --- When steps ---

#[when("the notifier recovers")]
fn notifier_recovers(world: &mut HealthwatchWorld) {
    world.notifier_failing = false;
}

#[when(expr = "a check fails with status {int} at {int} seconds")]
fn check_fails_with_status(world: &mut HealthwatchWorld, status: u16, seconds: u64) {
    let result = CheckResult::unhealthy(FailureCause::BadStatus(status), Duration::from_millis(80));
    process(world, result, seconds);
}

#[when(expr = "a check times out at {int} seconds")]
fn check_times_out(world: &mut HealthwatchWorld, seconds: u64) {
    let result = CheckResult::unhealthy(FailureCause::Timeout, Duration::from_secs(10));
    process(world, result, seconds);
}

#[when(expr = "a check succeeds at {int} seconds")]
fn check_succeeds(world: &mut HealthwatchWorld, seconds: u64) {
    let result = CheckResult::healthy(200, Duration::from_millis(15));
    process(world, result, seconds);
}

// --- Then steps ---

#[then("a failure alert should be raised")]
fn failure_alert_raised(world: &mut HealthwatchWorld) {
    let intent = world.last_intent.as_ref().expect("expected an alert");
    assert_eq!(intent.kind, NotificationKind::Failure);
    assert!(
        intent.previous_alert.is_none(),
        "expected an initial alert, got a recurring one"
    );
}

#[then("a recurring failure alert should be raised")]
fn recurring_alert_raised(world: &mut HealthwatchWorld) {
    let intent = world.last_intent.as_ref().expect("expected an alert");
    assert_eq!(intent.kind, NotificationKind::Failure);
    assert!(intent.is_recurring(), "expected a recurring alert");
}

#[then("a recovery alert should be raised")]
fn recovery_alert_raised(world: &mut HealthwatchWorld) {
    let intent = world.last_intent.as_ref().expect("expected an alert");
    assert_eq!(intent.kind, NotificationKind::Recovery);
}

#[then("no alert should be raised")]
fn no_alert_raised(world: &mut HealthwatchWorld) {
    assert!(
        world.last_intent.is_none(),
        "expected no alert, got {:?}",
        world.last_intent
    );
}

#[then(expr = "the endpoint should be {word}")]
fn endpoint_should_be(world: &mut HealthwatchWorld, availability: String) {
    let monitor = world.monitor.as_ref().expect("no endpoint configured");
    assert_eq!(monitor.state().availability.to_string(), availability);
}

#[then(expr = "the last alert should be at {int} seconds")]
fn last_alert_at(world: &mut HealthwatchWorld, seconds: u64) {
    let monitor = world.monitor.as_ref().expect("no endpoint configured");
    assert_eq!(monitor.state().last_alert, Some(at(seconds)));
}

#[then("no last alert should be recorded")]
fn no_last_alert(world: &mut HealthwatchWorld) {
    let monitor = world.monitor.as_ref().expect("no endpoint configured");
    assert_eq!(monitor.state().last_alert, None);
}

#[then(expr = "{int} alert(s) should have been delivered")]
fn alerts_delivered(world: &mut HealthwatchWorld, count: usize) {
    assert_eq!(world.delivered.len(), count, "{:?}", world.delivered);
}
