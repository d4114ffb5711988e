//! BDD step definitions for probe classification feature

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when};

use healthwatch::endpoint::{Endpoint, ExpectedStatus};
use healthwatch::io::{HttpClient, HttpResponse};
use healthwatch::probe::{HttpProber, Prober};
use healthwatch::HealthwatchError;

use crate::world::HealthwatchWorld;

/// How the stub server answers a GET
#[derive(Debug, Clone)]
pub enum StubReply {
    Status(u16),
    Refused,
    TimedOut,
    Silent,
}

#[derive(Debug)]
struct StubHttpClient {
    reply: StubReply,
}

#[async_trait::async_trait]
impl HttpClient for StubHttpClient {
    async fn get(&self, _url: &str, timeout: Duration) -> healthwatch::Result<HttpResponse> {
        match &self.reply {
            StubReply::Status(status) => Ok(HttpResponse {
                status: *status,
                body: String::new(),
            }),
            StubReply::Refused => Err(HealthwatchError::Connection(
                "connection refused".to_string(),
            )),
            StubReply::TimedOut => Err(HealthwatchError::Timeout(timeout)),
            StubReply::Silent => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(HealthwatchError::Timeout(timeout))
            }
        }
    }

    async fn post_form(
        &self,
        _url: &str,
        _params: &[(&str, &str)],
    ) -> healthwatch::Result<HttpResponse> {
        unreachable!("probes never POST")
    }

    async fn post_json(
        &self,
        _url: &str,
        _body: &serde_json::Value,
    ) -> healthwatch::Result<HttpResponse> {
        unreachable!("probes never POST")
    }
}

fn set_expectation(world: &mut HealthwatchWorld, expect: ExpectedStatus) {
    world.probe_endpoint = Some(Endpoint {
        name: "Main API".to_string(),
        url: "http://localhost:8080/health".to_string(),
        expect,
        check_interval: Duration::from_secs(60),
        suppression_window: Duration::from_secs(3600),
    });
}

// --- Given steps ---

#[given(expr = "an endpoint expecting status {int}")]
fn expecting_status(world: &mut HealthwatchWorld, code: u16) {
    set_expectation(world, ExpectedStatus::Status { code });
}

#[given("an endpoint expecting any 2xx status")]
fn expecting_success(world: &mut HealthwatchWorld) {
    set_expectation(world, ExpectedStatus::Success);
}

#[given(expr = "an endpoint expecting a status between {int} and {int}")]
fn expecting_range(world: &mut HealthwatchWorld, min: u16, max: u16) {
    set_expectation(world, ExpectedStatus::Range { min, max });
}

#[given(expr = "the endpoint responds with status {int}")]
fn responds_with(world: &mut HealthwatchWorld, status: u16) {
    world.probe_reply = Some(StubReply::Status(status));
}

#[given("the endpoint refuses connections")]
fn refuses(world: &mut HealthwatchWorld) {
    world.probe_reply = Some(StubReply::Refused);
}

#[given("the endpoint times out")]
fn times_out(world: &mut HealthwatchWorld) {
    world.probe_reply = Some(StubReply::TimedOut);
}

#[given(expr = "the endpoint never answers within a {int} millisecond timeout")]
fn never_answers(world: &mut HealthwatchWorld, millis: u64) {
    world.probe_reply = Some(StubReply::Silent);
    world.probe_timeout = Some(Duration::from_millis(millis));
}

// --- When steps ---

#[when("the endpoint is probed")]
async fn endpoint_is_probed(world: &mut HealthwatchWorld) {
    let endpoint = world.probe_endpoint.clone().expect("no endpoint configured");
    let reply = world.probe_reply.clone().expect("no reply configured");
    let timeout = world.probe_timeout.unwrap_or(Duration::from_secs(1));

    let prober = HttpProber::new(Arc::new(StubHttpClient { reply }));
    world.check = Some(prober.probe(&endpoint, timeout).await);
}

// --- Then steps ---

#[then("the check should be healthy")]
fn check_healthy(world: &mut HealthwatchWorld) {
    let check = world.check.as_ref().expect("no check ran");
    assert!(check.is_healthy(), "expected healthy, got {:?}", check);
}

#[then(expr = "the check outcome should be {string}")]
fn check_outcome(world: &mut HealthwatchWorld, outcome: String) {
    let check = world.check.as_ref().expect("no check ran");
    assert_eq!(check.outcome_label(), outcome);
}

#[then(expr = "the failure should read {string}")]
fn failure_reads(world: &mut HealthwatchWorld, detail: String) {
    let check = world.check.as_ref().expect("no check ran");
    let cause = check.cause().expect("expected an unhealthy check");
    assert_eq!(cause.to_string(), detail);
}

#[then(expr = "the recorded status code should be {int}")]
fn status_code_recorded(world: &mut HealthwatchWorld, code: u16) {
    let check = world.check.as_ref().expect("no check ran");
    assert_eq!(check.status_code, Some(code));
}

#[then("no status code should be recorded")]
fn no_status_code(world: &mut HealthwatchWorld) {
    let check = world.check.as_ref().expect("no check ran");
    assert_eq!(check.status_code, None);
}
