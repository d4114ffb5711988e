//! Engine: one check loop per endpoint

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::metrics::{MetricKey, MetricsSink, NotificationMetric};
use crate::monitor::{Availability, EndpointMonitor, NotificationIntent};
use crate::notifier::{epoch_ms, Notification, Notifier};
use crate::probe::{CheckResult, FailureCause, Prober};
use crate::state::StateHandle;

/// Consecutive failures at which an endpoint is flagged in the log
const CONSECUTIVE_FAILURE_WARNING: u32 = 5;

/// Per-call time limits
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub probe: Duration,
    pub notify: Duration,
}

/// The engine runs an independent check loop for every endpoint
pub struct Engine {
    endpoints: Vec<Arc<Endpoint>>,
    prober: Arc<dyn Prober>,
    notifiers: Vec<Arc<dyn Notifier>>,
    metrics: Arc<dyn MetricsSink>,
    state: StateHandle,
    timeouts: Timeouts,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        endpoints: Vec<Endpoint>,
        prober: Arc<dyn Prober>,
        notifiers: Vec<Arc<dyn Notifier>>,
        metrics: Arc<dyn MetricsSink>,
        state: StateHandle,
        timeouts: Timeouts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            prober,
            notifiers,
            metrics,
            state,
            timeouts,
            cancel,
        }
    }

    /// Start a check loop per endpoint. Returns once the cancellation token
    /// is triggered and every loop has exited.
    pub async fn run(&self) {
        let mut handles = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let task = EndpointTask {
                monitor: EndpointMonitor::new(Arc::clone(endpoint)),
                cycle: Arc::new(Cycle {
                    endpoint: Arc::clone(endpoint),
                    key: MetricKey::from(endpoint.as_ref()),
                    prober: Arc::clone(&self.prober),
                    notifiers: self.notifiers.clone(),
                    metrics: Arc::clone(&self.metrics),
                    state: Arc::clone(&self.state),
                    timeouts: self.timeouts,
                }),
                cancel: self.cancel.clone(),
            };
            handles.push(tokio::spawn(task.run()));
        }

        // Wait for cancellation
        self.cancel.cancelled().await;

        // Wait for all check loops to finish
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Check loop exited abnormally: {}", e);
            }
        }
    }
}

/// A single endpoint's loop. Owns the monitor between cycles.
struct EndpointTask {
    monitor: EndpointMonitor,
    cycle: Arc<Cycle>,
    cancel: CancellationToken,
}

impl EndpointTask {
    async fn run(mut self) {
        let endpoint = Arc::clone(&self.cycle.endpoint);
        tracing::info!(
            "Monitoring '{}' at {} every {:?}",
            endpoint.name,
            endpoint.url,
            endpoint.check_interval
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(endpoint.check_interval) => {}
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Check loop for '{}' cancelled", endpoint.name);
                    break;
                }
            }
        }
    }

    /// Run one cycle in its own task. If it panics the monitor keeps the
    /// state it had before the cycle.
    async fn run_cycle(&mut self) {
        let cycle = Arc::clone(&self.cycle);
        let monitor = self.monitor.clone();
        let started = Instant::now();

        match tokio::spawn(async move { cycle.check_once(monitor).await }).await {
            Ok(monitor) => self.monitor = monitor,
            Err(e) => tracing::error!(
                "Check cycle for '{}' failed after {:?}: {}",
                self.cycle.endpoint.name,
                started.elapsed(),
                e
            ),
        }
    }
}

/// What every cycle of one endpoint shares
struct Cycle {
    endpoint: Arc<Endpoint>,
    key: MetricKey,
    prober: Arc<dyn Prober>,
    notifiers: Vec<Arc<dyn Notifier>>,
    metrics: Arc<dyn MetricsSink>,
    state: StateHandle,
    timeouts: Timeouts,
}

impl Cycle {
    async fn check_once(&self, mut monitor: EndpointMonitor) -> EndpointMonitor {
        let result = self.probe().await;

        let now = SystemTime::now();
        let evaluation = monitor.process(&result, now);
        evaluation.metrics.apply(&self.key, self.metrics.as_ref());

        let previous = monitor.state().availability;
        let current = evaluation.next.availability;
        match (previous, current) {
            (Availability::Up, Availability::Down) => tracing::warn!(
                "'{}' is DOWN: {}",
                self.endpoint.name,
                result.cause().map(|c| c.to_string()).unwrap_or_default()
            ),
            (Availability::Down, Availability::Up) => {
                tracing::info!("'{}' has RECOVERED", self.endpoint.name)
            }
            _ => tracing::debug!(
                "Check '{}': {} ({}, {:?})",
                self.endpoint.name,
                current,
                result.outcome_label(),
                result.latency
            ),
        }

        let failures = self.state.write().await.record_check(
            &self.endpoint.name,
            &result,
            &evaluation.next,
            epoch_ms(now),
        );
        if failures == Some(CONSECUTIVE_FAILURE_WARNING) {
            tracing::warn!(
                "Endpoint '{}' has {} consecutive failures",
                self.endpoint.name,
                CONSECUTIVE_FAILURE_WARNING
            );
        }

        monitor.commit(evaluation.next);

        if let Some(intent) = evaluation.intent {
            self.notify(&mut monitor, intent).await;
        }
        monitor
    }

    /// Probe the endpoint. A prober that overruns the timeout counts as a timeout.
    async fn probe(&self) -> CheckResult {
        let timeout = self.timeouts.probe;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.prober.probe(&self.endpoint, timeout)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Probe of '{}' did not return within {:?}",
                    self.endpoint.name,
                    timeout
                );
                CheckResult::unhealthy(FailureCause::Timeout, started.elapsed())
            }
        }
    }

    async fn notify(&self, monitor: &mut EndpointMonitor, intent: NotificationIntent) {
        let notification = Notification::from_intent(&intent);
        tracing::warn!(
            "Sending {} alert for '{}': {}",
            intent.kind,
            self.endpoint.name,
            notification.title
        );

        let notifiers = self.notifiers.clone();
        let state = Arc::clone(&self.state);
        let timeout = self.timeouts.notify;
        let delivered = match tokio::spawn(async move {
            crate::dispatch::deliver(&notification, &notifiers, &state, timeout).await
        })
        .await
        {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!("Dispatch for '{}' failed: {}", self.endpoint.name, e);
                false
            }
        };

        if delivered {
            self.metrics
                .inc_notification(&self.key, intent.delivered_metric());
            monitor.record_delivery(&intent);
            if let Some(at) = monitor.state().last_alert {
                self.state
                    .write()
                    .await
                    .record_alert(&self.endpoint.name, epoch_ms(at));
            }
        } else {
            tracing::warn!(
                "No notifier delivered the {} alert for '{}'",
                intent.kind,
                self.endpoint.name
            );
            self.metrics
                .inc_notification(&self.key, NotificationMetric::DeliveryFailed);
        }
    }
}
