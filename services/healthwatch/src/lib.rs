//! Healthwatch - HTTP endpoint health monitoring service
//!
//! Probes every configured endpoint on its own interval, tracks an Up/Down
//! state per endpoint, sends throttled failure and recovery alerts, and
//! exposes Prometheus metrics plus a small JSON status API.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod io;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod pushover;
pub mod state;
pub mod webhook;

pub use config::{load_config, Config};
pub use error::{HealthwatchError, Result};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{NotifierConfig, ServerConfig};
use crate::email::EmailNotifier;
use crate::engine::{Engine, Timeouts};
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::metrics::MetricsRegistry;
use crate::notifier::{LogNotifier, Notifier};
use crate::probe::{HttpProber, Prober};
use crate::pushover::PushoverNotifier;
use crate::state::StateHandle;
use crate::webhook::WebhookNotifier;

/// Wires a [`Healthwatch`] together from a config, with optional overrides
pub struct HealthwatchBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    prober: Option<Arc<dyn Prober>>,
    notifiers: Option<Vec<Arc<dyn Notifier>>>,
    metrics: Option<Arc<MetricsRegistry>>,
    cancel: Option<CancellationToken>,
}

impl HealthwatchBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            prober: None,
            notifiers: None,
            metrics: None,
            cancel: None,
        }
    }

    /// HTTP client shared by the default prober and notifiers
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Replace the notifiers built from the config
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = Some(notifiers);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<Healthwatch> {
        self.config.validate()?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::with_timeout(
                self.config.defaults.notify_timeout(),
            )?),
        };
        let prober = self
            .prober
            .unwrap_or_else(|| Arc::new(HttpProber::new(Arc::clone(&http))));

        let mut notifiers = match self.notifiers {
            Some(notifiers) => notifiers,
            None => build_notifiers(&self.config.notifiers, &http)?,
        };
        if notifiers.is_empty() {
            tracing::info!("No notifiers configured, alerts will only be logged");
            notifiers.push(Arc::new(LogNotifier));
        }

        let endpoints = self.config.endpoints();
        let metrics = self.metrics.unwrap_or_default();
        let state = state::new_state_handle(&endpoints, self.config.server.history_size);
        let cancel = self.cancel.unwrap_or_default();

        let timeouts = Timeouts {
            probe: self.config.defaults.probe_timeout(),
            notify: self.config.defaults.notify_timeout(),
        };

        tracing::debug!(
            "Built healthwatch: endpoints={}, notifiers=[{}]",
            endpoints.len(),
            notifiers
                .iter()
                .map(|n| n.type_name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let engine = Engine::new(
            endpoints,
            prober,
            notifiers,
            metrics.clone(),
            Arc::clone(&state),
            timeouts,
            cancel.clone(),
        );

        Ok(Healthwatch {
            engine,
            state,
            metrics,
            server: self.config.server,
            cancel,
        })
    }
}

fn build_notifiers(
    configs: &[NotifierConfig],
    http: &Arc<dyn HttpClient>,
) -> Result<Vec<Arc<dyn Notifier>>> {
    configs
        .iter()
        .map(|config| {
            let notifier: Arc<dyn Notifier> = match config {
                NotifierConfig::Pushover { .. } => {
                    Arc::new(PushoverNotifier::new(config, Arc::clone(http))?)
                }
                NotifierConfig::Email { .. } => Arc::new(EmailNotifier::from_config(config)?),
                NotifierConfig::Webhook { url } => {
                    Arc::new(WebhookNotifier::new(url.clone(), Arc::clone(http)))
                }
                NotifierConfig::Log => Arc::new(LogNotifier),
            };
            Ok(notifier)
        })
        .collect()
}

/// A fully wired monitoring service, ready to start
pub struct Healthwatch {
    engine: Engine,
    state: StateHandle,
    metrics: Arc<MetricsRegistry>,
    server: ServerConfig,
    cancel: CancellationToken,
}

impl Healthwatch {
    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the cancellation token fires or Ctrl-C is received
    pub async fn start(self) -> Result<()> {
        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => tracing::warn!("Failed to listen for ctrl-c: {}", e),
            }
        });

        let server = if self.server.enabled {
            Some(spawn_server(
                self.server.port,
                Arc::clone(&self.state),
                Arc::clone(&self.metrics),
                self.cancel.clone(),
            ))
        } else {
            None
        };

        tracing::info!("Healthwatch engine started");

        // Blocks until cancelled
        self.engine.run().await;

        if let Some(server) = server {
            if let Err(e) = server.await {
                tracing::warn!("API server task failed: {}", e);
            }
        }

        tracing::info!("Healthwatch engine stopped");
        Ok(())
    }
}

fn spawn_server(
    port: u16,
    state: StateHandle,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let router = api::build_router(state, metrics);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(
                    "Failed to bind API server to port {}: {}. Continuing without it.",
                    port,
                    e
                );
                return;
            }
        };
        tracing::info!("Metrics and status API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await
        {
            tracing::warn!("API server error: {}", HealthwatchError::Api(e.to_string()));
        }

        tracing::debug!("API server stopped");
    })
}

/// Build and run the service with the given configuration
pub async fn run(config: Config) -> Result<()> {
    HealthwatchBuilder::new(config).build()?.start().await
}
