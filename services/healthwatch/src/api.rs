//! HTTP surface: Prometheus metrics and JSON status endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::metrics::MetricsRegistry;
use crate::state::StateHandle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// API application state
#[derive(Clone)]
pub struct ApiState {
    pub state: StateHandle,
    pub metrics: Arc<MetricsRegistry>,
}

/// Build the API axum router
pub fn build_router(state: StateHandle, metrics: Arc<MetricsRegistry>) -> Router {
    let api_state = ApiState { state, metrics };

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

async fn metrics_handler(State(api): State<ApiState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        api.metrics.render_prometheus(),
    )
}

async fn status_handler(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.state.read().await;
    axum::Json(state.endpoints.clone())
}

async fn history_handler(State(api): State<ApiState>) -> impl IntoResponse {
    let state = api.state.read().await;
    let history: Vec<_> = state.history.iter().cloned().collect();
    axum::Json(history)
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
