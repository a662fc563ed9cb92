//! HTTP exposition of the shipping counters.
//!
//! Serves the Prometheus text format on the configured path and a small
//! JSON health document on `/health`. Handlers only read atomics and the
//! pipeline state; they never touch the line buffer.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde_json::json;

use super::ShipperMetrics;
use crate::pipeline::{PipelineState, StateHandle};

/// Fixed health route; the metrics path may not shadow it.
pub const HEALTH_PATH: &str = "/health";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
struct RouteState {
    metrics: Arc<ShipperMetrics>,
    pipeline: StateHandle,
}

/// Build the exporter router. `path` is where the counters are served and
/// must already have passed `ShipperConfig::validate`.
pub fn router(metrics: Arc<ShipperMetrics>, pipeline: StateHandle, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(RouteState { metrics, pipeline })
}

async fn metrics_handler(State(state): State<RouteState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_prometheus(),
    )
}

/// Healthy while the pipeline is running; 503 otherwise so orchestrators
/// stop routing to a process that is starting up or draining.
async fn health_handler(State(state): State<RouteState>) -> impl IntoResponse {
    let pipeline = state.pipeline.get();
    let status_code = if pipeline == PipelineState::Running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": pipeline,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "counters": state.metrics.snapshot(),
        })),
    )
}
