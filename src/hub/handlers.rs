use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::hub::protocol::{HealthReport, SystemSnapshot, VersionInfo};
use crate::hub::state::HubState;
use crate::observability::metrics;

pub async fn get_health(State(state): State<Arc<HubState>>) -> Json<HealthReport> {
    Json(state.health())
}

pub async fn get_system(State(state): State<Arc<HubState>>) -> Json<SystemSnapshot> {
    Json(state.snapshot())
}

pub async fn get_version(State(state): State<Arc<HubState>>) -> Json<VersionInfo> {
    Json(state.version())
}

/// Prometheus text exposition.
pub async fn get_metrics(State(state): State<Arc<HubState>>) -> Response {
    if !state.prometheus_enabled() {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    }
    match metrics::render() {
        Some(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
