//! Hub HTTP/WebSocket server.
//!
//! # Responsibilities
//! - Build the axum router (`/ws`, `/healthz`, `/system`, `/version`, `/metrics`)
//! - Wire tracing and timeout middleware onto the HTTP routes
//! - Serve on an already-bound listener
//! - Broadcast `system_status` on a fixed interval
//! - Close every connection when shutdown fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::hub::handlers;
use crate::hub::state::HubState;
use crate::hub::websocket::ws_handler;
use crate::observability::metrics;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The hub's network front end.
pub struct HubServer {
    state: Arc<HubState>,
    router: Router,
}

impl HubServer {
    pub fn new(state: Arc<HubState>) -> Self {
        if state.prometheus_enabled() {
            metrics::install_prometheus();
        }
        let router = Self::build_router(Arc::clone(&state));
        Self { state, router }
    }

    /// HTTP routes get a request timeout; the upgrade route must not.
    #[allow(deprecated)]
    fn build_router(state: Arc<HubState>) -> Router {
        let http = Router::new()
            .route("/healthz", get(handlers::get_health))
            .route("/system", get(handlers::get_system))
            .route("/version", get(handlers::get_version))
            .route("/metrics", get(handlers::get_metrics))
            .layer(TimeoutLayer::new(HTTP_TIMEOUT));

        Router::new()
            .route("/ws", get(ws_handler))
            .merge(http)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &Arc<HubState> {
        &self.state
    }

    /// The router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then close every connection.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Hub server starting");

        let ticker = tokio::spawn(status_loop(Arc::clone(&self.state)));

        let state = Arc::clone(&self.state);
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Hub shutdown requested");
                state.close_all();
            })
            .await;

        self.state.close_all();
        ticker.abort();
        tracing::info!(address = %addr, "Hub server stopped");
        result
    }
}

async fn status_loop(state: Arc<HubState>) {
    let every = state.config().status_interval();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    let mut closing = state.closing();
    loop {
        tokio::select! {
            _ = ticker.tick() => state.broadcast_status(),
            changed = closing.changed() => {
                if changed.is_err() || *closing.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::LogHubConfig;
    use crate::hub::protocol::{HealthReport, SystemSnapshot};

    fn server() -> HubServer {
        let mut config = LogHubConfig::default();
        config.observability.prometheus = false;
        HubServer::new(HubState::new(&config, 17361, None))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(router: Router, uri: &str) -> (StatusCode, Option<T>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, serde_json::from_slice(&bytes).ok())
    }

    #[tokio::test]
    async fn healthz_reports_pid() {
        let (status, body) = get_json::<HealthReport>(server().router(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body.status, "healthy");
        assert_eq!(body.pid, std::process::id());
    }

    #[tokio::test]
    async fn system_snapshot_is_empty_at_start() {
        let (status, body) = get_json::<SystemSnapshot>(server().router(), "/system").await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body.buffer_occupancy, 0);
        assert_eq!(body.port, 17361);
        assert!(body.connections.is_empty());
    }

    #[tokio::test]
    async fn metrics_disabled_is_not_found() {
        let (status, _) = get_json::<serde_json::Value>(server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
