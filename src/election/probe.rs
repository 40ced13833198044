//! Hub liveness probing.
//!
//! # Responsibilities
//! - Check that a descriptor's process still exists
//! - `GET /healthz` within a deadline and confirm the reported pid

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::descriptor::HubDescriptor;
use crate::hub::protocol::HealthReport;

/// Liveness checks used by election and failover.
pub trait HubProbe: Send + Sync + 'static {
    /// Whether the process `pid` exists. `0` (unknown) is treated as alive.
    fn pid_alive(&self, pid: u32) -> bool;

    /// Whether the hub behind `descriptor` answers its health check.
    fn is_live(&self, descriptor: &HubDescriptor) -> impl Future<Output = bool> + Send;
}

/// Probe over HTTP with the hyper client.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client, timeout }
    }

    async fn health(&self, descriptor: &HubDescriptor) -> Option<HealthReport> {
        let request = match Request::builder()
            .method("GET")
            .uri(descriptor.http_url("/healthz"))
            .header("user-agent", "loghub-probe")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build health probe request");
                return None;
            }
        };

        let response = match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::debug!(hub = %descriptor.authority(), error = %e, "Health probe failed: connection error");
                return None;
            }
            Err(_) => {
                tracing::debug!(hub = %descriptor.authority(), "Health probe failed: timeout");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(hub = %descriptor.authority(), status = %response.status(), "Health probe failed: non-success status");
            return None;
        }

        let body = Body::new(response.into_body());
        let bytes = match time::timeout(self.timeout, axum::body::to_bytes(body, 64 * 1024)).await {
            Ok(Ok(bytes)) => bytes,
            _ => return None,
        };
        serde_json::from_slice(&bytes).ok()
    }
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe").field("timeout", &self.timeout).finish()
    }
}

impl HubProbe for HttpProbe {
    fn pid_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }

    async fn is_live(&self, descriptor: &HubDescriptor) -> bool {
        if !self.pid_alive(descriptor.pid) {
            return false;
        }
        match self.health(descriptor).await {
            Some(report) => descriptor.pid == 0 || report.pid == descriptor.pid,
            None => false,
        }
    }
}

/// Whether a process with this pid exists.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return true;
    }
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 checks existence without delivering anything.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    true
}
