//! Port-range TCP binding for the hub.
//!
//! # Responsibilities
//! - Bind the first free port in `base_port..base_port + port_range`
//! - Distinguish "port taken" from real bind failures

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("no free port in {host}:{first}..={last}")]
    Exhausted { host: String, first: u16, last: u16 },

    #[error("empty port range starting at {0}")]
    EmptyRange(u16),
}

/// A listener bound inside the configured range.
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
}

/// Bind the first free port in the range on `host`.
pub async fn bind_in_range(host: &str, base_port: u16, port_range: u16) -> Result<BoundListener, ListenerError> {
    if port_range == 0 {
        return Err(ListenerError::EmptyRange(base_port));
    }
    let last = base_port.saturating_add(port_range - 1);

    for port in base_port..=last {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
                    host: host.to_string(),
                    port,
                    source,
                })?;
                tracing::info!(address = %local_addr, "Hub listener bound");
                return Ok(BoundListener { listener, local_addr });
            }
            Err(e) if is_port_taken(&e) => {
                tracing::debug!(host, port, error = %e, "Port unavailable, trying next");
            }
            Err(source) => {
                return Err(ListenerError::Bind {
                    host: host.to_string(),
                    port,
                    source,
                })
            }
        }
    }

    Err(ListenerError::Exhausted {
        host: host.to_string(),
        first: base_port,
        last,
    })
}

fn is_port_taken(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied)
}
