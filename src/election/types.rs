//! Election outcomes and errors.

use thiserror::Error;
use tokio::net::TcpListener;

use crate::descriptor::{DescriptorError, HubDescriptor, LockRecord, StoreError};

/// Role decided by an election.
#[derive(Debug)]
pub enum Elected {
    Hub(HubLease),
    Client(HubDescriptor),
}

/// Everything the winner needs to start serving: the bound listener and
/// the lock it holds.
#[derive(Debug)]
pub struct HubLease {
    pub listener: TcpListener,
    pub lock: LockRecord,
    pub host: String,
    pub port: u16,
    pub token: Option<String>,
}

impl HubLease {
    /// The descriptor to publish once the server is accepting.
    pub fn descriptor(&self) -> HubDescriptor {
        HubDescriptor::new(self.host.clone(), self.port, self.lock.pid, self.token.clone())
    }
}

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no free hub port: {0}")]
    PortsExhausted(#[source] crate::net::ListenerError),

    #[error("hub lock still contended after {attempts} attempts")]
    Contended { attempts: u32 },

    #[error("invalid remote hub: {0}")]
    InvalidRemote(#[source] DescriptorError),
}

impl ElectionError {
    /// Fatal errors stop the coordinator; the rest are retried.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ElectionError::Store(StoreError::Io { .. }))
    }
}
