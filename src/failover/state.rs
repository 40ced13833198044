//! Node role state machine.

use std::fmt;

use tokio::sync::watch;

use crate::descriptor::HubDescriptor;

/// Current role of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Electing,
    Hub(HubDescriptor),
    Client(HubDescriptor),
    Degraded,
    Stopped,
}

/// `NodeState` without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Uninitialized,
    Electing,
    Hub,
    Client,
    Degraded,
    Stopped,
}

impl NodeState {
    pub fn phase(&self) -> Phase {
        match self {
            NodeState::Uninitialized => Phase::Uninitialized,
            NodeState::Electing => Phase::Electing,
            NodeState::Hub(_) => Phase::Hub,
            NodeState::Client(_) => Phase::Client,
            NodeState::Degraded => Phase::Degraded,
            NodeState::Stopped => Phase::Stopped,
        }
    }

    /// The hub this node serves or forwards to.
    pub fn hub(&self) -> Option<&HubDescriptor> {
        match self {
            NodeState::Hub(d) | NodeState::Client(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_hub(&self) -> bool {
        matches!(self, NodeState::Hub(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Electing => "electing",
            Phase::Hub => "hub",
            Phase::Client => "client",
            Phase::Degraded => "degraded",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

impl Phase {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Uninitialized, Electing)
                | (Electing, Hub)
                | (Electing, Client)
                | (Electing, Degraded)
                | (Hub, Degraded)
                | (Client, Degraded)
                | (Degraded, Electing)
        ) || (next == Stopped && self != Stopped)
    }
}

/// Publishes role changes; only the coordinator holds one.
#[derive(Debug)]
pub struct StateCell {
    tx: watch::Sender<NodeState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NodeState::Uninitialized);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> NodeState {
        self.tx.borrow().clone()
    }

    /// Apply `next` if legal. Illegal transitions are logged and ignored.
    pub fn transition(&self, next: NodeState) -> bool {
        let from = self.tx.borrow().phase();
        let to = next.phase();
        if !from.can_transition(to) {
            tracing::error!(from = %from, to = %to, "Rejected invalid role transition");
            return false;
        }
        tracing::info!(from = %from, to = %to, hub = ?next.hub().map(HubDescriptor::authority), "Role changed");
        self.tx.send_replace(next);
        true
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
