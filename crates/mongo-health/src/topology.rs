//! Cluster connection-state snapshot
//!
//! The driver maintains its own view of the deployment through server
//! monitoring (SDAM). [`TopologyWatch`] subscribes to the heartbeat events of
//! a client this crate builds and folds them into a binary connection state.
//! The evaluator only ever reads the snapshot; the driver's monitor threads
//! write it.

use dashmap::DashMap;
use mongodb::event::sdam::SdamEvent;
use mongodb::event::EventHandler;
use std::fmt;
use std::sync::Arc;

/// Connection state of the cluster as last observed by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// At least one server answered its most recent heartbeat
    Connected,
    /// No server is currently reachable
    Disconnected,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterState::Connected => write!(f, "connected"),
            ClusterState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Read-only cluster-state snapshot fed by SDAM heartbeat events
///
/// Cheap to clone; all clones share the same underlying table. A server whose
/// latest heartbeat succeeded counts as up, and the cluster is connected while
/// any server is up. This works for standalone servers and replica sets alike.
#[derive(Debug, Clone, Default)]
pub struct TopologyWatch {
    servers: Arc<DashMap<String, bool>>,
}

impl TopologyWatch {
    /// Create an empty watch; disconnected until a heartbeat arrives
    pub fn new() -> Self {
        Self::default()
    }

    /// Current connection state
    pub fn state(&self) -> ClusterState {
        if self.servers.iter().any(|entry| *entry.value()) {
            ClusterState::Connected
        } else {
            ClusterState::Disconnected
        }
    }

    /// Event handler to install on the client options feeding this watch
    pub(crate) fn event_handler(&self) -> EventHandler<SdamEvent> {
        let servers = Arc::clone(&self.servers);
        EventHandler::callback(move |event: SdamEvent| match event {
            SdamEvent::ServerHeartbeatSucceeded(event) => {
                servers.insert(event.server_address.to_string(), true);
            }
            SdamEvent::ServerHeartbeatFailed(event) => {
                servers.insert(event.server_address.to_string(), false);
            }
            SdamEvent::ServerClosed(event) => {
                // Removed from the topology, e.g. a replica set reconfig
                servers.remove(&event.address.to_string());
            }
            _ => {}
        })
    }
}
