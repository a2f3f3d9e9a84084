//! KNX Bridge Module
//!
//! Builds and owns the two relay endpoints and runs the forwarding loop
//! between them. The "gateway" side is always a point-to-point tunnel; the
//! "other" side is classified once at construction - a multicast address
//! yields a routing-group endpoint, anything else a second tunnel. The
//! engine never re-evaluates that choice; it only sees the uniform
//! [`RelayEndpoint`] contract.
//!
//! # Failure model
//!
//! The bridge is all-or-nothing. Partial construction never leaks the
//! gateway endpoint, and any fatal condition at run time (either inbound
//! stream closing, or a relay send failing) stops the whole bridge via the
//! shared shutdown signal. There is no reconnection.

mod engine;

#[cfg(test)]
mod tests;

pub use engine::BridgeState;

use engine::BridgeEngine;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::lookup_host;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connector::{BusConnector, ConnectorError};
use crate::endpoint::{RelayEndpoint, RouterRelay, TunnelRelay};
use crate::lifecycle::ShutdownSignal;
use crate::metrics::Metrics;

/// Error type for bridge construction
#[derive(Debug)]
pub enum BridgeError {
    /// The other address could not be resolved to a socket address
    Resolve { addr: String, reason: String },
    /// Establishing a connection failed
    Connect(ConnectorError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Resolve { addr, reason } => {
                write!(f, "Cannot resolve '{}': {}", addr, reason)
            }
            BridgeError::Connect(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Connect(e) => Some(e),
            _ => None,
        }
    }
}

/// A constructed bridge: both endpoints, not yet running.
pub struct Bridge {
    gateway: Box<dyn RelayEndpoint>,
    other: Box<dyn RelayEndpoint>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

impl Bridge {
    /// Establish both endpoints.
    ///
    /// The gateway side is always a tunnel. The other side is a routing
    /// group when `other_addr` resolves to a multicast IP, otherwise a
    /// second tunnel. Every error path closes whatever was opened first.
    pub async fn build<F: BusConnector>(
        connector: &F,
        gateway_addr: &str,
        other_addr: &str,
    ) -> Result<Self, BridgeError> {
        let tunnel = connector
            .connect_tunnel(gateway_addr)
            .await
            .map_err(BridgeError::Connect)?;
        let mut gateway = TunnelRelay::new(tunnel);

        let resolved = match resolve(other_addr).await {
            Ok(addr) => addr,
            Err(e) => {
                gateway.close().await;
                return Err(e);
            }
        };

        let other: Box<dyn RelayEndpoint> = if resolved.ip().is_multicast() {
            debug!("Other side {} is multicast, joining routing group", resolved);
            match connector.connect_router(other_addr).await {
                Ok(conn) => Box::new(RouterRelay::new(conn)),
                Err(e) => {
                    gateway.close().await;
                    return Err(BridgeError::Connect(e));
                }
            }
        } else {
            debug!("Other side {} is unicast, opening second tunnel", resolved);
            match connector.connect_tunnel(other_addr).await {
                Ok(conn) => Box::new(TunnelRelay::new(conn)),
                Err(e) => {
                    gateway.close().await;
                    return Err(BridgeError::Connect(e));
                }
            }
        };

        Ok(Self {
            gateway: Box::new(gateway),
            other,
        })
    }

    /// Launch the forwarding loop as an independent task.
    ///
    /// The engine owns both endpoints from here on and closes them itself
    /// when it stops; the returned handle is how the rest of the process
    /// interacts with the running bridge.
    pub fn spawn(self, metrics: Arc<Metrics>, shutdown: ShutdownSignal) -> BridgeHandle {
        let (state_tx, state_rx) = watch::channel(BridgeState::Running);
        let engine =
            BridgeEngine::new(self.gateway, self.other, metrics, shutdown.clone(), state_tx);
        let task = tokio::spawn(engine.run());

        BridgeHandle {
            shutdown,
            state: state_rx,
            task,
        }
    }
}

/// Handle to a running bridge.
pub struct BridgeHandle {
    shutdown: ShutdownSignal,
    state: watch::Receiver<BridgeState>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Current engine state.
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Resolves once the engine has reached `Stopped` and released both
    /// endpoints.
    pub async fn stopped(&mut self) {
        let _ = self.state.wait_for(|s| *s == BridgeState::Stopped).await;
    }

    /// Raise the shutdown signal and wait for the engine to close both
    /// endpoints (gateway first, then other).
    pub async fn shutdown(self) {
        self.shutdown.raise();
        let _ = self.task.await;
    }
}

async fn resolve(addr: &str) -> Result<SocketAddr, BridgeError> {
    let mut hosts = lookup_host(addr).await.map_err(|e| BridgeError::Resolve {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;

    hosts.next().ok_or_else(|| BridgeError::Resolve {
        addr: addr.to_string(),
        reason: "no addresses returned".to_string(),
    })
}
