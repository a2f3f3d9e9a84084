//! Bridge Engine
//!
//! The bidirectional forwarding loop. One task, a fair wait over both
//! inbound streams; whichever endpoint produces a message next has it
//! examined and, if it is a data indication, relayed to the opposite
//! endpoint. Relaying is synchronous with receipt: a slow send blocks
//! intake from both sides. Messages from the same endpoint are forwarded
//! in arrival order; no ordering holds across the two streams.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::endpoint::RelayEndpoint;
use crate::lifecycle::ShutdownSignal;
use crate::message::BusMessage;
use crate::metrics::Metrics;

/// Engine run states. `Stopped` is terminal; there is no restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// The forwarding loop is consuming both inbound streams
    Running,
    /// Both endpoints have been closed
    Stopped,
}

/// Runs the forwarding loop between the gateway endpoint and the other
/// endpoint.
///
/// The engine exclusively owns both endpoints while `Running`. Any fatal
/// condition - either inbound stream closing, or a relay send failing -
/// raises the shared shutdown signal (idempotently) and ends the loop; the
/// engine then closes both endpoints and publishes `Stopped`. Errors are
/// never returned from `run`: nothing is waiting on the loop, so they are
/// logged and escalated through the signal instead.
pub struct BridgeEngine {
    gateway: Box<dyn RelayEndpoint>,
    other: Box<dyn RelayEndpoint>,
    metrics: Arc<Metrics>,
    shutdown: ShutdownSignal,
    state: watch::Sender<BridgeState>,
}

impl BridgeEngine {
    pub(crate) fn new(
        gateway: Box<dyn RelayEndpoint>,
        other: Box<dyn RelayEndpoint>,
        metrics: Arc<Metrics>,
        shutdown: ShutdownSignal,
        state: watch::Sender<BridgeState>,
    ) -> Self {
        Self {
            gateway,
            other,
            metrics,
            shutdown,
            state,
        }
    }

    /// Consume both inbound streams until the shutdown signal fires or a
    /// fatal condition raises it, then close both endpoints.
    pub async fn run(mut self) {
        debug!("Bridge engine running");

        loop {
            tokio::select! {
                _ = self.shutdown.raised() => {
                    debug!("Shutdown signal observed");
                    break;
                }

                // Receive message from the gateway.
                msg = self.gateway.recv() => {
                    match msg {
                        Some(msg) => {
                            self.metrics.tunnel_events.inc();
                            match msg {
                                BusMessage::DataIndication(data) => {
                                    debug!("tunnel: {}", data);
                                    if let Err(e) = self.other.relay(data).await {
                                        error!("Relay to other endpoint failed: {}", e);
                                        self.shutdown.raise();
                                        break;
                                    }
                                }
                                msg => debug!("tunnel (not forwarded): {}", msg.kind()),
                            }
                        }
                        None => {
                            error!("Gateway inbound stream closed");
                            self.shutdown.raise();
                            break;
                        }
                    }
                }

                // Receive message from the other endpoint.
                msg = self.other.recv() => {
                    match msg {
                        Some(msg) => {
                            self.metrics.router_events.inc();
                            match msg {
                                BusMessage::DataIndication(data) => {
                                    debug!("router: {}", data);
                                    if let Err(e) = self.gateway.relay(data).await {
                                        error!("Relay to gateway failed: {}", e);
                                        self.shutdown.raise();
                                        break;
                                    }
                                }
                                msg => debug!("router (not forwarded): {}", msg.kind()),
                            }
                        }
                        None => {
                            error!("Other inbound stream closed");
                            self.shutdown.raise();
                            break;
                        }
                    }
                }
            }
        }

        // Terminal teardown, gateway first. Closes are best-effort and
        // expected to return promptly.
        self.gateway.close().await;
        self.other.close().await;

        let _ = self.state.send(BridgeState::Stopped);
        info!("Bridge stopped");
    }
}
