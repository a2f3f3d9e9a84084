//! Lifecycle Controller
//!
//! Owns the shared shutdown signal, launches the bridge engine and tears
//! everything down when the signal fires - whether it was raised by the
//! embedding process (e.g. on SIGTERM) or by the engine itself after a
//! fatal relay condition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::bridge::{Bridge, BridgeError, BridgeHandle};
use crate::connector::BusConnector;
use crate::metrics::Metrics;

/// Default grace period for co-located service shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One-shot shutdown flag shared between the engine and the controller.
///
/// Cloneable; every clone observes the same flag. Raising is idempotent,
/// and the flag never resets. Passed into the engine at construction so
/// its lifetime is independent of process globals.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Safe to call from any task, any number of times.
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been raised. Resolves immediately if
    /// it already was.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        // The sender half lives in self, so wait_for cannot fail.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordinates bridge startup and bounded-grace teardown.
pub struct Controller {
    shutdown: ShutdownSignal,
    grace: Duration,
    services: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(grace: Duration) -> Self {
        Self {
            shutdown: ShutdownSignal::new(),
            grace,
            services: Vec::new(),
        }
    }

    /// The shared signal. The embedding process raises it on an external
    /// termination request; the engine raises it on fatal relay errors.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Build the bridge and launch its forwarding loop as an independent
    /// task. Returns as soon as the loop is spawned.
    pub async fn start<F: BusConnector>(
        &self,
        connector: &F,
        gateway_addr: &str,
        other_addr: &str,
        metrics: Arc<Metrics>,
    ) -> Result<BridgeHandle, BridgeError> {
        let bridge = Bridge::build(connector, gateway_addr, other_addr).await?;
        debug!("Bridge created");
        Ok(bridge.spawn(metrics, self.shutdown.clone()))
    }

    /// Register a co-located service task (e.g. the metrics server) to be
    /// drained within the grace period on shutdown.
    pub fn register(&mut self, task: JoinHandle<()>) {
        self.services.push(task);
    }

    /// Tear down the bridge and all registered services. `None` means
    /// construction failed and there are no endpoints to close.
    ///
    /// Endpoint closes are expected to return promptly and are not subject
    /// to the grace timeout; only co-located services are.
    pub async fn shutdown(&mut self, bridge: Option<BridgeHandle>) {
        debug!("Closing bridge ...");
        self.shutdown.raise();

        if let Some(bridge) = bridge {
            bridge.shutdown().await;
        }

        for mut task in self.services.drain(..) {
            if timeout(self.grace, &mut task).await.is_err() {
                warn!(
                    "Co-located service did not stop within {:?}, aborting",
                    self.grace
                );
                task.abort();
            }
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_GRACE)
    }
}
