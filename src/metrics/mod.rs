//! Prometheus metrics for KnxBridge
//!
//! Two counters, one per relay direction source. They are observational
//! only: the engine increments them on every inbound message, forwardable
//! or not, and nothing in the bridge reads them back.

use prometheus::{IntCounter, Opts, Registry};

mod server;

pub use server::MetricsServer;

/// All KnxBridge metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    /// Messages received from the gateway tunnel endpoint
    pub tunnel_events: IntCounter,
    /// Messages received from the other (router or tunnel) endpoint
    pub router_events: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tunnel_events = IntCounter::with_opts(Opts::new(
            "knxbridge_tunnel_events_total",
            "Messages received from the gateway tunnel endpoint",
        ))
        .unwrap();

        let router_events = IntCounter::with_opts(Opts::new(
            "knxbridge_router_events_total",
            "Messages received from the other endpoint",
        ))
        .unwrap();

        registry.register(Box::new(tunnel_events.clone())).unwrap();
        registry.register(Box::new(router_events.clone())).unwrap();

        Metrics {
            registry,
            tunnel_events,
            router_events,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
