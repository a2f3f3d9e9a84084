//! KnxBridge - KNXnet/IP tunnel/router bridging engine
//!
//! Bridges a point-to-point KNXnet/IP gateway tunnel with a second bus
//! endpoint - a multicast routing group, or another tunnel - relaying
//! link-layer traffic in both directions. The wire protocol itself is an
//! external collaborator reached through the [`connector`] traits; this
//! crate supplies the endpoint abstraction, the one-time endpoint
//! classification, the forwarding loop and the lifecycle/shutdown model,
//! plus configuration loading and Prometheus metrics.

pub mod bridge;
pub mod config;
pub mod connector;
pub mod endpoint;
pub mod lifecycle;
pub mod message;
pub mod metrics;

pub use bridge::{Bridge, BridgeError, BridgeHandle, BridgeState};
pub use config::Config;
pub use connector::{BusConnection, BusConnector, ConnectorError};
pub use endpoint::{RelayEndpoint, RouterRelay, TunnelRelay};
pub use lifecycle::{Controller, ShutdownSignal, DEFAULT_SHUTDOWN_GRACE};
pub use message::{BusAddress, BusMessage, LinkData};
pub use metrics::{Metrics, MetricsServer};
