//! Bus Connector Seam
//!
//! The bridge does not implement the KNXnet/IP wire protocol. It talks to
//! live connections through the traits here, and an external protocol
//! client supplies the implementations: one factory call per connection
//! kind, each yielding an object the engine can send on, receive from and
//! close.

use async_trait::async_trait;
use std::fmt;

use crate::message::BusMessage;

/// Error type for connector operations
#[derive(Debug)]
pub enum ConnectorError {
    /// Connection establishment failed
    Connect(String),
    /// The underlying connection is closed
    Closed,
    /// A send could not be delivered
    Send(String),
    /// Operation timed out
    Timeout,
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::Connect(msg) => write!(f, "Connect failed: {}", msg),
            ConnectorError::Closed => write!(f, "Connection closed"),
            ConnectorError::Send(msg) => write!(f, "Send failed: {}", msg),
            ConnectorError::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for ConnectorError {}

/// A live bus connection (tunnel or router), already past the transport
/// handshake.
///
/// Implementations are expected to keep `close` idempotent and to end the
/// inbound sequence (`recv` returning `None`) once the connection has
/// terminated, whether by remote closure, local `close` or transport error.
/// The sequence never restarts.
#[async_trait]
pub trait BusConnection: Send {
    /// Send a message over the connection.
    async fn send(&mut self, message: BusMessage) -> Result<(), ConnectorError>;

    /// Receive the next inbound message. `None` once the connection has
    /// terminated; all later calls also return `None`.
    async fn recv(&mut self) -> Option<BusMessage>;

    /// Release the underlying connection. Idempotent, best-effort.
    async fn close(&mut self);
}

/// Factory for bus connections, implemented by the protocol client.
///
/// The bridge treats both methods as opaque: addresses are passed through
/// verbatim and the returned connections are only used through
/// [`BusConnection`].
#[async_trait]
pub trait BusConnector: Send + Sync {
    type Connection: BusConnection + 'static;

    /// Establish a point-to-point tunnel connection to a gateway.
    async fn connect_tunnel(&self, addr: &str) -> Result<Self::Connection, ConnectorError>;

    /// Join a multicast routing group.
    async fn connect_router(&self, addr: &str) -> Result<Self::Connection, ConnectorError>;
}
