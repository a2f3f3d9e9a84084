//! Relay Endpoint Abstraction
//!
//! Uniform contract over the two connection kinds the bridge can hold.
//! Which variant wraps which side is decided once, at construction, by the
//! factory; the engine only ever sees `dyn RelayEndpoint`.
//!
//! The variants differ in the envelope they put around an outgoing unit:
//! a tunnel is a point-to-point connection, so it takes explicit send
//! requests; a router speaks group semantics, so it re-emits the unit as
//! an indication ("I observed this on the bus").

use async_trait::async_trait;

use crate::connector::{BusConnection, ConnectorError};
use crate::message::{BusMessage, LinkData};


/// Uniform contract implemented by both endpoint variants.
#[async_trait]
pub trait RelayEndpoint: Send {
    /// Send the unit outward, wrapped in the variant-appropriate envelope.
    async fn relay(&mut self, data: LinkData) -> Result<(), ConnectorError>;

    /// Next inbound message; `None` once the connection has terminated.
    async fn recv(&mut self) -> Option<BusMessage>;

    /// Release the underlying connection. Idempotent.
    async fn close(&mut self);
}

/// Point-to-point endpoint: relays units as data requests.
pub struct TunnelRelay<C> {
    conn: C,
}

impl<C: BusConnection> TunnelRelay<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C: BusConnection> RelayEndpoint for TunnelRelay<C> {
    async fn relay(&mut self, data: LinkData) -> Result<(), ConnectorError> {
        self.conn.send(BusMessage::DataRequest(data)).await
    }

    async fn recv(&mut self) -> Option<BusMessage> {
        self.conn.recv().await
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

/// Group/broadcast endpoint: relays units as data indications.
pub struct RouterRelay<C> {
    conn: C,
}

impl<C: BusConnection> RouterRelay<C> {
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C: BusConnection> RelayEndpoint for RouterRelay<C> {
    async fn relay(&mut self, data: LinkData) -> Result<(), ConnectorError> {
        self.conn.send(BusMessage::DataIndication(data)).await
    }

    async fn recv(&mut self) -> Option<BusMessage> {
        self.conn.recv().await
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}
