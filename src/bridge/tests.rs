//! Bridge Module Tests
//!
//! Exercises construction (classification, partial-failure cleanup) and
//! the forwarding loop against an in-memory scripted connector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::connector::{BusConnection, BusConnector, ConnectorError};
use crate::lifecycle::ShutdownSignal;
use crate::message::{BusAddress, BusMessage, LinkData};
use crate::metrics::Metrics;

use super::{Bridge, BridgeError, BridgeState};

// =============================================================================
// Mock connector
// =============================================================================

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<BusMessage>,
    outbound: mpsc::UnboundedSender<BusMessage>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl BusConnection for MockConnection {
    async fn send(&mut self, message: BusMessage) -> Result<(), ConnectorError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectorError::Send("scripted failure".to_string()));
        }
        self.outbound
            .send(message)
            .map_err(|_| ConnectorError::Closed)
    }

    async fn recv(&mut self) -> Option<BusMessage> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Test-side handle to one mock connection.
struct ConnHandle {
    to_bridge: Option<mpsc::UnboundedSender<BusMessage>>,
    from_bridge: mpsc::UnboundedReceiver<BusMessage>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl ConnHandle {
    /// Feed an inbound message to the bridge.
    fn feed(&self, message: BusMessage) {
        self.to_bridge
            .as_ref()
            .expect("inbound already closed")
            .send(message)
            .unwrap();
    }

    /// Simulate the remote end terminating the connection.
    fn close_remote(&mut self) {
        self.to_bridge = None;
    }

    /// Make every subsequent send on this connection fail.
    fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Next message the bridge relayed onto this connection.
    async fn relayed(&mut self) -> BusMessage {
        timeout(Duration::from_secs(1), self.from_bridge.recv())
            .await
            .expect("timed out waiting for relayed message")
            .expect("bridge side dropped")
    }

    fn no_relayed(&mut self) -> bool {
        self.from_bridge.try_recv().is_err()
    }
}

fn conn_pair() -> (MockConnection, ConnHandle) {
    let (to_bridge, inbound) = mpsc::unbounded_channel();
    let (outbound, from_bridge) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let fail_sends = Arc::new(AtomicBool::new(false));

    let conn = MockConnection {
        inbound,
        outbound,
        closed: closed.clone(),
        fail_sends: fail_sends.clone(),
    };
    let handle = ConnHandle {
        to_bridge: Some(to_bridge),
        from_bridge,
        closed,
        fail_sends,
    };
    (conn, handle)
}

#[derive(Default)]
struct MockConnector {
    state: Mutex<ConnectorState>,
}

#[derive(Default)]
struct ConnectorState {
    tunnels: VecDeque<Result<MockConnection, ConnectorError>>,
    routers: VecDeque<Result<MockConnection, ConnectorError>>,
    tunnel_addrs: Vec<String>,
    router_addrs: Vec<String>,
}

impl MockConnector {
    fn new() -> Self {
        Self::default()
    }

    fn script_tunnel(&self) -> ConnHandle {
        let (conn, handle) = conn_pair();
        self.state.lock().unwrap().tunnels.push_back(Ok(conn));
        handle
    }

    fn script_tunnel_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .tunnels
            .push_back(Err(ConnectorError::Connect("scripted refusal".to_string())));
    }

    fn script_router(&self) -> ConnHandle {
        let (conn, handle) = conn_pair();
        self.state.lock().unwrap().routers.push_back(Ok(conn));
        handle
    }

    fn script_router_failure(&self) {
        self.state
            .lock()
            .unwrap()
            .routers
            .push_back(Err(ConnectorError::Connect("scripted refusal".to_string())));
    }

    fn tunnel_addrs(&self) -> Vec<String> {
        self.state.lock().unwrap().tunnel_addrs.clone()
    }

    fn router_addrs(&self) -> Vec<String> {
        self.state.lock().unwrap().router_addrs.clone()
    }
}

#[async_trait]
impl BusConnector for MockConnector {
    type Connection = MockConnection;

    async fn connect_tunnel(&self, addr: &str) -> Result<MockConnection, ConnectorError> {
        let mut state = self.state.lock().unwrap();
        state.tunnel_addrs.push(addr.to_string());
        state
            .tunnels
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::Connect("unscripted tunnel".to_string())))
    }

    async fn connect_router(&self, addr: &str) -> Result<MockConnection, ConnectorError> {
        let mut state = self.state.lock().unwrap();
        state.router_addrs.push(addr.to_string());
        state
            .routers
            .pop_front()
            .unwrap_or_else(|| Err(ConnectorError::Connect("unscripted router".to_string())))
    }
}

// =============================================================================
// Helpers
// =============================================================================

const GATEWAY: &str = "10.0.0.1:3671";
const MULTICAST: &str = "224.0.23.12:3671";
const UNICAST_OTHER: &str = "10.0.0.2:3671";

fn unit(payload: &'static [u8]) -> LinkData {
    LinkData::new(
        BusAddress::individual(1, 1, 1),
        BusAddress::individual(2, 2, 2),
        Bytes::from_static(payload),
    )
}

/// Poll until `cond` holds, bounded to a second.
async fn wait_until(cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(1), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn multicast_other_yields_router_endpoint() {
    let connector = MockConnector::new();
    let _gw = connector.script_tunnel();
    let _other = connector.script_router();

    Bridge::build(&connector, GATEWAY, MULTICAST).await.unwrap();

    assert_eq!(connector.tunnel_addrs(), vec![GATEWAY.to_string()]);
    assert_eq!(connector.router_addrs(), vec![MULTICAST.to_string()]);
}

#[tokio::test]
async fn unicast_other_yields_second_tunnel() {
    let connector = MockConnector::new();
    let _gw = connector.script_tunnel();
    let _other = connector.script_tunnel();

    Bridge::build(&connector, GATEWAY, UNICAST_OTHER)
        .await
        .unwrap();

    assert_eq!(
        connector.tunnel_addrs(),
        vec![GATEWAY.to_string(), UNICAST_OTHER.to_string()]
    );
    assert!(connector.router_addrs().is_empty());
}

#[tokio::test]
async fn gateway_failure_aborts_build_before_classification() {
    let connector = MockConnector::new();
    connector.script_tunnel_failure();

    let err = Bridge::build(&connector, GATEWAY, MULTICAST)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Connect(_)));
    assert!(connector.router_addrs().is_empty());
}

#[tokio::test]
async fn resolve_failure_closes_gateway() {
    let connector = MockConnector::new();
    let gw = connector.script_tunnel();

    let err = Bridge::build(&connector, GATEWAY, "definitely not an address")
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Resolve { .. }));
    assert!(gw.is_closed());
}

#[tokio::test]
async fn second_endpoint_failure_closes_gateway() {
    let connector = MockConnector::new();
    let gw = connector.script_tunnel();
    connector.script_router_failure();

    let err = Bridge::build(&connector, GATEWAY, MULTICAST)
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Connect(_)));
    assert!(gw.is_closed());
}

// =============================================================================
// Forwarding loop
// =============================================================================

async fn running_bridge(
    other_addr: &str,
) -> (ConnHandle, ConnHandle, super::BridgeHandle, Arc<Metrics>) {
    let connector = MockConnector::new();
    let gw = connector.script_tunnel();
    let other = if other_addr == MULTICAST {
        connector.script_router()
    } else {
        connector.script_tunnel()
    };

    let bridge = Bridge::build(&connector, GATEWAY, other_addr).await.unwrap();
    let metrics = Arc::new(Metrics::new());
    let handle = bridge.spawn(metrics.clone(), ShutdownSignal::new());

    (gw, other, handle, metrics)
}

#[tokio::test]
async fn engine_starts_running() {
    let (_gw, _other, handle, _metrics) = running_bridge(MULTICAST).await;
    assert_eq!(handle.state(), BridgeState::Running);
    handle.shutdown().await;
}

#[tokio::test]
async fn gateway_indications_reach_router_in_order() {
    let (gw, mut other, handle, metrics) = running_bridge(MULTICAST).await;

    gw.feed(BusMessage::DataIndication(unit(&[0x80])));
    gw.feed(BusMessage::DataIndication(unit(&[0x81])));
    gw.feed(BusMessage::DataIndication(unit(&[0x82])));

    // Router side re-emits each unit as an indication, payloads untouched.
    assert_eq!(other.relayed().await, BusMessage::DataIndication(unit(&[0x80])));
    assert_eq!(other.relayed().await, BusMessage::DataIndication(unit(&[0x81])));
    assert_eq!(other.relayed().await, BusMessage::DataIndication(unit(&[0x82])));

    assert_eq!(metrics.tunnel_events.get(), 3);
    assert_eq!(metrics.router_events.get(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn gateway_indications_reach_unicast_other_as_requests() {
    let (gw, mut other, handle, _metrics) = running_bridge(UNICAST_OTHER).await;

    gw.feed(BusMessage::DataIndication(unit(&[0x80])));
    assert_eq!(other.relayed().await, BusMessage::DataRequest(unit(&[0x80])));

    handle.shutdown().await;
}

#[tokio::test]
async fn other_indications_reach_gateway_as_requests() {
    let (mut gw, other, handle, metrics) = running_bridge(MULTICAST).await;

    other.feed(BusMessage::DataIndication(unit(&[0x42])));
    assert_eq!(gw.relayed().await, BusMessage::DataRequest(unit(&[0x42])));

    assert_eq!(metrics.router_events.get(), 1);
    assert_eq!(metrics.tunnel_events.get(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn non_indications_are_counted_but_not_relayed() {
    let (gw, mut other, handle, metrics) = running_bridge(MULTICAST).await;

    gw.feed(BusMessage::DataConfirmation(unit(&[0x80])));
    gw.feed(BusMessage::DataRequest(unit(&[0x80])));

    wait_until(|| metrics.tunnel_events.get() == 2).await;
    assert!(other.no_relayed());
    assert_eq!(metrics.router_events.get(), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn gateway_stream_close_stops_the_bridge() {
    let (mut gw, other, mut handle, _metrics) = running_bridge(MULTICAST).await;

    gw.close_remote();
    handle.stopped().await;

    assert_eq!(handle.state(), BridgeState::Stopped);
    assert!(gw.is_closed());
    assert!(other.is_closed());
}

#[tokio::test]
async fn other_stream_close_raises_the_shared_signal() {
    let connector = MockConnector::new();
    let _gw = connector.script_tunnel();
    let mut other = connector.script_router();

    let bridge = Bridge::build(&connector, GATEWAY, MULTICAST).await.unwrap();
    let shutdown = ShutdownSignal::new();
    let mut handle = bridge.spawn(Arc::new(Metrics::new()), shutdown.clone());

    other.close_remote();
    handle.stopped().await;

    assert!(shutdown.is_raised());
}

#[tokio::test]
async fn relay_failure_stops_the_bridge() {
    let connector = MockConnector::new();
    let gw = connector.script_tunnel();
    let other = connector.script_router();

    let bridge = Bridge::build(&connector, GATEWAY, MULTICAST).await.unwrap();
    let shutdown = ShutdownSignal::new();
    let mut handle = bridge.spawn(Arc::new(Metrics::new()), shutdown.clone());

    other.fail_sends();
    gw.feed(BusMessage::DataIndication(unit(&[0x80])));

    handle.stopped().await;
    assert!(shutdown.is_raised());
    assert!(gw.is_closed());
    assert!(other.is_closed());
}

#[tokio::test]
async fn external_signal_stops_the_bridge() {
    let connector = MockConnector::new();
    let gw = connector.script_tunnel();
    let other = connector.script_router();

    let bridge = Bridge::build(&connector, GATEWAY, MULTICAST).await.unwrap();
    let shutdown = ShutdownSignal::new();
    let mut handle = bridge.spawn(Arc::new(Metrics::new()), shutdown.clone());

    shutdown.raise();
    handle.stopped().await;

    assert_eq!(handle.state(), BridgeState::Stopped);
    assert!(gw.is_closed());
    assert!(other.is_closed());
}
