//! Link-layer data model
//!
//! The bridge relays link-layer data units between two bus connections
//! without looking inside them. The types here carry just enough structure
//! for logging and for the connector seam; payloads stay opaque.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

/// A KNX address in its 16-bit wire form.
///
/// Covers both individual addresses (`area.line.device`) and group
/// addresses; the bridge never distinguishes the two, the form only
/// matters for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusAddress(pub u16);

impl BusAddress {
    /// Individual address: 4-bit area, 4-bit line, 8-bit device.
    pub fn individual(area: u8, line: u8, device: u8) -> Self {
        Self(((area as u16 & 0x0f) << 12) | ((line as u16 & 0x0f) << 8) | device as u16)
    }

    /// Group address: 5-bit main, 3-bit middle, 8-bit sub.
    pub fn group(main: u8, middle: u8, sub: u8) -> Self {
        Self(((main as u16 & 0x1f) << 11) | ((middle as u16 & 0x07) << 8) | sub as u16)
    }

    /// Raw 16-bit wire value.
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            (self.0 >> 12) & 0x0f,
            (self.0 >> 8) & 0x0f,
            self.0 & 0xff
        )
    }
}

/// Error parsing a textual bus address.
#[derive(Debug, PartialEq, Eq)]
pub struct AddressParseError(String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bus address: {}", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for BusAddress {
    type Err = AddressParseError;

    /// Parses the dotted individual form, e.g. `1.1.1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let (a, l, d) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(l), Some(d), None) => (a, l, d),
            _ => return Err(AddressParseError(s.to_string())),
        };

        let area: u8 = a.parse().map_err(|_| AddressParseError(s.to_string()))?;
        let line: u8 = l.parse().map_err(|_| AddressParseError(s.to_string()))?;
        let device: u8 = d.parse().map_err(|_| AddressParseError(s.to_string()))?;

        if area > 0x0f || line > 0x0f {
            return Err(AddressParseError(s.to_string()));
        }

        Ok(BusAddress::individual(area, line, device))
    }
}

/// The link-layer data unit being relayed: bus addresses plus application
/// payload. Forwarded byte-identical; the bridge never inspects or mutates
/// the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkData {
    /// Originating bus address
    pub source: BusAddress,
    /// Destination bus address (individual or group)
    pub destination: BusAddress,
    /// Application payload (TPDU), opaque to the bridge
    pub payload: Bytes,
}

impl LinkData {
    pub fn new(source: BusAddress, destination: BusAddress, payload: Bytes) -> Self {
        Self {
            source,
            destination,
            payload,
        }
    }
}

impl fmt::Display for LinkData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({} bytes)",
            self.source,
            self.destination,
            self.payload.len()
        )
    }
}

/// cEMI-level application messages surfaced by a bus connection.
///
/// Only data indications carry forwardable traffic; the other kinds are
/// observed and dropped by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// An explicit send request directed at a point-to-point connection
    DataRequest(LinkData),
    /// Traffic observed on the bus (broadcast/group semantics)
    DataIndication(LinkData),
    /// Send confirmation reported by a gateway
    DataConfirmation(LinkData),
}

impl BusMessage {
    /// The unit to forward, if this message carries one.
    pub fn indication(&self) -> Option<&LinkData> {
        match self {
            BusMessage::DataIndication(data) => Some(data),
            _ => None,
        }
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BusMessage::DataRequest(_) => "L_Data.req",
            BusMessage::DataIndication(_) => "L_Data.ind",
            BusMessage::DataConfirmation(_) => "L_Data.con",
        }
    }
}
