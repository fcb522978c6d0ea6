//! KNXnet/IP frame parsing and encoding.
//!
//! A frame is a fixed 6 byte header followed by a body whose layout is
//! selected by the service type identifier.
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! │  - Service-specific data    │
//! └─────────────────────────────┘
//! ```
//!
//! The declared total length must always equal the header size plus the
//! body's own encoded length. Frames violating this are rejected on decode,
//! and a frame whose header was not [normalized](KnxIpFrame::normalize)
//! refuses to encode.
//!
//! ## Example
//!
//! ```
//! use knx_client::protocol::{KnxIpBody, KnxIpFrame};
//!
//! let raw = [
//!     0x06, 0x10, 0x02, 0x07, 0x00, 0x10, 0x15, 0x00,
//!     0x08, 0x01, 0xC0, 0xA8, 0xC8, 0x0C, 0xC3, 0xB4,
//! ];
//! let frame = KnxIpFrame::from_bytes(&raw).unwrap();
//! match &frame.body {
//!     KnxIpBody::ConnectionStateRequest(body) => assert_eq!(body.channel_id, 21),
//!     other => panic!("unexpected body {other:?}"),
//! }
//! assert_eq!(frame.to_bytes().unwrap().as_slice(), &raw);
//! ```

use core::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ErrorCode, ServiceType, HEADER_SIZE_10, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};
use crate::protocol::services::{
    ConnectRequest, ConnectResponse, ConnectionStateRequest, ConnectionStateResponse,
    DisconnectRequest, DisconnectResponse, RoutingIndication, SearchRequest, TunnellingAck,
    TunnellingRequest,
};

// =============================================================================
// Byte cursors
// =============================================================================

/// Bounds-checked reader over a received byte slice.
#[derive(Debug)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(KnxError::truncated)?;
        let bytes = self.data.get(self.pos..end).ok_or_else(KnxError::truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        match self.take(1)? {
            [byte] => Ok(*byte),
            _ => Err(KnxError::truncated()),
        }
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        match self.take(2)? {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(KnxError::truncated()),
        }
    }

    /// Everything not consumed yet.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        self.pos = self.data.len();
        rest
    }
}

/// Bounds-checked writer into an output buffer.
#[derive(Debug)]
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.pos + bytes.len();
        self.buf
            .get_mut(self.pos..end)
            .ok_or_else(KnxError::payload_too_large)?
            .copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub(crate) fn u8(&mut self, value: u8) -> Result<()> {
        self.put(&[value])
    }

    pub(crate) fn u16(&mut self, value: u16) -> Result<()> {
        self.put(&value.to_be_bytes())
    }

    /// Let a nested structure encode itself at the current position.
    pub(crate) fn nested(
        &mut self,
        encode: impl FnOnce(&mut [u8]) -> Result<usize>,
    ) -> Result<()> {
        let rest = self.buf.get_mut(self.pos..).ok_or_else(KnxError::payload_too_large)?;
        self.pos += encode(rest)?;
        Ok(())
    }

    pub(crate) const fn position(&self) -> usize {
        self.pos
    }
}

// =============================================================================
// Header
// =============================================================================

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                   │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxIpHeader {
    /// Service type identifier
    pub service_type: ServiceType,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a header for a body of `body_length` bytes
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            service_type,
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse a header from a byte slice
    ///
    /// # Errors
    ///
    /// Returns a frame parse error if the buffer is shorter than the header,
    /// the header length byte is not 6 or the protocol version is not 1.0.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let header_length = reader.u8()?;
        let protocol_version = reader.u8()?;
        let service_type = ServiceType::from_u16(reader.u16()?);
        let total_length = reader.u16()?;

        if header_length != HEADER_SIZE_10 {
            return Err(KnxError::invalid_header());
        }

        if protocol_version != KNXNETIP_VERSION_10 {
            return Err(KnxError::unsupported_version());
        }

        Ok(Self {
            service_type,
            total_length,
        })
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.u8(HEADER_SIZE_10)?;
        writer.u8(KNXNETIP_VERSION_10)?;
        writer.u16(self.service_type.to_u16())?;
        writer.u16(self.total_length)?;
        Ok(writer.position())
    }

    /// Body length announced by the header
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

// =============================================================================
// HPAI
// =============================================================================

/// Host Protocol Address Information (HPAI)
///
/// IPv4 endpoint descriptor embedded in control frames.
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// IPv4 address
    pub ip: Ipv4Addr,
    /// UDP port
    pub port: u16,
}

impl Hpai {
    /// Size of HPAI structure for IPv4
    pub const SIZE: usize = 8;

    /// Create a new HPAI for IPv4 UDP
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Parse HPAI from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let structure_length = reader.u8()?;
        let host_protocol = reader.u8()?;
        let ip = reader.take(4)?;
        let port = reader.u16()?;

        if usize::from(structure_length) != Self::SIZE || host_protocol != IPV4_UDP {
            return Err(KnxError::invalid_structure());
        }

        let ip = match ip {
            [a, b, c, d] => Ipv4Addr::new(*a, *b, *c, *d),
            _ => return Err(KnxError::truncated()),
        };

        Ok(Self { ip, port })
    }

    /// Encode HPAI into bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.u8(Self::SIZE as u8)?;
        writer.u8(IPV4_UDP)?;
        writer.put(&self.ip.octets())?;
        writer.u16(self.port)?;
        Ok(writer.position())
    }
}

impl Default for Hpai {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, 0)
    }
}

impl From<SocketAddrV4> for Hpai {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<Hpai> for SocketAddrV4 {
    fn from(hpai: Hpai) -> Self {
        SocketAddrV4::new(hpai.ip, hpai.port)
    }
}

impl fmt::Display for Hpai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

// =============================================================================
// Body
// =============================================================================

/// Frame body, selected by the header's service type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnxIpBody {
    /// `SEARCH_REQUEST`
    SearchRequest(SearchRequest),
    /// `CONNECT_REQUEST`
    ConnectRequest(ConnectRequest),
    /// `CONNECT_RESPONSE`
    ConnectResponse(ConnectResponse),
    /// `CONNECTIONSTATE_REQUEST`
    ConnectionStateRequest(ConnectionStateRequest),
    /// `CONNECTIONSTATE_RESPONSE`
    ConnectionStateResponse(ConnectionStateResponse),
    /// `DISCONNECT_REQUEST`
    DisconnectRequest(DisconnectRequest),
    /// `DISCONNECT_RESPONSE`
    DisconnectResponse(DisconnectResponse),
    /// `TUNNELLING_REQUEST`
    TunnellingRequest(TunnellingRequest),
    /// `TUNNELLING_ACK`
    TunnellingAck(TunnellingAck),
    /// `ROUTING_INDICATION`
    RoutingIndication(RoutingIndication),
    /// Any service this crate has no body type for. The raw bytes are kept.
    Unsupported {
        /// Service type from the header
        service_type: ServiceType,
        /// Undecoded body bytes
        data: Vec<u8>,
    },
}

impl KnxIpBody {
    /// Default body for a service type.
    pub fn init(service_type: ServiceType) -> Self {
        match service_type {
            ServiceType::SearchRequest => Self::SearchRequest(SearchRequest::default()),
            ServiceType::ConnectRequest => Self::ConnectRequest(ConnectRequest::default()),
            ServiceType::ConnectResponse => Self::ConnectResponse(ConnectResponse::default()),
            ServiceType::ConnectionStateRequest => {
                Self::ConnectionStateRequest(ConnectionStateRequest::default())
            }
            ServiceType::ConnectionStateResponse => {
                Self::ConnectionStateResponse(ConnectionStateResponse::default())
            }
            ServiceType::DisconnectRequest => Self::DisconnectRequest(DisconnectRequest::default()),
            ServiceType::DisconnectResponse => {
                Self::DisconnectResponse(DisconnectResponse::default())
            }
            ServiceType::TunnellingRequest => Self::TunnellingRequest(TunnellingRequest::default()),
            ServiceType::TunnellingAck => Self::TunnellingAck(TunnellingAck::default()),
            ServiceType::RoutingIndication => Self::RoutingIndication(RoutingIndication::default()),
            other => Self::Unsupported {
                service_type: other,
                data: Vec::new(),
            },
        }
    }

    /// Decode the body of a `service_type` frame.
    pub fn decode(service_type: ServiceType, data: &[u8]) -> Result<Self> {
        let body = match service_type {
            ServiceType::SearchRequest => Self::SearchRequest(SearchRequest::decode(data)?),
            ServiceType::ConnectRequest => Self::ConnectRequest(ConnectRequest::decode(data)?),
            ServiceType::ConnectResponse => Self::ConnectResponse(ConnectResponse::decode(data)?),
            ServiceType::ConnectionStateRequest => {
                Self::ConnectionStateRequest(ConnectionStateRequest::decode(data)?)
            }
            ServiceType::ConnectionStateResponse => {
                Self::ConnectionStateResponse(ConnectionStateResponse::decode(data)?)
            }
            ServiceType::DisconnectRequest => {
                Self::DisconnectRequest(DisconnectRequest::decode(data)?)
            }
            ServiceType::DisconnectResponse => {
                Self::DisconnectResponse(DisconnectResponse::decode(data)?)
            }
            ServiceType::TunnellingRequest => {
                Self::TunnellingRequest(TunnellingRequest::decode(data)?)
            }
            ServiceType::TunnellingAck => Self::TunnellingAck(TunnellingAck::decode(data)?),
            ServiceType::RoutingIndication => {
                Self::RoutingIndication(RoutingIndication::decode(data)?)
            }
            other => Self::Unsupported {
                service_type: other,
                data: data.to_vec(),
            },
        };
        Ok(body)
    }

    /// Encode the body, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::SearchRequest(body) => body.encode(buf),
            Self::ConnectRequest(body) => body.encode(buf),
            Self::ConnectResponse(body) => body.encode(buf),
            Self::ConnectionStateRequest(body) => body.encode(buf),
            Self::ConnectionStateResponse(body) => body.encode(buf),
            Self::DisconnectRequest(body) => body.encode(buf),
            Self::DisconnectResponse(body) => body.encode(buf),
            Self::TunnellingRequest(body) => body.encode(buf),
            Self::TunnellingAck(body) => body.encode(buf),
            Self::RoutingIndication(body) => body.encode(buf),
            Self::Unsupported { data, .. } => {
                let mut writer = Writer::new(buf);
                writer.put(data)?;
                Ok(writer.position())
            }
        }
    }

    /// Number of bytes [`encode`](Self::encode) writes.
    pub fn encoded_length(&self) -> usize {
        match self {
            Self::SearchRequest(body) => body.encoded_length(),
            Self::ConnectRequest(body) => body.encoded_length(),
            Self::ConnectResponse(body) => body.encoded_length(),
            Self::ConnectionStateRequest(body) => body.encoded_length(),
            Self::ConnectionStateResponse(body) => body.encoded_length(),
            Self::DisconnectRequest(body) => body.encoded_length(),
            Self::DisconnectResponse(body) => body.encoded_length(),
            Self::TunnellingRequest(body) => body.encoded_length(),
            Self::TunnellingAck(body) => body.encoded_length(),
            Self::RoutingIndication(body) => body.encoded_length(),
            Self::Unsupported { data, .. } => data.len(),
        }
    }

    /// Service type this body is sent as.
    pub const fn service_type(&self) -> ServiceType {
        match self {
            Self::SearchRequest(_) => ServiceType::SearchRequest,
            Self::ConnectRequest(_) => ServiceType::ConnectRequest,
            Self::ConnectResponse(_) => ServiceType::ConnectResponse,
            Self::ConnectionStateRequest(_) => ServiceType::ConnectionStateRequest,
            Self::ConnectionStateResponse(_) => ServiceType::ConnectionStateResponse,
            Self::DisconnectRequest(_) => ServiceType::DisconnectRequest,
            Self::DisconnectResponse(_) => ServiceType::DisconnectResponse,
            Self::TunnellingRequest(_) => ServiceType::TunnellingRequest,
            Self::TunnellingAck(_) => ServiceType::TunnellingAck,
            Self::RoutingIndication(_) => ServiceType::RoutingIndication,
            Self::Unsupported { service_type, .. } => *service_type,
        }
    }

    /// Status code for bodies that carry one.
    pub const fn status_code(&self) -> Option<ErrorCode> {
        match self {
            Self::ConnectResponse(body) => Some(body.status),
            Self::ConnectionStateResponse(body) => Some(body.status),
            Self::DisconnectResponse(body) => Some(body.status),
            Self::TunnellingAck(body) => Some(body.status),
            _ => None,
        }
    }

    /// Type name used in log messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SearchRequest(_) => "SearchRequest",
            Self::ConnectRequest(_) => "ConnectRequest",
            Self::ConnectResponse(_) => "ConnectResponse",
            Self::ConnectionStateRequest(_) => "ConnectionStateRequest",
            Self::ConnectionStateResponse(_) => "ConnectionStateResponse",
            Self::DisconnectRequest(_) => "DisconnectRequest",
            Self::DisconnectResponse(_) => "DisconnectResponse",
            Self::TunnellingRequest(_) => "TunnellingRequest",
            Self::TunnellingAck(_) => "TunnellingAck",
            Self::RoutingIndication(_) => "RoutingIndication",
            Self::Unsupported { .. } => "Unsupported",
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// Owned KNXnet/IP frame: header plus decoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnxIpFrame {
    /// Frame header
    pub header: KnxIpHeader,
    /// Frame body
    pub body: KnxIpBody,
}

impl KnxIpFrame {
    /// Wrap a body into a frame with a normalized header.
    pub fn new(body: KnxIpBody) -> Self {
        let mut frame = Self {
            header: KnxIpHeader::new(body.service_type(), 0),
            body,
        };
        frame.normalize();
        frame
    }

    /// Frame holding the default body of `service_type`.
    ///
    /// The header is not normalized; fill in the body, then call
    /// [`normalize`](Self::normalize) before encoding.
    pub fn init(service_type: ServiceType) -> Self {
        Self {
            header: KnxIpHeader::new(service_type, 0),
            body: KnxIpBody::init(service_type),
        }
    }

    /// Service type from the header
    pub const fn service_type(&self) -> ServiceType {
        self.header.service_type
    }

    /// Header size plus the body's own encoded length.
    pub fn encoded_length(&self) -> usize {
        KnxIpHeader::SIZE + self.body.encoded_length()
    }

    /// Recompute the header from the body.
    pub fn normalize(&mut self) {
        self.header.service_type = self.body.service_type();
        self.header.total_length = u16::try_from(self.encoded_length()).unwrap_or(u16::MAX);
    }

    /// Check whether the header agrees with the body.
    pub fn is_normalized(&self) -> bool {
        self.header.service_type == self.body.service_type()
            && usize::from(self.header.total_length) == self.encoded_length()
    }

    /// Encode the frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the header was not normalized after the
    /// body changed, or a payload-too-large error above [`MAX_FRAME_SIZE`].
    pub fn to_bytes(&self) -> Result<heapless::Vec<u8, MAX_FRAME_SIZE>> {
        if !self.is_normalized() {
            return Err(KnxError::InvalidState);
        }

        let len = self.encoded_length();
        let mut buf = heapless::Vec::new();
        buf.resize(len, 0).ok().ok_or_else(KnxError::payload_too_large)?;

        let written = self.header.encode(&mut buf)?;
        let rest = buf.get_mut(written..).ok_or_else(KnxError::payload_too_large)?;
        self.body.encode(rest)?;
        Ok(buf)
    }

    /// Decode a complete datagram.
    ///
    /// # Errors
    ///
    /// Returns a frame parse error for truncated input, a header total length
    /// that differs from the datagram length in either direction, or a body
    /// that does not fill the announced length exactly. Frames above
    /// [`MAX_FRAME_SIZE`] are refused as too large.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = KnxIpHeader::parse(data)?;

        let total = usize::from(header.total_length);
        if total > MAX_FRAME_SIZE || data.len() > MAX_FRAME_SIZE {
            return Err(KnxError::payload_too_large());
        }
        if data.len() < total {
            return Err(KnxError::truncated());
        }
        if data.len() > total {
            return Err(KnxError::length_mismatch());
        }

        let body_data = data.get(KnxIpHeader::SIZE..).ok_or_else(KnxError::truncated)?;
        let body = KnxIpBody::decode(header.service_type, body_data)?;

        let frame = Self { header, body };
        if frame.encoded_length() != total {
            return Err(KnxError::length_mismatch());
        }
        Ok(frame)
    }
}

impl fmt::Display for KnxIpFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<KNXIPFrame {} total_length={} body={:?}>",
            self.body.name(),
            self.header.total_length,
            self.body
        )
    }
}
