//! KNXnet/IP service bodies.
//!
//! Each body knows its own wire layout: `decode` from the bytes following
//! the frame header, `encode` into a caller supplied buffer and
//! `encoded_length` for the header's total length field.
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                          Gateway
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELLING_REQUEST ----->|
//!   |<------ TUNNELLING_ACK ---------|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|  (every 60s)
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```

use crate::addressing::PhysicalAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::CemiFrame;
use crate::protocol::constants::{
    ErrorCode, KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR, TUNNEL_CONNECTION, TUNNEL_LINKLAYER,
};
use crate::protocol::frame::{Hpai, Reader, Writer};

/// Connection Request Information (CRI) for tunnelling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    /// Size of the structure in bytes
    pub const SIZE: usize = 4;

    /// CRI for a tunnel link layer connection
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    /// Encode CRI to bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.put(&[Self::SIZE as u8, self.connection_type, self.knx_layer, 0x00])?;
        Ok(writer.position())
    }

    /// Decode CRI from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        match Reader::new(data).take(Self::SIZE)? {
            [4, connection_type, knx_layer, _] => Ok(Self {
                connection_type: *connection_type,
                knx_layer: *knx_layer,
            }),
            _ => Err(KnxError::invalid_structure()),
        }
    }
}

impl Default for ConnectionRequestInfo {
    fn default() -> Self {
        Self::tunnel_link_layer()
    }
}

/// Connection Response Data Block (CRD)
///
/// For tunnel connections it carries the individual address the gateway
/// assigned to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionResponseData {
    /// Connection type echoed by the gateway
    pub connection_type: u8,
    /// Individual address assigned to the tunnel
    pub identifier: PhysicalAddress,
}

impl ConnectionResponseData {
    /// Size of the structure in bytes
    pub const SIZE: usize = 4;

    /// Encode CRD to bytes
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.u8(Self::SIZE as u8)?;
        writer.u8(self.connection_type)?;
        writer.u16(self.identifier.raw())?;
        Ok(writer.position())
    }

    /// Decode CRD from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        match Reader::new(data).take(Self::SIZE)? {
            [4, connection_type, hi, lo] => Ok(Self {
                connection_type: *connection_type,
                identifier: PhysicalAddress::from(u16::from_be_bytes([*hi, *lo])),
            }),
            _ => Err(KnxError::invalid_structure()),
        }
    }
}

impl Default for ConnectionResponseData {
    fn default() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            identifier: PhysicalAddress::from(0),
        }
    }
}

/// `SEARCH_REQUEST` service (0x0201)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchRequest {
    /// Endpoint search responses are sent to
    pub discovery_endpoint: Hpai,
}

impl SearchRequest {
    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self {
            discovery_endpoint: Hpai::decode(data)?,
        })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        self.discovery_endpoint.encode(buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        Hpai::SIZE
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            discovery_endpoint: Hpai::new(KNXNETIP_MULTICAST_ADDR, KNXNETIP_DEFAULT_PORT),
        }
    }
}

/// `CONNECT_REQUEST` service (0x0205)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectRequest {
    /// Control endpoint (for connection management)
    pub control_endpoint: Hpai,
    /// Data endpoint (for tunnelling data)
    pub data_endpoint: Hpai,
    /// Connection request information
    pub cri: ConnectionRequestInfo,
}

impl ConnectRequest {
    /// Create a new tunnel link layer `CONNECT_REQUEST`
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let control_endpoint = Hpai::decode(reader.take(Hpai::SIZE)?)?;
        let data_endpoint = Hpai::decode(reader.take(Hpai::SIZE)?)?;
        let cri = ConnectionRequestInfo::decode(reader.rest())?;
        Ok(Self {
            control_endpoint,
            data_endpoint,
            cri,
        })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.nested(|rest| self.control_endpoint.encode(rest))?;
        writer.nested(|rest| self.data_endpoint.encode(rest))?;
        writer.nested(|rest| self.cri.encode(rest))?;
        Ok(writer.position())
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        Hpai::SIZE * 2 + ConnectionRequestInfo::SIZE
    }
}

/// `CONNECT_RESPONSE` service (0x0206)
///
/// A gateway refusing the connection sends only channel and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectResponse {
    /// Communication channel ID
    pub communication_channel: u8,
    /// Status code
    pub status: ErrorCode,
    /// Data endpoint assigned by the gateway
    pub data_endpoint: Hpai,
    /// Connection response data
    pub crd: ConnectionResponseData,
}

impl ConnectResponse {
    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let communication_channel = reader.u8()?;
        let status = ErrorCode::from_u8(reader.u8()?);

        let mut response = Self {
            communication_channel,
            status,
            ..Self::default()
        };

        if status.is_ok() {
            response.data_endpoint = Hpai::decode(reader.take(Hpai::SIZE)?)?;
            response.crd = ConnectionResponseData::decode(reader.rest())?;
        }

        Ok(response)
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.u8(self.communication_channel)?;
        writer.u8(self.status.to_u8())?;
        if self.status.is_ok() {
            writer.nested(|rest| self.data_endpoint.encode(rest))?;
            writer.nested(|rest| self.crd.encode(rest))?;
        }
        Ok(writer.position())
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        if self.status.is_ok() {
            2 + Hpai::SIZE + ConnectionResponseData::SIZE
        } else {
            2
        }
    }

    /// Individual address assigned to the tunnel
    pub const fn identifier(&self) -> PhysicalAddress {
        self.crd.identifier
    }
}

/// Channel id plus control endpoint, shared by the
/// `CONNECTIONSTATE_REQUEST` and `DISCONNECT_REQUEST` layouts.
fn decode_channel_request(data: &[u8]) -> Result<(u8, Hpai)> {
    let mut reader = Reader::new(data);
    let channel_id = reader.u8()?;
    let _reserved = reader.u8()?;
    let control_endpoint = Hpai::decode(reader.rest())?;
    Ok((channel_id, control_endpoint))
}

fn encode_channel_request(channel_id: u8, control_endpoint: &Hpai, buf: &mut [u8]) -> Result<usize> {
    let mut writer = Writer::new(buf);
    writer.u8(channel_id)?;
    writer.u8(0x00)?;
    writer.nested(|rest| control_endpoint.encode(rest))?;
    Ok(writer.position())
}

fn decode_channel_status(data: &[u8]) -> Result<(u8, ErrorCode)> {
    let mut reader = Reader::new(data);
    let channel_id = reader.u8()?;
    let status = ErrorCode::from_u8(reader.u8()?);
    Ok((channel_id, status))
}

fn encode_channel_status(channel_id: u8, status: ErrorCode, buf: &mut [u8]) -> Result<usize> {
    let mut writer = Writer::new(buf);
    writer.u8(channel_id)?;
    writer.u8(status.to_u8())?;
    Ok(writer.position())
}

/// `CONNECTIONSTATE_REQUEST` service (0x0207)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStateRequest {
    /// Communication channel ID
    pub channel_id: u8,
    /// Control endpoint
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    /// Create a new `CONNECTIONSTATE_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = decode_channel_request(data)?;
        Ok(Self::new(channel_id, control_endpoint))
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_request(self.channel_id, &self.control_endpoint, buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        2 + Hpai::SIZE
    }
}

/// `CONNECTIONSTATE_RESPONSE` service (0x0208)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStateResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code
    pub status: ErrorCode,
}

impl ConnectionStateResponse {
    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (channel_id, status) = decode_channel_status(data)?;
        Ok(Self { channel_id, status })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_status(self.channel_id, self.status, buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        2
    }
}

/// `DISCONNECT_REQUEST` service (0x0209)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectRequest {
    /// Communication channel ID
    pub channel_id: u8,
    /// Control endpoint
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    /// Create a new `DISCONNECT_REQUEST`
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (channel_id, control_endpoint) = decode_channel_request(data)?;
        Ok(Self::new(channel_id, control_endpoint))
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_request(self.channel_id, &self.control_endpoint, buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        2 + Hpai::SIZE
    }
}

/// `DISCONNECT_RESPONSE` service (0x020A)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisconnectResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code
    pub status: ErrorCode,
}

impl DisconnectResponse {
    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (channel_id, status) = decode_channel_status(data)?;
        Ok(Self { channel_id, status })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        encode_channel_status(self.channel_id, self.status, buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        2
    }
}

/// Connection header of tunnelling requests and acknowledgements
///
/// ```text
/// ┌──────────┬────────────┬──────────┬──────────────────┐
/// │ Length 4 │ Channel ID │ Sequence │ Reserved/Status  │
/// └──────────┴────────────┴──────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionHeader {
    /// Communication channel ID
    pub channel_id: u8,
    /// Sequence counter
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    /// Size of the structure in bytes
    pub const SIZE: usize = 4;

    /// Create a new connection header
    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            channel_id,
            sequence_counter,
        }
    }

    /// Encode to bytes, with `last` in the fourth octet.
    fn encode_with(&self, last: u8, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.put(&[Self::SIZE as u8, self.channel_id, self.sequence_counter, last])?;
        Ok(writer.position())
    }

    /// Decode from bytes, returning the fourth octet alongside.
    fn decode_with(data: &[u8]) -> Result<(Self, u8)> {
        match Reader::new(data).take(Self::SIZE)? {
            [4, channel_id, sequence_counter, last] => {
                Ok((Self::new(*channel_id, *sequence_counter), *last))
            }
            _ => Err(KnxError::invalid_structure()),
        }
    }
}

/// `TUNNELLING_REQUEST` service (0x0420)
///
/// The cEMI frame is kept as raw bytes so a request can be acknowledged even
/// when its content is not understood.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnellingRequest {
    /// Connection header
    pub header: ConnectionHeader,
    /// Raw cEMI frame
    pub cemi: Vec<u8>,
}

impl TunnellingRequest {
    /// Create a request carrying `cemi`.
    pub fn new(header: ConnectionHeader, cemi: &CemiFrame) -> Result<Self> {
        Ok(Self {
            header,
            cemi: cemi.to_vec()?,
        })
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let (header, _reserved) = ConnectionHeader::decode_with(reader.take(ConnectionHeader::SIZE)?)?;
        Ok(Self {
            header,
            cemi: reader.rest().to_vec(),
        })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.nested(|rest| self.header.encode_with(0x00, rest))?;
        writer.put(&self.cemi)?;
        Ok(writer.position())
    }

    /// Body length in bytes
    pub fn encoded_length(&self) -> usize {
        ConnectionHeader::SIZE + self.cemi.len()
    }

    /// Decode the carried cEMI frame
    pub fn cemi_frame(&self) -> Result<CemiFrame> {
        CemiFrame::decode(&self.cemi)
    }
}

/// `TUNNELLING_ACK` service (0x0421)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TunnellingAck {
    /// Connection header echoing the acknowledged request
    pub header: ConnectionHeader,
    /// Status code
    pub status: ErrorCode,
}

impl TunnellingAck {
    /// Create a new `TUNNELLING_ACK`
    pub const fn new(header: ConnectionHeader, status: ErrorCode) -> Self {
        Self { header, status }
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (header, status) = ConnectionHeader::decode_with(data)?;
        Ok(Self::new(header, ErrorCode::from_u8(status)))
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        self.header.encode_with(self.status.to_u8(), buf)
    }

    /// Body length in bytes
    pub const fn encoded_length(&self) -> usize {
        ConnectionHeader::SIZE
    }
}

/// `ROUTING_INDICATION` service (0x0530)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutingIndication {
    /// Raw cEMI frame
    pub cemi: Vec<u8>,
}

impl RoutingIndication {
    /// Create an indication carrying `cemi`.
    pub fn new(cemi: &CemiFrame) -> Result<Self> {
        Ok(Self {
            cemi: cemi.to_vec()?,
        })
    }

    /// Parse from frame body
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(Self {
            cemi: data.to_vec(),
        })
    }

    /// Encode into `buf`
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut writer = Writer::new(buf);
        writer.put(&self.cemi)?;
        Ok(writer.position())
    }

    /// Body length in bytes
    pub fn encoded_length(&self) -> usize {
        self.cemi.len()
    }

    /// Decode the carried cEMI frame
    pub fn cemi_frame(&self) -> Result<CemiFrame> {
        CemiFrame::decode(&self.cemi)
    }
}
