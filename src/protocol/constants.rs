//! KNXnet/IP protocol constants, service type identifiers and status codes.

use core::fmt;
use std::net::Ipv4Addr;

/// KNXnet/IP protocol version 1.0
pub const KNXNETIP_VERSION_10: u8 = 0x10;

/// Standard KNXnet/IP header length (6 bytes)
pub const HEADER_SIZE_10: u8 = 0x06;

/// Standard UDP port for KNXnet/IP communication
pub const KNXNETIP_DEFAULT_PORT: u16 = 3671;

/// KNXnet/IP multicast address for routing and discovery
pub const KNXNETIP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 12);

/// Maximum size of a KNXnet/IP frame handled by this crate.
///
/// A tunnelling request carrying 255 octets of cEMI additional info and an
/// extended frame with 254 APDU octets is 530 bytes. Longer datagrams are
/// rejected on decode, so every frame that decodes also encodes.
pub const MAX_FRAME_SIZE: usize = 1024;

// =============================================================================
// Service Type Identifiers
// =============================================================================

/// KNXnet/IP Service Type Identifiers
///
/// Identifiers without a dedicated body decode as [`ServiceType::Unknown`]
/// so that the header can still be validated and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    /// `SEARCH_REQUEST` - Device discovery request
    SearchRequest,
    /// `SEARCH_RESPONSE` - Device discovery response
    SearchResponse,
    /// `DESCRIPTION_REQUEST` - Device description request
    DescriptionRequest,
    /// `DESCRIPTION_RESPONSE` - Device description response
    DescriptionResponse,
    /// `CONNECT_REQUEST` - Connection request
    ConnectRequest,
    /// `CONNECT_RESPONSE` - Connection response
    ConnectResponse,
    /// `CONNECTIONSTATE_REQUEST` - Connection state request (heartbeat)
    ConnectionStateRequest,
    /// `CONNECTIONSTATE_RESPONSE` - Connection state response
    ConnectionStateResponse,
    /// `DISCONNECT_REQUEST` - Disconnect request
    DisconnectRequest,
    /// `DISCONNECT_RESPONSE` - Disconnect response
    DisconnectResponse,
    /// `TUNNELLING_REQUEST` - Tunnelling data request
    TunnellingRequest,
    /// `TUNNELLING_ACK` - Tunnelling acknowledgement
    TunnellingAck,
    /// `ROUTING_INDICATION` - Routing indication (multicast)
    RoutingIndication,
    /// `ROUTING_LOST_MESSAGE` - Routing lost message indication
    RoutingLostMessage,
    /// Any other identifier
    Unknown(u16),
}

impl ServiceType {
    /// Convert a u16 to `ServiceType`
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0x0201 => Self::SearchRequest,
            0x0202 => Self::SearchResponse,
            0x0203 => Self::DescriptionRequest,
            0x0204 => Self::DescriptionResponse,
            0x0205 => Self::ConnectRequest,
            0x0206 => Self::ConnectResponse,
            0x0207 => Self::ConnectionStateRequest,
            0x0208 => Self::ConnectionStateResponse,
            0x0209 => Self::DisconnectRequest,
            0x020A => Self::DisconnectResponse,
            0x0420 => Self::TunnellingRequest,
            0x0421 => Self::TunnellingAck,
            0x0530 => Self::RoutingIndication,
            0x0531 => Self::RoutingLostMessage,
            other => Self::Unknown(other),
        }
    }

    /// Convert `ServiceType` to u16
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::SearchRequest => 0x0201,
            Self::SearchResponse => 0x0202,
            Self::DescriptionRequest => 0x0203,
            Self::DescriptionResponse => 0x0204,
            Self::ConnectRequest => 0x0205,
            Self::ConnectResponse => 0x0206,
            Self::ConnectionStateRequest => 0x0207,
            Self::ConnectionStateResponse => 0x0208,
            Self::DisconnectRequest => 0x0209,
            Self::DisconnectResponse => 0x020A,
            Self::TunnellingRequest => 0x0420,
            Self::TunnellingAck => 0x0421,
            Self::RoutingIndication => 0x0530,
            Self::RoutingLostMessage => 0x0531,
            Self::Unknown(value) => value,
        }
    }
}

// =============================================================================
// Connection Type Codes
// =============================================================================

/// Connection type for `DEVICE_MGMT_CONNECTION`
pub const DEVICE_MGMT_CONNECTION: u8 = 0x03;

/// Connection type for `TUNNEL_CONNECTION`
pub const TUNNEL_CONNECTION: u8 = 0x04;

/// KNX layer for tunnelling on the data link layer
pub const TUNNEL_LINKLAYER: u8 = 0x02;

// =============================================================================
// Host Protocol Codes
// =============================================================================

/// IPv4 UDP protocol
pub const IPV4_UDP: u8 = 0x01;

/// IPv4 TCP protocol
pub const IPV4_TCP: u8 = 0x02;

// =============================================================================
// Error Codes
// =============================================================================

/// Status codes carried by KNXnet/IP response bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    /// `E_NO_ERROR` - operation successful
    #[default]
    NoError,
    /// `E_HOST_PROTOCOL_TYPE` - requested host protocol not supported
    HostProtocolType,
    /// `E_VERSION_NOT_SUPPORTED` - requested protocol version not supported
    VersionNotSupported,
    /// `E_SEQUENCE_NUMBER` - received sequence number out of order
    SequenceNumber,
    /// `E_CONNECTION_ID` - no active connection with the given channel id
    ConnectionId,
    /// `E_CONNECTION_TYPE` - connection type not supported
    ConnectionType,
    /// `E_CONNECTION_OPTION` - connection option not supported
    ConnectionOption,
    /// `E_NO_MORE_CONNECTIONS` - gateway cannot accept another connection
    NoMoreConnections,
    /// `E_NO_MORE_UNIQUE_CONNECTIONS` - no unique individual address left
    NoMoreUniqueConnections,
    /// `E_DATA_CONNECTION` - error on the data connection
    DataConnection,
    /// `E_KNX_CONNECTION` - error on the KNX subnetwork connection
    KnxConnection,
    /// `E_TUNNELLING_LAYER` - requested tunnelling layer not supported
    TunnellingLayer,
    /// Any other status byte
    Other(u8),
}

impl ErrorCode {
    /// Convert a status byte to `ErrorCode`
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::NoError,
            0x01 => Self::HostProtocolType,
            0x02 => Self::VersionNotSupported,
            0x04 => Self::SequenceNumber,
            0x21 => Self::ConnectionId,
            0x22 => Self::ConnectionType,
            0x23 => Self::ConnectionOption,
            0x24 => Self::NoMoreConnections,
            0x25 => Self::NoMoreUniqueConnections,
            0x26 => Self::DataConnection,
            0x27 => Self::KnxConnection,
            0x29 => Self::TunnellingLayer,
            other => Self::Other(other),
        }
    }

    /// Convert `ErrorCode` to its status byte
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0x00,
            Self::HostProtocolType => 0x01,
            Self::VersionNotSupported => 0x02,
            Self::SequenceNumber => 0x04,
            Self::ConnectionId => 0x21,
            Self::ConnectionType => 0x22,
            Self::ConnectionOption => 0x23,
            Self::NoMoreConnections => 0x24,
            Self::NoMoreUniqueConnections => 0x25,
            Self::DataConnection => 0x26,
            Self::KnxConnection => 0x27,
            Self::TunnellingLayer => 0x29,
            Self::Other(value) => value,
        }
    }

    /// Check for `E_NO_ERROR`
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoError => "E_NO_ERROR",
            Self::HostProtocolType => "E_HOST_PROTOCOL_TYPE",
            Self::VersionNotSupported => "E_VERSION_NOT_SUPPORTED",
            Self::SequenceNumber => "E_SEQUENCE_NUMBER",
            Self::ConnectionId => "E_CONNECTION_ID",
            Self::ConnectionType => "E_CONNECTION_TYPE",
            Self::ConnectionOption => "E_CONNECTION_OPTION",
            Self::NoMoreConnections => "E_NO_MORE_CONNECTIONS",
            Self::NoMoreUniqueConnections => "E_NO_MORE_UNIQUE_CONNECTIONS",
            Self::DataConnection => "E_DATA_CONNECTION",
            Self::KnxConnection => "E_KNX_CONNECTION",
            Self::TunnellingLayer => "E_TUNNELLING_LAYER",
            Self::Other(value) => return write!(f, "E_UNKNOWN(0x{value:02X})"),
        };
        f.write_str(name)
    }
}

// =============================================================================
// cEMI Message Codes
// =============================================================================

/// cEMI Message Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CemiMessageCode {
    /// `L_Data.req` - Data request
    LDataReq,
    /// `L_Data.ind` - Data indication
    LDataInd,
    /// `L_Data.con` - Data confirmation
    LDataCon,
}

impl CemiMessageCode {
    /// Convert u8 to `CemiMessageCode`
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(Self::LDataReq),
            0x29 => Some(Self::LDataInd),
            0x2E => Some(Self::LDataCon),
            _ => None,
        }
    }

    /// Convert `CemiMessageCode` to u8
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::LDataReq => 0x11,
            Self::LDataInd => 0x29,
            Self::LDataCon => 0x2E,
        }
    }
}

// =============================================================================
// KNX Priority
// =============================================================================

/// KNX message priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Priority {
    /// System priority
    System = 0b00,
    /// Normal priority
    Normal = 0b01,
    /// Urgent priority
    Urgent = 0b10,
    /// Low priority
    #[default]
    Low = 0b11,
}

impl Priority {
    /// Convert the two priority bits to Priority
    pub const fn from_u8(value: u8) -> Self {
        match value & 0b11 {
            0b00 => Self::System,
            0b01 => Self::Normal,
            0b10 => Self::Urgent,
            _ => Self::Low,
        }
    }

    /// Convert Priority to u8
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}
