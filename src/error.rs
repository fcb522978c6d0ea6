//! Error types for KNX operations.
//!
//! Structured error types carrying a backtrace, with helper methods for
//! inspecting the failure. Decoding failures, bad filter text, remote status
//! codes and transport failures all surface as [`KnxError`].

use core::fmt;
use std::backtrace::Backtrace;
use std::io;

use crate::protocol::constants::ErrorCode;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Frame decoding failures (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameParseErrorKind {
    Truncated,
    InvalidHeader,
    UnsupportedVersion,
    LengthMismatch,
    InvalidStructure,
    InvalidMessageCode,
    UnsupportedApci,
    NotGroupAddressed,
    PayloadTooLarge,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    NotConnected,
    AckFailed,
    Lost,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    InvalidPhysicalAddress,
    InvalidGroupAddress,
    OutOfRange,
    InvalidPattern,
}

/// Configuration error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigErrorKind {
    MissingKey,
    InvalidValue,
}

/// Device registry error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceErrorKind {
    AlreadyRegistered,
    NotFound,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNX error type.
///
/// This is the main error type returned by all fallible operations of the
/// crate. Structured variants carry a backtrace and expose details through
/// helper methods.
#[derive(Debug)]
pub enum KnxError {
    /// Malformed or truncated binary input
    FrameParse(FrameParseError),
    /// Address text, range or filter pattern errors
    Addressing(AddressingError),
    /// A telegram payload did not have the shape a device expected
    Telegram(TelegramError),
    /// The remote side answered a request with a non-success status
    Remote(ErrorCode),
    /// Tunnel session errors
    Connection(ConnectionError),
    /// Socket level failures
    Transport(TransportError),
    /// Configuration errors
    Config(ConfigError),
    /// Device registry errors
    Device(DeviceError),
    /// No matching response within the configured window
    Timeout,
    /// Operation not valid in the current state
    InvalidState,
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Frame decoding error with backtrace
#[derive(Debug)]
pub struct FrameParseError {
    kind: FrameParseErrorKind,
    backtrace: Backtrace,
}

impl FrameParseError {
    pub(crate) fn new(kind: FrameParseErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the input ended before the structure was complete
    pub fn is_truncated(&self) -> bool {
        matches!(self.kind, FrameParseErrorKind::Truncated)
    }

    /// Check if the declared total length disagrees with the received bytes
    pub fn is_length_mismatch(&self) -> bool {
        matches!(self.kind, FrameParseErrorKind::LengthMismatch)
    }

    /// Check if the frame or payload exceeds what can be encoded
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self.kind, FrameParseErrorKind::PayloadTooLarge)
    }

    /// Captured backtrace
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Connection error with backtrace
#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if no tunnel session is established
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// Check if the gateway did not acknowledge a tunnelling request
    pub fn is_ack_failed(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::AckFailed)
    }

    /// Check if the connection was lost
    pub fn is_lost(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Lost)
    }

    /// Captured backtrace
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Addressing error with backtrace
#[derive(Debug)]
pub struct AddressingError {
    kind: AddressingErrorKind,
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }

    /// Check if an address filter pattern could not be parsed
    pub fn is_invalid_pattern(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::InvalidPattern)
    }

    /// Captured backtrace
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Telegram payload error
#[derive(Debug)]
pub struct TelegramError {
    description: &'static str,
    backtrace: Backtrace,
}

impl TelegramError {
    /// Human readable reason
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Captured backtrace
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Transport error wrapping the underlying I/O failure
#[derive(Debug)]
pub struct TransportError {
    source: io::Error,
}

impl TransportError {
    /// Underlying I/O error kind
    pub fn io_kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

/// Configuration error naming the offending key
#[derive(Debug)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    key: &'static str,
}

impl ConfigError {
    /// Key the error refers to
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Check if a required key was absent
    pub fn is_missing_key(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::MissingKey)
    }
}

/// Device registry error naming the device
#[derive(Debug)]
pub struct DeviceError {
    kind: DeviceErrorKind,
    name: String,
}

impl DeviceError {
    /// Device name the error refers to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if a device with the same name was already registered
    pub fn is_already_registered(&self) -> bool {
        matches!(self.kind, DeviceErrorKind::AlreadyRegistered)
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Frame parse errors
    pub(crate) fn truncated() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::Truncated))
    }

    pub(crate) fn invalid_header() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::InvalidHeader))
    }

    pub(crate) fn unsupported_version() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::UnsupportedVersion))
    }

    pub(crate) fn length_mismatch() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::LengthMismatch))
    }

    pub(crate) fn invalid_structure() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::InvalidStructure))
    }

    pub(crate) fn invalid_message_code() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::InvalidMessageCode))
    }

    pub(crate) fn unsupported_apci() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::UnsupportedApci))
    }

    pub(crate) fn not_group_addressed() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::NotGroupAddressed))
    }

    pub(crate) fn payload_too_large() -> Self {
        Self::FrameParse(FrameParseError::new(FrameParseErrorKind::PayloadTooLarge))
    }

    // Connection errors
    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn tunnelling_ack_failed() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AckFailed))
    }

    pub(crate) fn connection_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    // Addressing errors
    pub(crate) fn invalid_group_address() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidGroupAddress))
    }

    pub(crate) fn invalid_physical_address() -> Self {
        Self::Addressing(AddressingError::new(
            AddressingErrorKind::InvalidPhysicalAddress,
        ))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    pub(crate) fn invalid_pattern() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::InvalidPattern))
    }

    // Telegram errors
    pub(crate) fn could_not_parse_telegram(description: &'static str) -> Self {
        Self::Telegram(TelegramError {
            description,
            backtrace: Backtrace::capture(),
        })
    }

    // Config errors
    pub(crate) fn missing_config_key(key: &'static str) -> Self {
        Self::Config(ConfigError {
            kind: ConfigErrorKind::MissingKey,
            key,
        })
    }

    pub(crate) fn invalid_config_value(key: &'static str) -> Self {
        Self::Config(ConfigError {
            kind: ConfigErrorKind::InvalidValue,
            key,
        })
    }

    // Device errors
    pub(crate) fn device_already_registered(name: &str) -> Self {
        Self::Device(DeviceError {
            kind: DeviceErrorKind::AlreadyRegistered,
            name: name.to_owned(),
        })
    }

    pub(crate) fn device_not_found(name: &str) -> Self {
        Self::Device(DeviceError {
            kind: DeviceErrorKind::NotFound,
            name: name.to_owned(),
        })
    }

    /// Check if this is a frame decoding error
    pub fn is_frame_parse(&self) -> bool {
        matches!(self, Self::FrameParse(_))
    }

    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Remote status code, if the remote side answered with an error
    pub fn remote_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Remote(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<io::Error> for KnxError {
    fn from(source: io::Error) -> Self {
        Self::Transport(TransportError { source })
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::FrameParse(e) => write!(f, "Could not parse KNX/IP frame: {:?}", e.kind),
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Telegram(e) => write!(f, "Could not parse telegram: {}", e.description),
            KnxError::Remote(code) => write!(f, "KNX bus responded with error: {code}"),
            KnxError::Connection(e) => write!(f, "Connection error: {:?}", e.kind),
            KnxError::Transport(e) => write!(f, "Transport error: {}", e.source),
            KnxError::Config(e) => write!(f, "Configuration error: {:?} for key {}", e.kind, e.key),
            KnxError::Device(e) => write!(f, "Device error: {:?} for '{}'", e.kind, e.name),
            KnxError::Timeout => write!(f, "Operation timeout"),
            KnxError::InvalidState => write!(f, "Invalid state"),
        }
    }
}

impl std::error::Error for KnxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxError::Transport(e) => Some(&e.source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_parse_predicates() {
        let err = KnxError::length_mismatch();
        assert!(err.is_frame_parse());
        match err {
            KnxError::FrameParse(e) => {
                assert!(e.is_length_mismatch());
                assert!(!e.is_truncated());
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_remote_code() {
        let err = KnxError::Remote(ErrorCode::ConnectionId);
        assert_eq!(err.remote_code(), Some(ErrorCode::ConnectionId));
        assert_eq!(KnxError::Timeout.remote_code(), None);
    }

    #[test]
    fn test_io_error_has_source() {
        use std::error::Error;

        let err = KnxError::from(io::Error::new(io::ErrorKind::AddrInUse, "busy"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_config_error_display() {
        let err = KnxError::missing_config_key("GATEWAY_IP");
        assert_eq!(
            err.to_string(),
            "Configuration error: MissingKey for key GATEWAY_IP"
        );
    }
}
