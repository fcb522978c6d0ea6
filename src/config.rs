//! Connection configuration from a `KEY=VALUE` document.
//!
//! ```text
//! # tunnel to a gateway
//! CONNECTION_TYPE=tunneling
//! GATEWAY_IP=192.168.1.10
//! GATEWAY_PORT=3671
//! LOCAL_IP=0.0.0.0
//! OWN_ADDRESS=15.15.250
//! RATE_LIMIT=20
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Keys not listed
//! above are ignored too.

use core::str::FromStr;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use crate::addressing::PhysicalAddress;
use crate::error::{KnxError, Result};
use crate::protocol::KNXNETIP_DEFAULT_PORT;

/// Default outgoing rate in telegrams per second
pub const DEFAULT_RATE_LIMIT: u32 = 20;

/// Example document for a tunnelling setup.
pub const EXAMPLE_CONFIG: &str = r"
# KNX/IP gateway reached through a tunnel
CONNECTION_TYPE=tunneling
GATEWAY_IP=192.168.1.10
GATEWAY_PORT=3671
OWN_ADDRESS=15.15.250
RATE_LIMIT=20
";

/// How the client reaches the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionConfig {
    /// Tunnel through a gateway
    Tunneling {
        /// Gateway endpoint
        gateway: SocketAddrV4,
        /// Interface to bind the socket to
        local_ip: Ipv4Addr,
    },
    /// Multicast routing
    Routing {
        /// Interface joining the multicast group
        local_ip: Ipv4Addr,
    },
}

/// Client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KnxConfig {
    /// Source address of routed telegrams
    pub own_address: PhysicalAddress,
    /// Outgoing telegrams per second, 0 for no limit
    pub rate_limit: u32,
    /// Bus connection
    pub connection: ConnectionConfig,
}

impl KnxConfig {
    /// Tunnelling configuration with defaults for everything but the gateway.
    pub fn tunneling(gateway: SocketAddrV4) -> Self {
        Self {
            own_address: PhysicalAddress::default(),
            rate_limit: DEFAULT_RATE_LIMIT,
            connection: ConnectionConfig::Tunneling {
                gateway,
                local_ip: Ipv4Addr::UNSPECIFIED,
            },
        }
    }

    /// Routing configuration with defaults.
    pub fn routing() -> Self {
        Self {
            own_address: PhysicalAddress::default(),
            rate_limit: DEFAULT_RATE_LIMIT,
            connection: ConnectionConfig::Routing {
                local_ip: Ipv4Addr::UNSPECIFIED,
            },
        }
    }

    /// Read and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the file cannot be read, otherwise see
    /// [`FromStr`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }
}

impl FromStr for KnxConfig {
    type Err = KnxError;

    fn from_str(document: &str) -> Result<Self> {
        let own_address = parse_or(document, "OWN_ADDRESS", PhysicalAddress::default())?;
        let rate_limit = parse_or(document, "RATE_LIMIT", DEFAULT_RATE_LIMIT)?;
        let local_ip = parse_or(document, "LOCAL_IP", Ipv4Addr::UNSPECIFIED)?;

        let connection = match get_value(document, "CONNECTION_TYPE").unwrap_or("tunneling") {
            "tunneling" | "tunnelling" => {
                let ip = get_value(document, "GATEWAY_IP")
                    .ok_or_else(|| KnxError::missing_config_key("GATEWAY_IP"))?;
                let ip = parse_value(ip, "GATEWAY_IP")?;
                let port = parse_or(document, "GATEWAY_PORT", KNXNETIP_DEFAULT_PORT)?;
                ConnectionConfig::Tunneling {
                    gateway: SocketAddrV4::new(ip, port),
                    local_ip,
                }
            }
            "routing" => ConnectionConfig::Routing { local_ip },
            _ => return Err(KnxError::invalid_config_value("CONNECTION_TYPE")),
        };

        Ok(Self {
            own_address,
            rate_limit,
            connection,
        })
    }
}

/// Find the value of `key` in a configuration document.
///
/// # Returns
/// * `Option<&str>` - trimmed value of the first `key=` line
fn get_value<'a>(document: &'a str, key: &str) -> Option<&'a str> {
    document
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim())
}

fn parse_value<T: FromStr>(value: &str, key: &'static str) -> Result<T> {
    value
        .parse()
        .ok()
        .ok_or_else(|| KnxError::invalid_config_value(key))
}

fn parse_or<T: FromStr>(document: &str, key: &'static str, default: T) -> Result<T> {
    get_value(document, key).map_or(Ok(default), |value| parse_value(value, key))
}
