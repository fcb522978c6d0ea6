//! KNX Physical Address implementation.
//!
//! Physical addresses identify devices on the KNX bus, including this client
//! when it sends through a tunnel or onto the routing multicast group.
//! Format: Area.Line.Device (e.g., 1.1.5)
//! - Area: 0-15 (4 bits)
//! - Line: 0-15 (4 bits)
//! - Device: 0-255 (8 bits)

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Physical Address (Area.Line.Device)
///
/// # Examples
///
/// ```
/// use knx_client::PhysicalAddress;
///
/// let addr = PhysicalAddress::new(1, 1, 5).unwrap();
/// assert_eq!(addr.to_string(), "1.1.5");
///
/// let addr: PhysicalAddress = "15.15.250".parse().unwrap();
/// assert_eq!(u16::from(addr), 0xFFFA);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhysicalAddress {
    raw: u16,
}

impl PhysicalAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Address used by the client when none is configured (15.15.250).
    pub const DEFAULT: Self = Self { raw: 0xFFFA };

    /// Create a new Physical Address from components.
    ///
    /// # Errors
    ///
    /// Returns an addressing error if area or line is out of range.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device);
        Ok(Self { raw })
    }

    /// Get the raw u16 representation of the address.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Get the area component (0-15).
    #[inline]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Get the line component (0-15).
    #[inline]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Get the device component (0-255).
    #[inline]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }
}

impl Default for PhysicalAddress {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for PhysicalAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<PhysicalAddress> for u16 {
    #[inline]
    fn from(addr: PhysicalAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for PhysicalAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.').map(|part| part.parse::<u8>().ok());

        let (Some(Some(area)), Some(Some(line)), Some(Some(device)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KnxError::invalid_physical_address());
        };

        Self::new(area, line, device)
    }
}
