//! KNX Group Address implementation.
//!
//! Group addresses identify a datapoint or function, not a device.
//! Three textual notations map onto the same 16 bits:
//! - 3-level: Main/Middle/Sub (e.g., 1/2/3), the most common
//! - 2-level: Main/Sub (e.g., 1/234)
//! - free: the raw integer (e.g., 2563)
//!
//! Bit layout:
//! - Main: 5 bits (0-31)
//! - Middle: 3 bits (0-7)
//! - Sub: 8 bits (0-255), or 11 bits (0-2047) in 2-level notation

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX Group Address
///
/// Equality and hashing use the raw 16-bit value, so `1/2/3`, `1/515` and
/// `2563` are the same address.
///
/// # Examples
///
/// ```
/// use knx_client::GroupAddress;
///
/// let addr = GroupAddress::new(1, 2, 3).unwrap();
/// assert_eq!(addr.to_string(), "1/2/3");
///
/// let addr: GroupAddress = "1/515".parse().unwrap();
/// assert_eq!(addr, GroupAddress::new(1, 2, 3).unwrap());
///
/// let addr: GroupAddress = "2563".parse().unwrap();
/// assert_eq!(addr.raw(), 0x0A03);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub group value (8 bits)
    pub const MAX_SUB: u8 = 255;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a new 3-level Group Address (Main/Middle/Sub).
    ///
    /// # Errors
    ///
    /// Returns an addressing error if main or middle is out of range.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Create a new 2-level Group Address (Main/Sub).
    ///
    /// # Errors
    ///
    /// Returns an addressing error if main or sub is out of range.
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }

        let raw = (u16::from(main) << 11) | sub;
        Ok(Self { raw })
    }

    /// Get the raw u16 representation of the address.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Get the main group component (0-31).
    #[inline]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Get the middle group component for 3-level format (0-7).
    #[inline]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Get the sub group component for 3-level format (0-255).
    #[inline]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Get the sub group component for 2-level format (0-2047).
    #[inline]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }

    /// Format as 2-level string (Main/Sub).
    pub fn to_string_2level(&self) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        let _ = write!(s, "{}/{}", self.main(), self.sub_2level());
        s
    }

    /// Write the address into a byte buffer (big-endian).
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let dst = buf.get_mut(..2).ok_or_else(KnxError::truncated)?;
        dst.copy_from_slice(&self.raw.to_be_bytes());
        Ok(2)
    }

    /// Read an address from a byte buffer (big-endian).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        match buf {
            [hi, lo, ..] => Ok(Self {
                raw: u16::from_be_bytes([*hi, *lo]),
            }),
            _ => Err(KnxError::truncated()),
        }
    }
}

impl From<u16> for GroupAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    /// Format as 3-level address by default
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/');
        let first = parts.next().ok_or_else(KnxError::invalid_group_address)?;

        let Some(second) = parts.next() else {
            // Free format: the raw integer
            return first
                .parse::<u16>()
                .ok()
                .map(Self::from)
                .ok_or_else(KnxError::invalid_group_address);
        };

        let main = first
            .parse::<u8>()
            .ok()
            .ok_or_else(KnxError::invalid_group_address)?;

        match parts.next() {
            None => {
                let sub = second
                    .parse::<u16>()
                    .ok()
                    .ok_or_else(KnxError::invalid_group_address)?;
                Self::new_2level(main, sub)
            }
            Some(third) => {
                if parts.next().is_some() {
                    return Err(KnxError::invalid_group_address());
                }
                let middle = second
                    .parse::<u8>()
                    .ok()
                    .ok_or_else(KnxError::invalid_group_address)?;
                let sub = third
                    .parse::<u8>()
                    .ok()
                    .ok_or_else(KnxError::invalid_group_address)?;
                Self::new(main, middle, sub)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_3level_valid() {
        let addr = GroupAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.middle(), 2);
        assert_eq!(addr.sub(), 3);
    }

    #[test]
    fn test_new_3level_out_of_range() {
        assert!(GroupAddress::new(32, 0, 0).is_err());
        assert!(GroupAddress::new(0, 8, 0).is_err());
    }

    #[test]
    fn test_new_2level() {
        let addr = GroupAddress::new_2level(1, 234).unwrap();
        assert_eq!(addr.main(), 1);
        assert_eq!(addr.sub_2level(), 234);
        assert!(GroupAddress::new_2level(0, 2048).is_err());
    }

    #[test]
    fn test_raw_conversion() {
        // 1/2/3 = 0b00001_010_00000011 = 0x0A03
        let addr = GroupAddress::from(0x0A03u16);
        assert_eq!(addr, GroupAddress::new(1, 2, 3).unwrap());
        assert_eq!(u16::from(addr), 0x0A03);
    }

    #[test]
    fn test_encode_decode() {
        let addr = GroupAddress::new(31, 7, 255).unwrap();
        let mut buf = [0u8; 2];
        addr.encode(&mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0xFF]);
        assert_eq!(GroupAddress::decode(&buf).unwrap(), addr);
        assert!(GroupAddress::decode(&buf[..1]).is_err());
    }

    #[test]
    fn test_display_and_2level_string() {
        let addr = GroupAddress::new_2level(1, 234).unwrap();
        assert_eq!(addr.to_string_2level(), "1/234");
        assert_eq!(addr.to_string(), "1/0/234");
    }

    #[test]
    fn test_from_str_notations_agree() {
        let three: GroupAddress = "1/2/3".parse().unwrap();
        let two: GroupAddress = "1/515".parse().unwrap();
        let free: GroupAddress = "2563".parse().unwrap();
        assert_eq!(three, two);
        assert_eq!(three, free);
    }

    #[test]
    fn test_from_str_invalid() {
        for text in ["", "32/0/0", "1/2/3/4", "a/b/c", "1/2048", "1/8/0", "65536", "1//3"] {
            assert!(text.parse::<GroupAddress>().is_err(), "{text} should not parse");
        }
    }
}
