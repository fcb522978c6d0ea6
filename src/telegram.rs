//! Bus telegrams.
//!
//! A [`Telegram`] is the decoded form of a group communication message: who
//! it is for, whether it reads, writes or answers, and the value carried.
//! Telegrams are plain values compared structurally.

use core::fmt;

use crate::addressing::GroupAddress;

/// Direction of a telegram relative to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelegramDirection {
    /// Received from the bus
    Incoming,
    /// To be sent onto the bus
    #[default]
    Outgoing,
}

/// Group communication service of a telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TelegramType {
    /// `A_GroupValue_Read`
    GroupRead,
    /// `A_GroupValue_Write`
    #[default]
    GroupWrite,
    /// `A_GroupValue_Response`
    GroupResponse,
}

/// Value carried by a write or response telegram.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// Up to 6 bits, packed into the APCI octet
    Binary(u8),
    /// Octets following the APCI octet
    Array(Vec<u8>),
}

impl Payload {
    /// Largest value a [`Payload::Binary`] can carry
    pub const MAX_BINARY: u8 = 0x3F;
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(value) => write!(f, "<Binary value=\"{value}\" />"),
            Self::Array(bytes) => {
                f.write_str("<Array value=\"[")?;
                for (index, byte) in bytes.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "0x{byte:02X}")?;
                }
                f.write_str("]\" />")
            }
        }
    }
}

/// Decoded group telegram.
///
/// # Examples
///
/// ```
/// use knx_client::{GroupAddress, Payload, Telegram, TelegramType};
///
/// let address = GroupAddress::new(1, 2, 3).unwrap();
/// let telegram = Telegram::group_write(address, Payload::Binary(1));
/// assert_eq!(telegram.telegram_type, TelegramType::GroupWrite);
/// assert_eq!(Telegram::group_read(address).payload, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telegram {
    /// Destination group address
    pub group_address: GroupAddress,
    /// Incoming or outgoing
    pub direction: TelegramDirection,
    /// Read, write or response
    pub telegram_type: TelegramType,
    /// Value, absent for reads
    pub payload: Option<Payload>,
}

impl Telegram {
    /// Outgoing telegram
    pub const fn new(
        group_address: GroupAddress,
        telegram_type: TelegramType,
        payload: Option<Payload>,
    ) -> Self {
        Self {
            group_address,
            direction: TelegramDirection::Outgoing,
            telegram_type,
            payload,
        }
    }

    /// Outgoing `GroupValueRead`
    pub const fn group_read(group_address: GroupAddress) -> Self {
        Self::new(group_address, TelegramType::GroupRead, None)
    }

    /// Outgoing `GroupValueWrite`
    pub const fn group_write(group_address: GroupAddress, payload: Payload) -> Self {
        Self::new(group_address, TelegramType::GroupWrite, Some(payload))
    }

    /// Outgoing `GroupValueResponse`
    pub const fn group_response(group_address: GroupAddress, payload: Payload) -> Self {
        Self::new(group_address, TelegramType::GroupResponse, Some(payload))
    }

    /// Same telegram with a different direction.
    #[must_use]
    pub fn with_direction(mut self, direction: TelegramDirection) -> Self {
        self.direction = direction;
        self
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Telegram group_address=\"{}\", payload=\"", self.group_address)?;
        match &self.payload {
            Some(payload) => write!(f, "{payload}")?,
            None => f.write_str("None")?,
        }
        write!(
            f,
            "\" telegramtype=\"{:?}\" direction=\"{:?}\" />",
            self.telegram_type, self.direction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let address = GroupAddress::new(1, 2, 3).unwrap();
        let a = Telegram::group_write(address, Payload::Array(vec![1, 2]));
        let b = Telegram::group_write(address, Payload::Array(vec![1, 2]));
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_direction(TelegramDirection::Incoming));
        assert_ne!(a, Telegram::group_response(address, Payload::Array(vec![1, 2])));
    }

    #[test]
    fn test_display() {
        let address = GroupAddress::new(1, 2, 3).unwrap();
        let telegram = Telegram::group_write(address, Payload::Array(vec![0x0C, 0x1A]));
        assert_eq!(
            telegram.to_string(),
            "<Telegram group_address=\"1/2/3\", payload=\"<Array value=\"[0x0C,0x1A]\" />\" \
             telegramtype=\"GroupWrite\" direction=\"Outgoing\" />"
        );
        assert!(Telegram::group_read(address).to_string().contains("payload=\"None\""));
    }
}
