//! Common External Message Interface (cEMI) implementation.
//!
//! cEMI wraps a bus telegram inside tunnelling requests and routing
//! indications. Only `L_Data` frames addressed to a group and carrying a
//! group value service are understood here.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable)               │
//! ├──────────────────────────────────────────┤
//! │ Service Information (L_Data)             │
//! │  ├─ Control Field 1 (1 byte)             │
//! │  ├─ Control Field 2 (1 byte)             │
//! │  ├─ Source Address (2 bytes)             │
//! │  ├─ Destination Address (2 bytes)        │
//! │  ├─ NPDU Length (1 byte)                 │
//! │  ├─ TPCI (1 byte)                        │
//! │  ├─ APCI (1 byte, may hold 6 data bits)  │
//! │  └─ Data (NPDU Length - 1 bytes)         │
//! └──────────────────────────────────────────┘
//! ```

use crate::addressing::{GroupAddress, PhysicalAddress};
use crate::error::{KnxError, Result};
use crate::protocol::constants::{CemiMessageCode, Priority};
use crate::protocol::frame::{Reader, Writer};
use crate::telegram::{Payload, Telegram, TelegramDirection, TelegramType};

/// Control Field 1 of `L_Data` frame
///
/// ```text
/// Bit 7: Frame Type (0=extended, 1=standard)
/// Bit 6: Reserved
/// Bit 5: Repeat (0=repeat, 1=do not repeat)
/// Bit 4: System Broadcast (0=system, 1=broadcast)
/// Bit 3-2: Priority (00=system, 01=normal, 10=urgent, 11=low)
/// Bit 1: Acknowledge Request (0=no ack, 1=ack requested)
/// Bit 0: Confirm (0=no error, 1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField1 {
    /// Get raw byte value
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if frame is standard (true) or extended (false)
    #[inline]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Check if repeat flag is set (do not repeat if true)
    #[inline]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Get priority
    #[inline]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Check if confirm error flag is set
    #[inline]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }
}

impl Default for ControlField1 {
    #[inline]
    fn default() -> Self {
        // Standard frame, do not repeat, broadcast, low priority,
        // no ack, no error
        Self { raw: 0xBC }
    }
}

/// Control Field 2 of `L_Data` frame
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl ControlField2 {
    /// Get raw byte value
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if destination is group address (true) or individual (false)
    #[inline]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Get hop count (0-7)
    #[inline]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }
}

impl Default for ControlField2 {
    #[inline]
    fn default() -> Self {
        // Group address, hop count 6, standard format
        Self { raw: 0xE0 }
    }
}

/// TPCI (Transport Layer Protocol Control Information)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tpci {
    /// Unnumbered Data Packet
    UnnumberedData,
    /// Numbered Data Packet with sequence number
    NumberedData {
        /// Sequence number (0-15)
        sequence: u8,
    },
    /// Unnumbered Control Packet
    UnnumberedControl,
    /// Numbered Control Packet with sequence number
    NumberedControl {
        /// Sequence number (0-15)
        sequence: u8,
    },
}

impl Tpci {
    /// Parse TPCI from the first byte of TPCI/APCI field
    pub const fn from_byte(byte: u8) -> Self {
        let sequence = (byte >> 2) & 0x0F;
        match (byte >> 6) & 0x03 {
            0b00 => Self::UnnumberedData,
            0b01 => Self::NumberedData { sequence },
            0b10 => Self::UnnumberedControl,
            _ => Self::NumberedControl { sequence },
        }
    }

    /// Check if this is a data packet
    pub const fn is_data(self) -> bool {
        matches!(self, Self::UnnumberedData | Self::NumberedData { .. })
    }
}

/// APCI (Application Layer Protocol Control Information)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apci {
    /// `A_GroupValue_Read`
    GroupValueRead,
    /// `A_GroupValue_Response`
    GroupValueResponse,
    /// `A_GroupValue_Write`
    GroupValueWrite,
    /// Any other application service
    Unknown(u16),
}

impl Apci {
    /// Parse APCI from TPCI/APCI bytes
    ///
    /// The APCI is encoded in the lower 10 bits across two bytes:
    /// - byte1 (TPCI byte): bits 1-0 contain APCI bits 9-8
    /// - byte2 (APCI byte): bits 7-6 contain APCI bits 7-6
    ///
    /// For data values ≤6 bits, bits 5-0 of byte2 contain the actual data value.
    pub const fn from_bytes(byte1: u8, byte2: u8) -> Self {
        let apci = ((byte1 as u16 & 0x03) << 8) | (byte2 as u16 & 0xC0);

        match apci {
            0x000 => Self::GroupValueRead,
            0x040 => Self::GroupValueResponse,
            0x080 => Self::GroupValueWrite,
            _ => Self::Unknown(apci),
        }
    }

    /// Convert APCI to u16 value
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::GroupValueRead => 0x000,
            Self::GroupValueResponse => 0x040,
            Self::GroupValueWrite => 0x080,
            Self::Unknown(val) => val,
        }
    }

    const fn from_telegram_type(telegram_type: TelegramType) -> Self {
        match telegram_type {
            TelegramType::GroupRead => Self::GroupValueRead,
            TelegramType::GroupResponse => Self::GroupValueResponse,
            TelegramType::GroupWrite => Self::GroupValueWrite,
        }
    }

    const fn telegram_type(self) -> Option<TelegramType> {
        match self {
            Self::GroupValueRead => Some(TelegramType::GroupRead),
            Self::GroupValueResponse => Some(TelegramType::GroupResponse),
            Self::GroupValueWrite => Some(TelegramType::GroupWrite),
            Self::Unknown(_) => None,
        }
    }
}

/// Group addressed cEMI `L_Data` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CemiFrame {
    /// `L_Data.req`, `L_Data.ind` or `L_Data.con`
    pub code: CemiMessageCode,
    /// Control field 1
    pub ctrl1: ControlField1,
    /// Control field 2
    pub ctrl2: ControlField2,
    /// Sender
    pub src_addr: PhysicalAddress,
    /// Destination group
    pub dst_addr: GroupAddress,
    /// Group value service
    pub telegram_type: TelegramType,
    /// Value, absent for reads
    pub payload: Option<Payload>,
}

impl CemiFrame {
    /// Size of a frame without additional info or data octets
    pub const MIN_SIZE: usize = 11;

    /// Build a frame sending `telegram` from `src_addr`.
    pub fn from_telegram(code: CemiMessageCode, telegram: &Telegram, src_addr: PhysicalAddress) -> Self {
        Self {
            code,
            ctrl1: ControlField1::default(),
            ctrl2: ControlField2::default(),
            src_addr,
            dst_addr: telegram.group_address,
            telegram_type: telegram.telegram_type,
            payload: telegram.payload.clone(),
        }
    }

    /// Telegram carried by this frame
    pub fn to_telegram(&self, direction: TelegramDirection) -> Telegram {
        Telegram {
            group_address: self.dst_addr,
            direction,
            telegram_type: self.telegram_type,
            payload: self.payload.clone(),
        }
    }

    /// Parse a cEMI frame from bytes
    ///
    /// # Errors
    ///
    /// Returns a frame parse error for truncated input, a message code other
    /// than `L_Data`, an individually addressed destination, a non group
    /// value APCI, or an NPDU length disagreeing with the remaining octets.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let code = CemiMessageCode::from_u8(reader.u8()?).ok_or_else(KnxError::invalid_message_code)?;
        let additional_info_length = reader.u8()?;
        reader.take(usize::from(additional_info_length))?;

        let ctrl1 = ControlField1::from(reader.u8()?);
        let ctrl2 = ControlField2::from(reader.u8()?);
        if !ctrl2.is_group_address() {
            return Err(KnxError::not_group_addressed());
        }

        let src_addr = PhysicalAddress::from(reader.u16()?);
        let dst_addr = GroupAddress::from(reader.u16()?);
        let npdu_length = usize::from(reader.u8()?);

        let tpci_byte = reader.u8()?;
        let apdu = reader.rest();
        if apdu.len() != npdu_length {
            return Err(KnxError::invalid_structure());
        }
        let [apci_byte, data @ ..] = apdu else {
            return Err(KnxError::truncated());
        };

        if !Tpci::from_byte(tpci_byte).is_data() {
            return Err(KnxError::unsupported_apci());
        }
        let telegram_type = Apci::from_bytes(tpci_byte, *apci_byte)
            .telegram_type()
            .ok_or_else(KnxError::unsupported_apci)?;

        let payload = match (telegram_type, data) {
            (TelegramType::GroupRead, _) => None,
            (_, []) => Some(Payload::Binary(apci_byte & Payload::MAX_BINARY)),
            (_, bytes) => Some(Payload::Array(bytes.to_vec())),
        };

        Ok(Self {
            code,
            ctrl1,
            ctrl2,
            src_addr,
            dst_addr,
            telegram_type,
            payload,
        })
    }

    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let apci = Apci::from_telegram_type(self.telegram_type).to_u16();
        let [tpci_byte, apci_byte] = apci.to_be_bytes();

        let (apci_byte, data): (u8, &[u8]) = match &self.payload {
            None => (apci_byte, &[]),
            Some(Payload::Binary(value)) => {
                if *value > Payload::MAX_BINARY {
                    return Err(KnxError::payload_too_large());
                }
                (apci_byte | value, &[])
            }
            Some(Payload::Array(bytes)) => (apci_byte, bytes),
        };
        let npdu_length = u8::try_from(data.len() + 1)
            .ok()
            .ok_or_else(KnxError::payload_too_large)?;

        let mut writer = Writer::new(buf);
        writer.u8(self.code.to_u8())?;
        writer.u8(0x00)?; // no additional info
        writer.u8(self.ctrl1.raw())?;
        writer.u8(self.ctrl2.raw())?;
        writer.u16(self.src_addr.raw())?;
        writer.u16(self.dst_addr.raw())?;
        writer.u8(npdu_length)?;
        writer.u8(tpci_byte)?;
        writer.u8(apci_byte)?;
        writer.put(data)?;
        Ok(writer.position())
    }

    /// Number of bytes [`encode`](Self::encode) writes.
    pub fn encoded_length(&self) -> usize {
        match &self.payload {
            Some(Payload::Array(bytes)) => Self::MIN_SIZE + bytes.len(),
            _ => Self::MIN_SIZE,
        }
    }

    /// Encode into a new vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.encoded_length()];
        let len = self.encode(&mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}
