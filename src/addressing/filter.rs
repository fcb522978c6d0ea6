//! Group address filter patterns.
//!
//! A pattern has one, two or three `/`-separated levels. The number of levels
//! selects the notation the address is decomposed into before matching:
//!
//! ```text
//! "2/4-8/*"  -> main / middle / sub
//! "1/100-"   -> main / sub (0-2047)
//! "-2000"    -> free (raw 16-bit value)
//! ```
//!
//! Each level is a comma separated list of alternatives, each alternative
//! being `*`, `N`, `A-B`, `A-` or `-B`. Bounds are inclusive.

use crate::addressing::GroupAddress;
use crate::error::{KnxError, Result};
use core::fmt;
use core::str::FromStr;

/// Inclusive range of level values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RangeFilter {
    from: u16,
    to: u16,
}

impl RangeFilter {
    const ANY: Self = Self {
        from: 0,
        to: u16::MAX,
    };

    fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text == "*" {
            return Ok(Self::ANY);
        }

        let bound = |s: &str| s.trim().parse::<u16>().ok().ok_or_else(KnxError::invalid_pattern);

        let (from, to) = match text.split_once('-') {
            None => {
                let value = bound(text)?;
                (value, value)
            }
            Some(("", "")) => return Err(KnxError::invalid_pattern()),
            Some(("", hi)) => (0, bound(hi)?),
            Some((lo, "")) => (bound(lo)?, u16::MAX),
            Some((lo, hi)) => (bound(lo)?, bound(hi)?),
        };

        // "8-4" is read as "4-8"
        Ok(Self {
            from: from.min(to),
            to: from.max(to),
        })
    }

    fn matches(self, value: u16) -> bool {
        (self.from..=self.to).contains(&value)
    }
}

/// One level of a pattern: any of its ranges may match.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LevelFilter {
    ranges: Vec<RangeFilter>,
}

impl LevelFilter {
    fn parse(text: &str) -> Result<Self> {
        let ranges = text
            .split(',')
            .map(RangeFilter::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { ranges })
    }

    fn exact(value: u16) -> Self {
        Self {
            ranges: vec![RangeFilter {
                from: value,
                to: value,
            }],
        }
    }

    fn matches(&self, value: u16) -> bool {
        self.ranges.iter().any(|range| range.matches(value))
    }
}

/// Compiled group address pattern.
///
/// Matching is a pure function of the pattern and the address.
///
/// # Examples
///
/// ```
/// use knx_client::{AddressFilter, GroupAddress};
///
/// let filter = AddressFilter::new("2/4-8/*").unwrap();
/// assert!(filter.matches(GroupAddress::new(2, 5, 3).unwrap()));
/// assert!(!filter.matches(GroupAddress::new(2, 3, 3).unwrap()));
///
/// let filter: AddressFilter = "1/2/-8".parse().unwrap();
/// assert!(filter.matches(GroupAddress::new(1, 2, 3).unwrap()));
/// assert!(!filter.matches(GroupAddress::new(1, 2, 9).unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFilter {
    levels: heapless::Vec<LevelFilter, 3>,
}

impl AddressFilter {
    /// Compile a textual pattern.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidPattern` addressing error for empty levels,
    /// non-numeric bounds or more than three levels.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut levels = heapless::Vec::new();
        for part in pattern.split('/') {
            let level = LevelFilter::parse(part)?;
            levels
                .push(level)
                .ok()
                .ok_or_else(KnxError::invalid_pattern)?;
        }
        Ok(Self { levels })
    }

    /// Filter accepting exactly one address.
    pub fn exact(address: GroupAddress) -> Self {
        let mut levels = heapless::Vec::new();
        // A single free level never exceeds the capacity of three.
        let _ = levels.push(LevelFilter::exact(address.raw()));
        Self { levels }
    }

    /// Check whether `address` is accepted by every level of the pattern.
    pub fn matches(&self, address: GroupAddress) -> bool {
        self.levels
            .iter()
            .enumerate()
            .all(|(index, level)| level.matches(self.level_value(address, index)))
    }

    /// Decompose `address` in the notation selected by the level count.
    fn level_value(&self, address: GroupAddress, index: usize) -> u16 {
        match (self.levels.len(), index) {
            (3, 0) | (2, 0) => u16::from(address.main()),
            (3, 1) => u16::from(address.middle()),
            (3, _) => u16::from(address.sub()),
            (2, _) => address.sub_2level(),
            _ => address.raw(),
        }
    }
}

impl FromStr for AddressFilter {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, level) in self.levels.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            for (alt, range) in level.ranges.iter().enumerate() {
                if alt > 0 {
                    f.write_str(",")?;
                }
                match (range.from, range.to) {
                    (0, u16::MAX) => f.write_str("*")?,
                    (from, to) if from == to => write!(f, "{from}")?,
                    (from, u16::MAX) => write!(f, "{from}-")?,
                    (from, to) => write!(f, "{from}-{to}")?,
                }
            }
        }
        Ok(())
    }
}
