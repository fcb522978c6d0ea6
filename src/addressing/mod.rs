//! KNX addressing system.
//!
//! KNX uses two types of addresses:
//! - Physical addresses for devices on the bus (Area.Line.Device)
//! - Group addresses for logical grouping (Main/Middle/Sub, Main/Sub or free)
//!
//! [`AddressFilter`] scopes telegram callbacks to a set of group addresses.

pub mod filter;
pub mod group;
pub mod physical;

pub use filter::AddressFilter;
pub use group::GroupAddress;
pub use physical::PhysicalAddress;
