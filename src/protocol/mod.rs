//! KNXnet/IP protocol implementation.
//!
//! This module contains the wire structures and parsing logic for
//! KNXnet/IP frames and the group addressed cEMI messages they carry.

pub mod cemi;
pub mod constants;
pub mod frame;
pub mod services;

pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use services::*;
