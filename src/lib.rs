//! # knx-client
//!
//! Asynchronous KNXnet/IP client on tokio.
//!
//! - Frame codec for KNXnet/IP frames, HPAI endpoints and cEMI `L_Data`
//! - Request/response state machine for connect, heartbeat, disconnect and
//!   tunnelling exchanges
//! - Tunnelling and multicast routing interfaces
//! - A telegram queue serializing outgoing traffic with a rate limit and
//!   fanning incoming telegrams out to filtered callbacks and devices
//! - Group address filters (`1/2/*`, `1/*/4-7`, `1-3/5`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_client::service::ValueReader;
//! use knx_client::{ga, Knx, Payload, Telegram};
//!
//! # async fn run() -> knx_client::Result<()> {
//! let knx = Knx::new("GATEWAY_IP=192.168.1.10".parse()?);
//! knx.start(false).await?;
//!
//! knx.queue()
//!     .put(Telegram::group_write(ga!(1/2/3), Payload::Binary(1)))?;
//! if let Some(telegram) = ValueReader::new(knx.queue(), ga!(1/2/4)).read().await {
//!     println!("{telegram}");
//! }
//!
//! knx.stop().await
//! # }
//! ```

// Macro modules first so the rest of the crate can use them
#[macro_use]
mod logging;
#[macro_use]
pub mod macros;

pub mod addressing;
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
pub mod knx;
pub mod net;
pub mod protocol;
pub mod service;
pub mod telegram;

#[doc(inline)]
pub use addressing::{AddressFilter, GroupAddress, PhysicalAddress};
#[doc(inline)]
pub use config::{ConnectionConfig, KnxConfig};
#[doc(inline)]
pub use error::{KnxError, Result};
#[doc(inline)]
pub use knx::Knx;
#[doc(inline)]
pub use logging::{TARGET_KNX, TARGET_LOG, TARGET_RAW_SOCKET, TARGET_TELEGRAM};
#[doc(inline)]
pub use telegram::{Payload, Telegram, TelegramDirection, TelegramType};
