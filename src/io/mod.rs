//! Control exchanges and bus interfaces.
//!
//! The request/response actions ([`Connect`], [`ConnectionState`],
//! [`Disconnect`], [`Tunnelling`]) run on [`RequestResponse`]. [`Tunnel`] and
//! [`Routing`] build on them and implement [`KnxIpInterface`], the seam the
//! telegram queue sends through.

pub mod connect;
pub mod connectionstate;
pub mod disconnect;
pub mod interface;
pub mod request_response;
pub mod routing;
pub mod tunnel;
pub mod tunnelling;

pub use connect::Connect;
pub use connectionstate::ConnectionState;
pub use disconnect::Disconnect;
pub use interface::KnxIpInterface;
pub use request_response::{Action, ActionState, RequestResponse, DEFAULT_RESPONSE_TIMEOUT};
pub use routing::Routing;
pub use tunnel::{Tunnel, TunnelConfig};
pub use tunnelling::Tunnelling;
