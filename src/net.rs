//! Network layer for KNXnet/IP communication.
//!
//! The [`Transport`] trait is the only seam to the socket. Everything above
//! it works on decoded [`KnxIpFrame`](crate::protocol::KnxIpFrame)s handed
//! out by a [`FrameDispatcher`].
//!
//! - [`UdpClient`]: tokio UDP socket, unicast to a gateway or multicast
//! - [`MockTransport`]: records sent frames and replays canned responses

pub mod mock_transport;
pub mod transport;
pub mod udp;

#[doc(inline)]
pub use mock_transport::MockTransport;
#[doc(inline)]
pub use transport::{CallbackId, FrameCallback, FrameDispatcher, Transport};
#[doc(inline)]
pub use udp::UdpClient;
