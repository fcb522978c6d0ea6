//! Mock transport implementation for testing.
//!
//! This module provides a [`Transport`] that never touches the network. Sent
//! frames are recorded, and pre-programmed responses are fed back through
//! the dispatcher as if the gateway had answered.
//!
//! ## Example
//!
//! ```
//! use knx_client::net::{MockTransport, Transport};
//! use knx_client::protocol::{ConnectionStateResponse, ErrorCode, KnxIpBody, KnxIpFrame};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> knx_client::Result<()> {
//! let mock = MockTransport::new();
//! mock.add_response_frame(&KnxIpFrame::new(KnxIpBody::ConnectionStateResponse(
//!     ConnectionStateResponse { channel_id: 1, status: ErrorCode::NoError },
//! )))?;
//!
//! let request = KnxIpFrame::new(KnxIpBody::init(knx_client::protocol::ServiceType::SearchRequest));
//! mock.send(&request).await?;
//! assert_eq!(mock.sent_frames().len(), 1);
//! assert!(!mock.has_responses());
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::Result;
use crate::net::transport::{FrameDispatcher, Transport};
use crate::protocol::{KnxIpFrame, KNXNETIP_DEFAULT_PORT};

/// Mock transport for testing KNX communication without real network.
///
/// This mock transport allows you to:
/// - Pre-program raw responses delivered one per `send()`
/// - Inject unsolicited datagrams with [`deliver`](Self::deliver)
/// - Inspect the frames handed to `send()`
#[derive(Debug)]
pub struct MockTransport {
    local: SocketAddrV4,
    remote: SocketAddr,
    dispatcher: FrameDispatcher,
    /// Queue of pre-programmed responses, one popped per send
    responses: Mutex<VecDeque<Vec<u8>>>,
    /// Record of all frames sent
    sent: Mutex<Vec<KnxIpFrame>>,
}

impl MockTransport {
    /// Create a mock bound to `192.168.1.100:3671` talking to
    /// `192.168.1.10:3671`.
    pub fn new() -> Self {
        Self::with_addresses(
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 100), KNXNETIP_DEFAULT_PORT),
            SocketAddr::from(([192, 168, 1, 10], KNXNETIP_DEFAULT_PORT)),
        )
    }

    /// Create a mock with explicit local and remote addresses.
    pub fn with_addresses(local: SocketAddrV4, remote: SocketAddr) -> Self {
        Self {
            local,
            remote,
            dispatcher: FrameDispatcher::new(),
            responses: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Add raw bytes returned after the next `send()`.
    ///
    /// Responses are returned in FIFO order.
    pub fn add_response(&self, data: Vec<u8>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(data);
    }

    /// Add an encoded frame returned after the next `send()`.
    pub fn add_response_frame(&self, frame: &KnxIpFrame) -> Result<()> {
        self.add_response(frame.to_bytes()?.to_vec());
        Ok(())
    }

    /// Feed a datagram to the dispatcher as if it arrived from the remote.
    pub fn deliver(&self, data: &[u8]) {
        self.dispatcher.on_datagram(data, self.remote);
    }

    /// All frames passed to `send()` so far
    pub fn sent_frames(&self) -> Vec<KnxIpFrame> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Last frame passed to `send()`
    pub fn last_sent(&self) -> Option<KnxIpFrame> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Clear the send history.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Check if there are pending responses.
    pub fn has_responses(&self) -> bool {
        self.pending_responses() > 0
    }

    /// Number of pending responses
    pub fn pending_responses(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, frame: &KnxIpFrame) -> Result<()> {
        // Encoding must succeed just like on a real socket.
        frame.to_bytes()?;
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());

        let response = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(data) = response {
            self.deliver(&data);
        }
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddrV4> {
        Ok(self.local)
    }

    fn dispatcher(&self) -> &FrameDispatcher {
        &self.dispatcher
    }
}
