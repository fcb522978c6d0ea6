//! Tokio UDP transport.
//!
//! A [`UdpClient`] owns one socket and a reader task that feeds every
//! received datagram to its [`FrameDispatcher`]. Tunnelling uses a unicast
//! client bound to an ephemeral port; routing joins the KNX multicast group.

use core::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::error::{KnxError, Result};
use crate::net::transport::{FrameDispatcher, Transport};
use crate::protocol::{KnxIpFrame, MAX_FRAME_SIZE};

/// UDP socket bound to one remote endpoint.
pub struct UdpClient {
    socket: Arc<UdpSocket>,
    remote: SocketAddrV4,
    local: SocketAddrV4,
    dispatcher: Arc<FrameDispatcher>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl UdpClient {
    /// Bind to `local` and talk to a tunnelling gateway at `remote`.
    ///
    /// Port 0 in `local` picks an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the socket cannot be bound.
    pub async fn unicast(local: SocketAddrV4, remote: SocketAddrV4) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        let local = match socket.local_addr()? {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => return Err(KnxError::InvalidState),
        };
        knx_log!(debug, "UDP socket bound to {} for gateway {}", local, remote);
        Ok(Self::spawn(socket, local, remote))
    }

    /// Join the multicast `group` on the interface `local_ip`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the group port is taken or the
    /// membership cannot be added.
    pub async fn multicast(local_ip: Ipv4Addr, group: SocketAddrV4) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port())).await?;
        socket.join_multicast_v4(*group.ip(), local_ip)?;
        socket.set_multicast_loop_v4(false)?;
        knx_log!(debug, "Joined multicast group {} on {}", group, local_ip);
        Ok(Self::spawn(socket, SocketAddrV4::new(local_ip, group.port()), group))
    }

    fn spawn(socket: UdpSocket, local: SocketAddrV4, remote: SocketAddrV4) -> Self {
        let socket = Arc::new(socket);
        let dispatcher = Arc::new(FrameDispatcher::new());
        let reader = tokio::spawn(read_loop(Arc::clone(&socket), Arc::clone(&dispatcher)));
        Self {
            socket,
            remote,
            local,
            dispatcher,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Remote endpoint datagrams are sent to
    pub fn remote_addr(&self) -> SocketAddrV4 {
        self.remote
    }
}

async fn read_loop(socket: Arc<UdpSocket>, dispatcher: Arc<FrameDispatcher>) {
    // one spare byte so oversized datagrams reach the decoder as oversized
    let mut buf = vec![0u8; MAX_FRAME_SIZE + 1];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, source)) => {
                if let Some(datagram) = buf.get(..len) {
                    dispatcher.on_datagram(datagram, source);
                }
            }
            Err(e) => {
                // ICMP port unreachable surfaces here on some platforms.
                knx_log!(warn, "UDP receive failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl Transport for UdpClient {
    async fn send(&self, frame: &KnxIpFrame) -> Result<()> {
        let bytes = frame.to_bytes()?;
        knx_log!(@knx debug, "Sending: {}", frame);
        knx_log!(@raw debug, "Sending to {}: {:02X?}", self.remote, bytes.as_slice());
        self.socket.send_to(&bytes, self.remote).await?;
        Ok(())
    }

    fn local_addr(&self) -> Result<SocketAddrV4> {
        Ok(self.local)
    }

    fn dispatcher(&self) -> &FrameDispatcher {
        &self.dispatcher
    }

    fn stop(&self) {
        if let Some(reader) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            reader.abort();
        }
    }
}

impl Drop for UdpClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for UdpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpClient")
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionStateResponse, ErrorCode, KnxIpBody, ServiceType};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_unicast_round_trip_through_dispatcher() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = match peer.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(_) => unreachable!(),
        };

        let client = UdpClient::unicast(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), peer_addr)
            .await
            .unwrap();
        assert_ne!(client.local_addr().unwrap().port(), 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        client.dispatcher().register(
            &[ServiceType::ConnectionStateResponse],
            move |frame, _| {
                let _ = tx.send(frame.clone());
            },
        );

        let frame = KnxIpFrame::new(KnxIpBody::ConnectionStateResponse(ConnectionStateResponse {
            channel_id: 3,
            status: ErrorCode::NoError,
        }));
        client.send(&frame).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], frame.to_bytes().unwrap().as_slice());

        peer.send_to(&buf[..len], from).await.unwrap();
        let echoed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, frame);

        client.stop();
    }
}
