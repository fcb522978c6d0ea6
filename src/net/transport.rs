//! Network transport abstraction for KNXnet/IP communication.
//!
//! A [`Transport`] sends encoded frames to a fixed remote endpoint and hands
//! every received datagram to its [`FrameDispatcher`], which decodes it and
//! fans it out to the callbacks registered for the frame's service type.
//!
//! ## Example
//!
//! ```
//! use knx_client::net::{MockTransport, Transport};
//! use knx_client::protocol::ServiceType;
//!
//! let transport = MockTransport::new();
//! let id = transport.dispatcher().register(
//!     &[ServiceType::ConnectResponse],
//!     |frame, source| println!("{frame} from {source}"),
//! );
//! transport.dispatcher().unregister(id);
//! ```

use core::fmt;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{KnxIpFrame, ServiceType};

/// Callback receiving a decoded frame and the address it came from.
pub type FrameCallback = Arc<dyn Fn(&KnxIpFrame, SocketAddr) + Send + Sync>;

/// Token returned by [`FrameDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

struct Registration {
    id: CallbackId,
    service_types: Vec<ServiceType>,
    callback: FrameCallback,
}

impl Registration {
    fn accepts(&self, service_type: ServiceType) -> bool {
        self.service_types.is_empty() || self.service_types.contains(&service_type)
    }
}

/// Decode-and-dispatch stage shared by all transports.
///
/// Callbacks are invoked in registration order on a snapshot of the
/// registry, so a callback may unregister itself or others while running.
#[derive(Default)]
pub struct FrameDispatcher {
    registrations: RwLock<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
}

impl FrameDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for frames of the given service types. An empty
    /// slice registers for every frame.
    pub fn register<F>(&self, service_types: &[ServiceType], callback: F) -> CallbackId
    where
        F: Fn(&KnxIpFrame, SocketAddr) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            service_types: service_types.to_vec(),
            callback: Arc::new(callback),
        });
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);
        id
    }

    /// Remove a callback. Unknown ids are ignored.
    pub fn unregister(&self, id: CallbackId) {
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|registration| registration.id != id);
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand a decoded frame to every matching callback.
    pub fn dispatch(&self, frame: &KnxIpFrame, source: SocketAddr) {
        let snapshot: Vec<Arc<Registration>> = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|registration| registration.accepts(frame.service_type()))
            .cloned()
            .collect();

        for registration in snapshot {
            (registration.callback)(frame, source);
        }
    }

    /// Entry point for the socket layer: decode `raw` and dispatch it.
    ///
    /// Undecodable datagrams are logged and dropped.
    pub fn on_datagram(&self, raw: &[u8], source: SocketAddr) {
        knx_log!(@raw debug, "Received from {}: {:02X?}", source, raw);

        match KnxIpFrame::from_bytes(raw) {
            Ok(frame) => {
                knx_log!(@knx debug, "Received: {}", frame);
                self.dispatch(&frame, source);
            }
            Err(e) => {
                knx_log!(warn, "Could not parse KNX/IP frame from {}: {}", source, e);
            }
        }
    }
}

impl fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// Datagram transport bound to one remote endpoint.
///
/// Implementations can be real sockets or mock objects for testing.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Encode and send a frame to the remote endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or the socket fails.
    async fn send(&self, frame: &KnxIpFrame) -> Result<()>;

    /// Local address of the socket, announced in HPAI structures.
    fn local_addr(&self) -> Result<SocketAddrV4>;

    /// Dispatcher receiving everything this transport reads.
    fn dispatcher(&self) -> &FrameDispatcher;

    /// Stop reading from the socket.
    ///
    /// Default implementation does nothing.
    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectionStateResponse, ErrorCode, KnxIpBody};
    use std::sync::Mutex;

    fn source() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 10], 3671))
    }

    #[test]
    fn test_dispatch_filters_by_service_type() {
        let dispatcher = FrameDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        dispatcher.register(
            &[ServiceType::ConnectionStateResponse],
            move |frame, _| sink.lock().unwrap().push(frame.service_type()),
        );

        dispatcher.on_datagram(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x15, 0x00], source());
        dispatcher.on_datagram(&[0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, 0x15, 0x00], source());

        assert_eq!(*seen.lock().unwrap(), vec![ServiceType::ConnectionStateResponse]);
    }

    #[test]
    fn test_malformed_datagram_is_dropped() {
        let dispatcher = FrameDispatcher::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.register(&[], move |_, _| *counter.lock().unwrap() += 1);

        dispatcher.on_datagram(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x15], source());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_unregister() {
        let dispatcher = FrameDispatcher::new();
        let id = dispatcher.register(&[], |_, _| {});
        assert_eq!(dispatcher.len(), 1);
        dispatcher.unregister(id);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_callback_may_unregister_during_dispatch() {
        let dispatcher = Arc::new(FrameDispatcher::new());
        let slot: Arc<Mutex<Option<CallbackId>>> = Arc::new(Mutex::new(None));

        let weak = Arc::downgrade(&dispatcher);
        let own_id = Arc::clone(&slot);
        let id = dispatcher.register(
            &[],
            move |_, _| {
                if let (Some(dispatcher), Some(id)) = (weak.upgrade(), *own_id.lock().unwrap()) {
                    dispatcher.unregister(id);
                }
            },
        );
        *slot.lock().unwrap() = Some(id);

        let frame = KnxIpFrame::new(KnxIpBody::ConnectionStateResponse(ConnectionStateResponse {
            channel_id: 1,
            status: ErrorCode::NoError,
        }));
        dispatcher.dispatch(&frame, source());
        assert!(dispatcher.is_empty());
    }
}
