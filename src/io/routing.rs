//! KNXnet/IP routing over multicast.
//!
//! Routing needs no session: every telegram is a `ROUTING_INDICATION`
//! carrying an `L_Data.ind` frame, sent to and received from the multicast
//! group.

use core::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::addressing::PhysicalAddress;
use crate::error::Result;
use crate::io::interface::KnxIpInterface;
use crate::net::{CallbackId, Transport};
use crate::protocol::{
    CemiFrame, CemiMessageCode, KnxIpBody, KnxIpFrame, RoutingIndication, ServiceType,
};
use crate::service::TelegramSender;
use crate::telegram::{Telegram, TelegramDirection};

/// Routing interface. Implements [`KnxIpInterface`].
pub struct Routing {
    transport: Arc<dyn Transport>,
    own_address: PhysicalAddress,
    callback: Mutex<Option<CallbackId>>,
}

impl Routing {
    /// Listen for routing indications on `transport`. Telegrams received
    /// are put into the queue through `sender`; telegrams sent carry
    /// `own_address` as source.
    pub fn start(
        transport: Arc<dyn Transport>,
        sender: TelegramSender,
        own_address: PhysicalAddress,
    ) -> Arc<Self> {
        let callback_id = transport.dispatcher().register(
            &[ServiceType::RoutingIndication],
            move |frame, source| {
                let KnxIpBody::RoutingIndication(indication) = &frame.body else {
                    return;
                };
                match indication.cemi_frame() {
                    Ok(cemi) if cemi.code == CemiMessageCode::LDataInd => {
                        if let Err(e) = sender.put(cemi.to_telegram(TelegramDirection::Incoming)) {
                            knx_log!(warn, "Could not queue routed telegram: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => knx_log!(debug, "Ignoring routing indication from {}: {}", source, e),
                }
            },
        );
        knx_log!(info, "Routing started as {}", own_address);

        Arc::new(Self {
            transport,
            own_address,
            callback: Mutex::new(Some(callback_id)),
        })
    }

    /// Source address of outgoing telegrams
    pub fn own_address(&self) -> PhysicalAddress {
        self.own_address
    }
}

#[async_trait]
impl KnxIpInterface for Routing {
    async fn send_telegram(&self, telegram: &Telegram) -> Result<()> {
        let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataInd, telegram, self.own_address);
        let frame = KnxIpFrame::new(KnxIpBody::RoutingIndication(RoutingIndication::new(&cemi)?));
        self.transport.send(&frame).await
    }

    async fn stop(&self) -> Result<()> {
        if let Some(id) = self.callback.lock().unwrap_or_else(PoisonError::into_inner).take() {
            self.transport.dispatcher().unregister(id);
        }
        self.transport.stop();
        knx_log!(info, "Routing stopped");
        Ok(())
    }
}

impl fmt::Debug for Routing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routing")
            .field("transport", &self.transport)
            .field("own_address", &self.own_address)
            .finish_non_exhaustive()
    }
}
