//! `TUNNELLING_REQUEST` exchange carrying one telegram to the gateway.

use crate::addressing::PhysicalAddress;
use crate::error::Result;
use crate::io::request_response::Action;
use crate::protocol::{
    CemiFrame, CemiMessageCode, ConnectionHeader, Hpai, KnxIpBody, ServiceType, TunnellingRequest,
};
use crate::telegram::Telegram;

/// Sends a telegram as `L_Data.req` and waits for the `TUNNELLING_ACK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnelling {
    /// Telegram to send
    pub telegram: Telegram,
    /// Source address written into the cEMI frame
    pub src_address: PhysicalAddress,
    /// Sequence counter of the request
    pub sequence_counter: u8,
    /// Tunnel channel
    pub communication_channel_id: u8,
}

impl Tunnelling {
    /// Create a tunnelling action.
    pub fn new(
        telegram: Telegram,
        src_address: PhysicalAddress,
        sequence_counter: u8,
        communication_channel_id: u8,
    ) -> Self {
        Self {
            telegram,
            src_address,
            sequence_counter,
            communication_channel_id,
        }
    }
}

impl Action for Tunnelling {
    const NAME: &'static str = "Tunnelling";
    const AWAITED_RESPONSE: ServiceType = ServiceType::TunnellingAck;

    fn create_request(&self, _local: Hpai) -> Result<KnxIpBody> {
        let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataReq, &self.telegram, self.src_address);
        let header = ConnectionHeader::new(self.communication_channel_id, self.sequence_counter);
        Ok(KnxIpBody::TunnellingRequest(TunnellingRequest::new(header, &cemi)?))
    }

    fn matches_response(&self, response: &KnxIpBody) -> bool {
        matches!(
            response,
            KnxIpBody::TunnellingAck(ack)
                if ack.header == ConnectionHeader::new(self.communication_channel_id, self.sequence_counter)
        )
    }
}
