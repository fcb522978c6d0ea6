//! `CONNECTIONSTATE_REQUEST` heartbeat exchange.

use crate::error::Result;
use crate::io::request_response::Action;
use crate::protocol::{ConnectionStateRequest, Hpai, KnxIpBody, ServiceType};

/// Asks the gateway whether a channel is still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// Channel being checked
    pub communication_channel_id: u8,
}

impl ConnectionState {
    /// Heartbeat for `communication_channel_id`
    pub const fn new(communication_channel_id: u8) -> Self {
        Self {
            communication_channel_id,
        }
    }
}

impl Action for ConnectionState {
    const NAME: &'static str = "ConnectionState";
    const AWAITED_RESPONSE: ServiceType = ServiceType::ConnectionStateResponse;

    fn create_request(&self, local: Hpai) -> Result<KnxIpBody> {
        Ok(KnxIpBody::ConnectionStateRequest(ConnectionStateRequest::new(
            self.communication_channel_id,
            local,
        )))
    }

    fn matches_response(&self, response: &KnxIpBody) -> bool {
        matches!(
            response,
            KnxIpBody::ConnectionStateResponse(body) if body.channel_id == self.communication_channel_id
        )
    }
}
