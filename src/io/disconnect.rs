//! `DISCONNECT_REQUEST` exchange closing a tunnel.

use crate::error::Result;
use crate::io::request_response::Action;
use crate::protocol::{DisconnectRequest, Hpai, KnxIpBody, ServiceType};

/// Closes a tunnel channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnect {
    /// Channel being closed
    pub communication_channel_id: u8,
}

impl Disconnect {
    /// Disconnect `communication_channel_id`
    pub const fn new(communication_channel_id: u8) -> Self {
        Self {
            communication_channel_id,
        }
    }
}

impl Action for Disconnect {
    const NAME: &'static str = "Disconnect";
    const AWAITED_RESPONSE: ServiceType = ServiceType::DisconnectResponse;

    fn create_request(&self, local: Hpai) -> Result<KnxIpBody> {
        Ok(KnxIpBody::DisconnectRequest(DisconnectRequest::new(
            self.communication_channel_id,
            local,
        )))
    }

    fn matches_response(&self, response: &KnxIpBody) -> bool {
        matches!(
            response,
            KnxIpBody::DisconnectResponse(body) if body.channel_id == self.communication_channel_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::request_response::{ActionState, RequestResponse};
    use crate::net::{MockTransport, Transport};
    use crate::protocol::{ConnectionStateResponse, DisconnectResponse, ErrorCode, KnxIpFrame};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_disconnect() {
        let transport = Arc::new(MockTransport::new());
        transport
            .add_response_frame(&KnxIpFrame::new(KnxIpBody::DisconnectResponse(
                DisconnectResponse {
                    channel_id: 23,
                    status: ErrorCode::NoError,
                },
            )))
            .unwrap();

        let mut exchange = RequestResponse::new(transport.clone(), Disconnect::new(23));
        assert_eq!(exchange.start().await.unwrap(), ActionState::Succeeded);

        let local = Hpai::from(transport.local_addr().unwrap());
        assert_eq!(
            transport.last_sent().map(|frame| frame.body),
            Some(KnxIpBody::DisconnectRequest(DisconnectRequest::new(23, local)))
        );
    }

    #[test]
    fn test_disconnect_ignores_other_responses() {
        let mut exchange =
            RequestResponse::new(Arc::new(MockTransport::new()), Disconnect::new(23));
        let other = KnxIpFrame::new(KnxIpBody::ConnectionStateResponse(ConnectionStateResponse {
            channel_id: 23,
            status: ErrorCode::NoError,
        }));
        assert!(!exchange.response_received(&other));
        assert_eq!(exchange.state(), ActionState::Idle);

        let other_channel = KnxIpBody::DisconnectResponse(DisconnectResponse {
            channel_id: 24,
            status: ErrorCode::NoError,
        });
        assert!(!exchange.action().matches_response(&other_channel));
    }
}
