//! `CONNECT_REQUEST` exchange opening a tunnel.

use crate::addressing::PhysicalAddress;
use crate::error::Result;
use crate::io::request_response::Action;
use crate::protocol::{ConnectRequest, Hpai, KnxIpBody, ServiceType};

/// Opens a tunnel connection. On success the channel and the individual
/// address assigned by the gateway are filled in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Connect {
    /// Communication channel assigned by the gateway
    pub communication_channel: u8,
    /// Individual address assigned to the tunnel
    pub identifier: PhysicalAddress,
}

impl Connect {
    /// Create a connect action with no session fields yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Action for Connect {
    const NAME: &'static str = "Connect";
    const AWAITED_RESPONSE: ServiceType = ServiceType::ConnectResponse;

    fn create_request(&self, local: Hpai) -> Result<KnxIpBody> {
        Ok(KnxIpBody::ConnectRequest(ConnectRequest::new(local, local)))
    }

    fn on_success(&mut self, response: &KnxIpBody) {
        if let KnxIpBody::ConnectResponse(body) = response {
            self.communication_channel = body.communication_channel;
            self.identifier = body.identifier();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::request_response::{ActionState, RequestResponse};
    use crate::net::{MockTransport, Transport};
    use crate::protocol::{ConnectResponse, ConnectionRequestInfo, ErrorCode, KnxIpFrame};
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::sync::Arc;
    use std::time::Duration;

    fn transport() -> Arc<MockTransport> {
        Arc::new(MockTransport::with_addresses(
            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 3), 4321),
            SocketAddr::from(([192, 168, 1, 2], 1234)),
        ))
    }

    #[tokio::test]
    async fn test_connect_request_frame() {
        let transport = transport();
        let mut exchange =
            RequestResponse::new(transport.clone(), Connect::new()).with_timeout(Duration::ZERO);
        exchange.start().await.unwrap();

        let endpoint = Hpai::new(Ipv4Addr::new(192, 168, 1, 3), 4321);
        let expected = KnxIpFrame::new(KnxIpBody::ConnectRequest(ConnectRequest {
            control_endpoint: endpoint,
            data_endpoint: endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }));
        assert_eq!(transport.last_sent(), Some(expected));
        assert_eq!(exchange.state(), ActionState::TimedOut);
        assert!(transport.dispatcher().is_empty());
    }

    #[test]
    fn test_connect_response_copies_session_fields() {
        let mut exchange = RequestResponse::new(transport(), Connect::new());

        let mut body = ConnectResponse {
            communication_channel: 23,
            status: ErrorCode::NoError,
            ..ConnectResponse::default()
        };
        body.crd.identifier = PhysicalAddress::from(7);
        assert!(exchange.response_received(&KnxIpFrame::new(KnxIpBody::ConnectResponse(body))));

        assert!(exchange.success());
        assert_eq!(exchange.action().communication_channel, 23);
        assert_eq!(exchange.action().identifier, PhysicalAddress::from(7));
    }

    #[test]
    fn test_connect_error_keeps_fields_empty() {
        let mut exchange = RequestResponse::new(transport(), Connect::new());
        let body = ConnectResponse {
            communication_channel: 0,
            status: ErrorCode::NoMoreConnections,
            ..ConnectResponse::default()
        };
        exchange.response_received(&KnxIpFrame::new(KnxIpBody::ConnectResponse(body)));

        assert_eq!(exchange.state(), ActionState::Failed(ErrorCode::NoMoreConnections));
        assert_eq!(exchange.into_action(), Connect::new());
    }
}
