//! Integration tests for knx-client.
//!
//! The tunnel tests run against a fake gateway on a loopback UDP socket. The
//! queue tests use an in-process bus that answers every `GroupValueRead`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use knx_client::devices::Switch;
use knx_client::io::{KnxIpInterface, Tunnel, TunnelConfig};
use knx_client::net::UdpClient;
use knx_client::protocol::{
    CemiFrame, CemiMessageCode, ConnectResponse, ConnectionHeader, ConnectionResponseData,
    DisconnectResponse, ErrorCode, Hpai, KnxIpBody, KnxIpFrame, TunnellingAck, TunnellingRequest,
    MAX_FRAME_SIZE,
};
use knx_client::service::{TelegramSender, ValueReader};
use knx_client::{
    ga, pa, GroupAddress, Knx, KnxConfig, Payload, Result, Telegram, TelegramDirection, TelegramType,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Fake gateway
// =============================================================================

struct FakeGateway {
    socket: UdpSocket,
    client: Option<SocketAddr>,
}

impl FakeGateway {
    async fn bind() -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        Self {
            socket,
            client: None,
        }
    }

    fn addr(&self) -> SocketAddrV4 {
        match self.socket.local_addr().unwrap() {
            SocketAddr::V4(addr) => addr,
            SocketAddr::V6(addr) => panic!("unexpected address {addr}"),
        }
    }

    async fn recv(&mut self) -> KnxIpFrame {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let (len, source) = tokio::time::timeout(TEST_TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("gateway timed out")
            .unwrap();
        self.client = Some(source);
        KnxIpFrame::from_bytes(&buf[..len]).unwrap()
    }

    async fn send(&self, body: KnxIpBody) {
        let frame = KnxIpFrame::new(body);
        let target = self.client.expect("no client yet");
        self.socket
            .send_to(&frame.to_bytes().unwrap(), target)
            .await
            .unwrap();
    }

    async fn accept_connect(&mut self, channel: u8) {
        let frame = self.recv().await;
        assert!(matches!(frame.body, KnxIpBody::ConnectRequest(_)), "{frame}");
        self.send(KnxIpBody::ConnectResponse(ConnectResponse {
            communication_channel: channel,
            status: ErrorCode::NoError,
            data_endpoint: Hpai::from(self.addr()),
            crd: ConnectionResponseData {
                identifier: pa!(1, 1, 20),
                ..ConnectionResponseData::default()
            },
        }))
        .await;
    }

    /// Acknowledge one tunnelling request and return its telegram.
    async fn ack_tunnelling(&mut self) -> (ConnectionHeader, CemiFrame) {
        let frame = self.recv().await;
        let KnxIpBody::TunnellingRequest(request) = frame.body else {
            panic!("unexpected frame {frame}");
        };
        self.send(KnxIpBody::TunnellingAck(TunnellingAck::new(
            request.header,
            ErrorCode::NoError,
        )))
        .await;
        (request.header, request.cemi_frame().unwrap())
    }

    async fn accept_disconnect(&mut self) -> u8 {
        let frame = self.recv().await;
        let KnxIpBody::DisconnectRequest(request) = frame.body else {
            panic!("unexpected frame {frame}");
        };
        self.send(KnxIpBody::DisconnectResponse(DisconnectResponse {
            channel_id: request.channel_id,
            status: ErrorCode::NoError,
        }))
        .await;
        request.channel_id
    }
}

#[tokio::test]
async fn test_tunnel_session_against_fake_gateway() {
    let mut gateway = FakeGateway::bind().await;
    let knx = Knx::new(KnxConfig::tunneling(gateway.addr()));
    let transport = UdpClient::unicast(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), gateway.addr())
        .await
        .unwrap();

    let (tunnel, ()) = tokio::join!(
        Tunnel::start(Arc::new(transport), knx.queue().sender(), TunnelConfig::default()),
        gateway.accept_connect(5),
    );
    let tunnel = tunnel.unwrap();
    assert_eq!(tunnel.communication_channel(), Some(5));
    assert_eq!(tunnel.identifier(), Some(pa!(1, 1, 20)));

    // outgoing
    let telegram = Telegram::group_write(ga!(1 / 2 / 3), Payload::Array(vec![0x0C, 0x1A]));
    let (sent, (header, cemi)) = tokio::join!(tunnel.send_telegram(&telegram), gateway.ack_tunnelling());
    sent.unwrap();
    assert_eq!(header, ConnectionHeader::new(5, 0));
    assert_eq!(cemi.code, CemiMessageCode::LDataReq);
    assert_eq!(cemi.src_addr, pa!(1, 1, 20));
    assert_eq!(cemi.to_telegram(TelegramDirection::Outgoing), telegram);
    assert_eq!(tunnel.sequence_counter(), Some(1));

    // incoming
    let mut receiver = knx.queue().receiver();
    knx.queue().start();
    let indication = Telegram::group_write(ga!(1 / 2 / 4), Payload::Binary(1));
    let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataInd, &indication, pa!(1, 1, 7));
    gateway
        .send(KnxIpBody::TunnellingRequest(
            TunnellingRequest::new(ConnectionHeader::new(5, 0), &cemi).unwrap(),
        ))
        .await;

    let ack = gateway.recv().await;
    assert_eq!(
        ack.body,
        KnxIpBody::TunnellingAck(TunnellingAck::new(ConnectionHeader::new(5, 0), ErrorCode::NoError))
    );
    let received = tokio::time::timeout(TEST_TIMEOUT, receiver.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, indication.with_direction(TelegramDirection::Incoming));

    // shutdown
    let (stopped, channel) = tokio::join!(tunnel.stop(), gateway.accept_disconnect());
    stopped.unwrap();
    assert_eq!(channel, 5);
    assert!(!tunnel.is_connected());
    knx.queue().stop().await;
}

#[tokio::test]
async fn test_tunnel_refused_by_gateway() {
    let mut gateway = FakeGateway::bind().await;
    let knx = Knx::new(KnxConfig::tunneling(gateway.addr()));
    let transport = UdpClient::unicast(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), gateway.addr())
        .await
        .unwrap();

    let refuse = async {
        let frame = gateway.recv().await;
        assert!(matches!(frame.body, KnxIpBody::ConnectRequest(_)));
        gateway
            .send(KnxIpBody::ConnectResponse(ConnectResponse {
                communication_channel: 0,
                status: ErrorCode::NoMoreConnections,
                ..ConnectResponse::default()
            }))
            .await;
    };
    let (tunnel, ()) = tokio::join!(
        Tunnel::start(Arc::new(transport), knx.queue().sender(), TunnelConfig::default()),
        refuse,
    );

    let error = tunnel.unwrap_err();
    assert_eq!(error.remote_code(), Some(ErrorCode::NoMoreConnections));
}

// =============================================================================
// Queue, devices and value reader
// =============================================================================

/// Bus where every read of a known address is answered right away.
#[derive(Debug)]
struct LoopbackBus {
    sender: TelegramSender,
    values: Vec<(GroupAddress, Payload)>,
    sent: Mutex<Vec<Telegram>>,
}

#[async_trait]
impl KnxIpInterface for LoopbackBus {
    async fn send_telegram(&self, telegram: &Telegram) -> Result<()> {
        self.sent.lock().unwrap().push(telegram.clone());
        if telegram.telegram_type == TelegramType::GroupRead {
            if let Some((address, payload)) = self
                .values
                .iter()
                .find(|(address, _)| *address == telegram.group_address)
            {
                self.sender.put(
                    Telegram::group_response(*address, payload.clone())
                        .with_direction(TelegramDirection::Incoming),
                )?;
            }
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

fn loopback_knx() -> (Knx, Arc<LoopbackBus>) {
    let knx = Knx::new(KnxConfig::routing());
    let bus = Arc::new(LoopbackBus {
        sender: knx.queue().sender(),
        values: vec![
            (ga!(1 / 2 / 4), Payload::Binary(1)),
            (ga!(3 / 0 / 1), Payload::Array(vec![0x0C, 0x1A])),
        ],
        sent: Mutex::new(Vec::new()),
    });
    knx.start_with_interface(bus.clone(), false);
    (knx, bus)
}

#[tokio::test]
async fn test_value_reader_through_public_api() {
    let (knx, bus) = loopback_knx();

    let telegram = ValueReader::new(knx.queue(), ga!(3 / 0 / 1)).read().await.unwrap();
    assert_eq!(telegram.telegram_type, TelegramType::GroupResponse);
    assert_eq!(telegram.payload, Some(Payload::Array(vec![0x0C, 0x1A])));

    let missing = ValueReader::with_timeout(knx.queue(), ga!(3 / 0 / 2), Duration::from_millis(100))
        .read()
        .await;
    assert_eq!(missing, None);
    assert_eq!(knx.queue().callback_count(), 0);

    knx.stop().await.unwrap();
    assert_eq!(bus.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_devices_sync_and_callbacks() {
    let (knx, _bus) = loopback_knx();
    let switch = Arc::new(
        Switch::new("kitchen", ga!(1 / 2 / 3), knx.queue().sender()).with_state_address(ga!(1 / 2 / 4)),
    );
    knx.devices().add(switch.clone()).unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    knx.devices().register_device_updated_cb(move |device| {
        sink.lock().unwrap().push(device.name().to_owned());
    });

    knx.devices().sync(knx.queue(), Duration::from_secs(1)).await;
    assert_eq!(switch.state(), Some(true));
    assert_eq!(*updates.lock().unwrap(), ["kitchen"]);

    // a handling callback keeps the telegram away from the devices
    knx.queue().register_telegram_received_cb(
        |_telegram| async { true },
        Some(vec!["1/2/4".parse().unwrap()]),
    );
    knx.queue()
        .put(
            Telegram::group_write(ga!(1 / 2 / 4), Payload::Binary(0))
                .with_direction(TelegramDirection::Incoming),
        )
        .unwrap();
    knx.stop().await.unwrap();

    assert_eq!(switch.state(), Some(true));
    assert_eq!(updates.lock().unwrap().len(), 1);
}
