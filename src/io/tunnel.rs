//! Tunnelling session with a KNXnet/IP gateway.
//!
//! A [`Tunnel`] opens a channel with `CONNECT_REQUEST`, keeps it alive with
//! a `CONNECTIONSTATE_REQUEST` heartbeat and carries telegrams both ways:
//!
//! - outgoing telegrams are sent as `TUNNELLING_REQUEST` (`L_Data.req`) and
//!   must be acknowledged by the gateway;
//! - incoming `TUNNELLING_REQUEST`s are acknowledged and their `L_Data.ind`
//!   telegrams are put into the telegram queue. A repeated request (the
//!   previous sequence number) is acknowledged again but not queued twice;
//!   any other out of order request is dropped.
//!
//! Control exchanges (connect, heartbeat, tunnelling, disconnect) never
//! overlap: they share one response dispatcher and the gateway expects them
//! in order.

use core::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::addressing::PhysicalAddress;
use crate::error::{KnxError, Result};
use crate::io::connect::Connect;
use crate::io::connectionstate::ConnectionState;
use crate::io::disconnect::Disconnect;
use crate::io::interface::KnxIpInterface;
use crate::io::request_response::{ActionState, RequestResponse, DEFAULT_RESPONSE_TIMEOUT};
use crate::io::tunnelling::Tunnelling;
use crate::net::{CallbackId, Transport};
use crate::protocol::{
    CemiMessageCode, DisconnectRequest, DisconnectResponse, ErrorCode, KnxIpBody, KnxIpFrame,
    ServiceType, TunnellingAck, TunnellingRequest,
};
use crate::service::TelegramSender;
use crate::telegram::{Telegram, TelegramDirection};

/// Interval between two heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
/// Failed heartbeats in a row before the tunnel reconnects
pub const DEFAULT_MAX_HEARTBEAT_FAILURES: u32 = 3;
/// Attempts for one tunnelling request
const TUNNELLING_ATTEMPTS: usize = 2;

/// Timing of a tunnel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Interval between heartbeats
    pub heartbeat_interval: Duration,
    /// Time to wait for each gateway response
    pub request_timeout: Duration,
    /// Consecutive heartbeat failures tolerated before reconnecting
    pub max_heartbeat_failures: u32,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_heartbeat_failures: DEFAULT_MAX_HEARTBEAT_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    channel: u8,
    sequence: u8,
    /// Next sequence number expected from the gateway
    incoming_sequence: u8,
    identifier: PhysicalAddress,
}

/// An open tunnel. Implements [`KnxIpInterface`].
pub struct Tunnel {
    transport: Arc<dyn Transport>,
    sender: TelegramSender,
    config: TunnelConfig,
    session: Mutex<Option<Session>>,
    /// Serializes control exchanges
    exchange: tokio::sync::Mutex<()>,
    callback: Mutex<Option<CallbackId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Tunnel {
    /// Connect to the gateway behind `transport` and start the heartbeat.
    ///
    /// Incoming telegrams are put into the queue through `sender`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` or `Remote(code)` if the gateway refuses or ignores
    /// the connect request, or a transport error if it cannot be sent.
    pub async fn start(
        transport: Arc<dyn Transport>,
        sender: TelegramSender,
        config: TunnelConfig,
    ) -> Result<Arc<Self>> {
        let tunnel = Arc::new(Self {
            transport,
            sender,
            config,
            session: Mutex::new(None),
            exchange: tokio::sync::Mutex::new(()),
            callback: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        // Frames arrive on the socket reader; answering them needs to send,
        // so they are handed to a worker task.
        let (tx, rx) = mpsc::unbounded_channel::<KnxIpFrame>();
        let callback_id = tunnel.transport.dispatcher().register(
            &[ServiceType::TunnellingRequest, ServiceType::DisconnectRequest],
            move |frame, _source| {
                if tx.send(frame.clone()).is_err() {
                    knx_log!(debug, "Tunnel worker gone, dropping {}", frame.body.name());
                }
            },
        );
        *tunnel.callback.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback_id);
        tunnel.spawn(incoming_loop(Arc::downgrade(&tunnel), rx));

        if let Err(e) = tunnel.connect().await {
            tunnel.shutdown_tasks();
            tunnel.transport.dispatcher().unregister(callback_id);
            return Err(e);
        }
        tunnel.spawn(heartbeat_loop(Arc::downgrade(&tunnel)));
        Ok(tunnel)
    }

    fn spawn(&self, future: impl core::future::Future<Output = ()> + Send + 'static) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokio::spawn(future));
    }

    fn shutdown_tasks(&self) {
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
    }

    fn session(&self) -> Option<Session> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Check whether a channel is open.
    pub fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    /// Channel id assigned by the gateway
    pub fn communication_channel(&self) -> Option<u8> {
        self.session().map(|session| session.channel)
    }

    /// Individual address assigned by the gateway
    pub fn identifier(&self) -> Option<PhysicalAddress> {
        self.session().map(|session| session.identifier)
    }

    /// Sequence counter of the next tunnelling request
    pub fn sequence_counter(&self) -> Option<u8> {
        self.session().map(|session| session.sequence)
    }

    /// Open a new channel, replacing the current session.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.exchange.lock().await;
        self.set_session(None);

        let mut exchange = RequestResponse::new(Arc::clone(&self.transport), Connect::new())
            .with_timeout(self.config.request_timeout);
        exchange.start().await?;
        exchange.outcome()?;

        let connect = exchange.into_action();
        knx_log!(
            info,
            "Tunnel established: channel {} as {}",
            connect.communication_channel,
            connect.identifier
        );
        self.set_session(Some(Session {
            channel: connect.communication_channel,
            sequence: 0,
            incoming_sequence: 0,
            identifier: connect.identifier,
        }));
        Ok(())
    }

    /// Send one `CONNECTIONSTATE_REQUEST`.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` error without a session, otherwise the outcome
    /// of the exchange.
    pub async fn connectionstate(&self) -> Result<()> {
        let _guard = self.exchange.lock().await;
        let session = self.session().ok_or_else(KnxError::not_connected)?;

        let mut exchange = RequestResponse::new(
            Arc::clone(&self.transport),
            ConnectionState::new(session.channel),
        )
        .with_timeout(self.config.request_timeout);
        exchange.start().await?;
        exchange.outcome()
    }

    /// Close the channel. The session is reset even if the gateway does
    /// not answer.
    ///
    /// # Errors
    ///
    /// Returns a `Connection` error without a session, otherwise the outcome
    /// of the exchange.
    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.exchange.lock().await;
        let session = self.session().ok_or_else(KnxError::not_connected)?;

        let mut exchange = RequestResponse::new(Arc::clone(&self.transport), Disconnect::new(session.channel))
            .with_timeout(self.config.request_timeout);
        let started = exchange.start().await;
        self.set_session(None);
        knx_log!(info, "Tunnel channel {} closed", session.channel);
        started?;
        exchange.outcome()
    }

    async fn handle_frame(&self, frame: &KnxIpFrame) -> Result<()> {
        match &frame.body {
            KnxIpBody::TunnellingRequest(request) => self.handle_tunnelling_request(request).await,
            KnxIpBody::DisconnectRequest(request) => self.handle_disconnect_request(request).await,
            _ => Ok(()),
        }
    }

    async fn handle_tunnelling_request(&self, request: &TunnellingRequest) -> Result<()> {
        let Some(session) = self.session() else {
            return Ok(());
        };
        if request.header.channel_id != session.channel {
            knx_log!(
                debug,
                "Ignoring tunnelling request for channel {}",
                request.header.channel_id
            );
            return Ok(());
        }

        let sequence = request.header.sequence_counter;
        if sequence == session.incoming_sequence.wrapping_sub(1) {
            knx_log!(debug, "Repeated tunnelling request {}, acknowledging again", sequence);
            return self.send_tunnelling_ack(request).await;
        }
        if sequence != session.incoming_sequence {
            knx_log!(
                warn,
                "Dropping tunnelling request {}: expected sequence {}",
                sequence,
                session.incoming_sequence
            );
            return Ok(());
        }

        self.send_tunnelling_ack(request).await?;
        if let Some(current) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
            .filter(|current| current.channel == session.channel)
        {
            current.incoming_sequence = sequence.wrapping_add(1);
        }

        let cemi = request.cemi_frame()?;
        match cemi.code {
            CemiMessageCode::LDataInd => self
                .sender
                .put(cemi.to_telegram(TelegramDirection::Incoming)),
            _ => Ok(()),
        }
    }

    async fn send_tunnelling_ack(&self, request: &TunnellingRequest) -> Result<()> {
        let ack = KnxIpBody::TunnellingAck(TunnellingAck::new(request.header, ErrorCode::NoError));
        self.transport.send(&KnxIpFrame::new(ack)).await
    }

    async fn handle_disconnect_request(&self, request: &DisconnectRequest) -> Result<()> {
        if self.communication_channel() != Some(request.channel_id) {
            return Ok(());
        }
        knx_log!(warn, "Gateway closed tunnel channel {}", request.channel_id);
        self.set_session(None);

        let response = KnxIpBody::DisconnectResponse(DisconnectResponse {
            channel_id: request.channel_id,
            status: ErrorCode::NoError,
        });
        self.transport.send(&KnxIpFrame::new(response)).await
    }

    async fn send_tunnelling(&self, telegram: &Telegram) -> Result<()> {
        let _guard = self.exchange.lock().await;
        let session = self.session().ok_or_else(KnxError::not_connected)?;

        for attempt in 1..=TUNNELLING_ATTEMPTS {
            let action = Tunnelling::new(
                telegram.clone(),
                session.identifier,
                session.sequence,
                session.channel,
            );
            let mut exchange = RequestResponse::new(Arc::clone(&self.transport), action)
                .with_timeout(self.config.request_timeout);
            if exchange.start().await? == ActionState::Succeeded {
                if let Some(current) = self
                    .session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_mut()
                {
                    current.sequence = current.sequence.wrapping_add(1);
                }
                return Ok(());
            }
            knx_log!(
                debug,
                "Tunnelling request {} not acknowledged (attempt {}/{})",
                session.sequence,
                attempt,
                TUNNELLING_ATTEMPTS
            );
        }
        Err(KnxError::tunnelling_ack_failed())
    }
}

async fn incoming_loop(tunnel: Weak<Tunnel>, mut rx: mpsc::UnboundedReceiver<KnxIpFrame>) {
    while let Some(frame) = rx.recv().await {
        let Some(tunnel) = tunnel.upgrade() else {
            break;
        };
        if let Err(e) = tunnel.handle_frame(&frame).await {
            knx_log!(warn, "Could not handle {} from gateway: {}", frame.body.name(), e);
        }
    }
}

async fn heartbeat_loop(tunnel: Weak<Tunnel>) {
    let mut failures = 0;
    loop {
        let interval = match tunnel.upgrade() {
            Some(tunnel) => tunnel.config.heartbeat_interval,
            None => break,
        };
        tokio::time::sleep(interval).await;
        let Some(tunnel) = tunnel.upgrade() else {
            break;
        };

        if !tunnel.is_connected() {
            failures = 0;
            if let Err(e) = tunnel.connect().await {
                knx_log!(warn, "Could not reconnect tunnel: {}", e);
            }
            continue;
        }

        match tunnel.connectionstate().await {
            Ok(()) => failures = 0,
            Err(e) => {
                failures += 1;
                knx_log!(
                    warn,
                    "Heartbeat failed ({}/{}): {}",
                    failures,
                    tunnel.config.max_heartbeat_failures,
                    e
                );
                if failures >= tunnel.config.max_heartbeat_failures {
                    failures = 0;
                    knx_log!(warn, "{}", KnxError::connection_lost());
                    if let Err(e) = tunnel.connect().await {
                        knx_log!(warn, "Could not reconnect tunnel: {}", e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl KnxIpInterface for Tunnel {
    async fn send_telegram(&self, telegram: &Telegram) -> Result<()> {
        self.send_tunnelling(telegram).await
    }

    async fn stop(&self) -> Result<()> {
        self.shutdown_tasks();
        if self.is_connected() {
            if let Err(e) = self.disconnect().await {
                knx_log!(warn, "Disconnect failed: {}", e);
            }
        }
        if let Some(id) = self.callback.lock().unwrap_or_else(PoisonError::into_inner).take() {
            self.transport.dispatcher().unregister(id);
        }
        self.transport.stop();
        Ok(())
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown_tasks();
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("transport", &self.transport)
            .field("session", &self.session())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::net::MockTransport;
    use crate::protocol::{
        CemiFrame, ConnectResponse, ConnectionHeader, ConnectionResponseData,
        ConnectionStateResponse, Hpai,
    };
    use crate::service::TelegramQueue;
    use crate::telegram::Payload;

    fn connect_response(channel: u8) -> KnxIpFrame {
        KnxIpFrame::new(KnxIpBody::ConnectResponse(ConnectResponse {
            communication_channel: channel,
            status: ErrorCode::NoError,
            data_endpoint: Hpai::default(),
            crd: ConnectionResponseData {
                identifier: "1.1.9".parse().unwrap(),
                ..ConnectionResponseData::default()
            },
        }))
    }

    fn ack(channel: u8, sequence: u8) -> KnxIpFrame {
        KnxIpFrame::new(KnxIpBody::TunnellingAck(TunnellingAck::new(
            ConnectionHeader::new(channel, sequence),
            ErrorCode::NoError,
        )))
    }

    async fn connected(transport: &Arc<MockTransport>, queue: &TelegramQueue) -> Arc<Tunnel> {
        transport.add_response_frame(&connect_response(7)).unwrap();
        let tunnel = Tunnel::start(transport.clone(), queue.sender(), TunnelConfig::default())
            .await
            .unwrap();
        transport.clear_sent();
        tunnel
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn service_types(transport: &MockTransport) -> Vec<ServiceType> {
        transport
            .sent_frames()
            .iter()
            .map(KnxIpFrame::service_type)
            .collect()
    }

    #[tokio::test]
    async fn test_connect_stores_session() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;

        assert!(tunnel.is_connected());
        assert_eq!(tunnel.communication_channel(), Some(7));
        assert_eq!(tunnel.identifier(), Some("1.1.9".parse().unwrap()));
        assert_eq!(tunnel.sequence_counter(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let result = Tunnel::start(transport.clone(), queue.sender(), TunnelConfig::default()).await;

        assert!(result.unwrap_err().is_timeout());
        assert!(transport.dispatcher().is_empty());
    }

    #[tokio::test]
    async fn test_send_telegram_increments_sequence() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;
        let telegram = Telegram::group_write(GroupAddress::new(1, 2, 3).unwrap(), Payload::Binary(1));

        transport.add_response_frame(&ack(7, 0)).unwrap();
        tunnel.send_telegram(&telegram).await.unwrap();
        assert_eq!(tunnel.sequence_counter(), Some(1));

        let sent = transport.last_sent().unwrap();
        match sent.body {
            KnxIpBody::TunnellingRequest(request) => {
                assert_eq!(request.header, ConnectionHeader::new(7, 0));
                let cemi = request.cemi_frame().unwrap();
                assert_eq!(cemi.code, CemiMessageCode::LDataReq);
                assert_eq!(cemi.src_addr, "1.1.9".parse().unwrap());
                assert_eq!(cemi.to_telegram(TelegramDirection::Outgoing), telegram);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_telegram_retries_once() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;
        let telegram = Telegram::group_read(GroupAddress::new(1, 2, 3).unwrap());

        let error = tunnel.send_telegram(&telegram).await.unwrap_err();
        assert!(matches!(error, KnxError::Connection(ref e) if e.is_ack_failed()));
        assert_eq!(
            service_types(&transport),
            [ServiceType::TunnellingRequest, ServiceType::TunnellingRequest]
        );
        assert_eq!(tunnel.sequence_counter(), Some(0));
    }

    #[tokio::test]
    async fn test_send_without_session() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;
        transport.add_response_frame(&KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
            channel_id: 7,
            status: ErrorCode::NoError,
        })))
        .unwrap();
        tunnel.disconnect().await.unwrap();
        assert!(!tunnel.is_connected());

        let telegram = Telegram::group_read(GroupAddress::new(1, 2, 3).unwrap());
        let error = tunnel.send_telegram(&telegram).await.unwrap_err();
        assert!(matches!(error, KnxError::Connection(ref e) if e.is_not_connected()));
    }

    #[tokio::test]
    async fn test_incoming_request_acked_and_queued() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let _tunnel = connected(&transport, &queue).await;

        let telegram = Telegram::group_write(GroupAddress::new(1, 2, 3).unwrap(), Payload::Binary(1));
        let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataInd, &telegram, "1.1.1".parse().unwrap());
        let request = KnxIpFrame::new(KnxIpBody::TunnellingRequest(
            TunnellingRequest::new(ConnectionHeader::new(7, 0), &cemi).unwrap(),
        ));
        transport.deliver(&request.to_bytes().unwrap());
        settle().await;

        assert_eq!(transport.sent_frames(), vec![ack(7, 0)]);
        assert_eq!(queue.qsize(), 1);
    }

    #[tokio::test]
    async fn test_repeated_incoming_request_queued_once() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let _tunnel = connected(&transport, &queue).await;

        let telegram = Telegram::group_write(GroupAddress::new(1, 2, 3).unwrap(), Payload::Binary(1));
        let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataInd, &telegram, "1.1.1".parse().unwrap());
        let request = |sequence| {
            KnxIpFrame::new(KnxIpBody::TunnellingRequest(
                TunnellingRequest::new(ConnectionHeader::new(7, sequence), &cemi).unwrap(),
            ))
            .to_bytes()
            .unwrap()
        };

        transport.deliver(&request(0));
        settle().await;
        transport.deliver(&request(0));
        settle().await;
        assert_eq!(transport.sent_frames(), vec![ack(7, 0), ack(7, 0)]);
        assert_eq!(queue.qsize(), 1);

        // out of order: neither acknowledged nor queued
        transport.deliver(&request(5));
        settle().await;
        assert_eq!(transport.sent_frames().len(), 2);
        assert_eq!(queue.qsize(), 1);

        transport.deliver(&request(1));
        settle().await;
        assert_eq!(transport.sent_frames().last(), Some(&ack(7, 1)));
        assert_eq!(queue.qsize(), 2);
    }

    #[tokio::test]
    async fn test_incoming_request_for_other_channel_ignored() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let _tunnel = connected(&transport, &queue).await;

        let telegram = Telegram::group_read(GroupAddress::new(1, 2, 3).unwrap());
        let cemi = CemiFrame::from_telegram(CemiMessageCode::LDataInd, &telegram, "1.1.1".parse().unwrap());
        let request = KnxIpFrame::new(KnxIpBody::TunnellingRequest(
            TunnellingRequest::new(ConnectionHeader::new(8, 0), &cemi).unwrap(),
        ));
        transport.deliver(&request.to_bytes().unwrap());
        settle().await;

        assert!(transport.sent_frames().is_empty());
        assert_eq!(queue.qsize(), 0);
    }

    #[tokio::test]
    async fn test_gateway_disconnect_resets_session() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;

        let request = KnxIpFrame::new(KnxIpBody::DisconnectRequest(DisconnectRequest::new(
            7,
            Hpai::default(),
        )));
        transport.deliver(&request.to_bytes().unwrap());
        settle().await;

        assert!(!tunnel.is_connected());
        assert_eq!(service_types(&transport), [ServiceType::DisconnectResponse]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_reconnects_after_failures() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;

        // one answered heartbeat, then silence
        transport
            .add_response_frame(&KnxIpFrame::new(KnxIpBody::ConnectionStateResponse(
                ConnectionStateResponse {
                    channel_id: 7,
                    status: ErrorCode::NoError,
                },
            )))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(tunnel.is_connected());

        tokio::time::sleep(Duration::from_secs(3 * 61 + 5)).await;
        assert_eq!(
            service_types(&transport),
            [
                ServiceType::ConnectionStateRequest,
                ServiceType::ConnectionStateRequest,
                ServiceType::ConnectionStateRequest,
                ServiceType::ConnectionStateRequest,
                ServiceType::ConnectRequest,
            ]
        );
        assert!(!tunnel.is_connected());
    }

    #[tokio::test]
    async fn test_stop_disconnects_and_unregisters() {
        let transport = Arc::new(MockTransport::new());
        let queue = TelegramQueue::new();
        let tunnel = connected(&transport, &queue).await;
        transport
            .add_response_frame(&KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
                channel_id: 7,
                status: ErrorCode::NoError,
            })))
            .unwrap();

        tunnel.stop().await.unwrap();
        assert!(!tunnel.is_connected());
        assert_eq!(service_types(&transport), [ServiceType::DisconnectRequest]);
        assert!(transport.dispatcher().is_empty());
    }
}
