//! Top level client context.

use std::net::SocketAddrV4;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::{ConnectionConfig, KnxConfig};
use crate::devices::Devices;
use crate::error::Result;
use crate::io::{KnxIpInterface, Routing, Tunnel, TunnelConfig};
use crate::net::UdpClient;
use crate::protocol::{KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR};
use crate::service::{StateUpdater, TelegramQueue};

/// Owns the telegram queue, the devices, the bus interface and the state
/// updater of one client.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use knx_client::devices::Switch;
/// use knx_client::{ga, Knx};
///
/// # async fn run() -> knx_client::Result<()> {
/// let knx = Knx::new("GATEWAY_IP=192.168.1.10".parse()?);
/// let light = Arc::new(Switch::new("light", ga!(1/2/3), knx.queue().sender()));
/// knx.devices().add(light.clone())?;
///
/// knx.start(true).await?;
/// light.set_on()?;
/// knx.stop().await
/// # }
/// ```
#[derive(Debug)]
pub struct Knx {
    config: KnxConfig,
    queue: Arc<TelegramQueue>,
    interface: Mutex<Option<Arc<dyn KnxIpInterface>>>,
    state_updater: StateUpdater,
}

impl Knx {
    /// Client for `config`, not yet connected.
    pub fn new(config: KnxConfig) -> Self {
        Self {
            config,
            queue: Arc::new(TelegramQueue::new().with_rate_limit(config.rate_limit)),
            interface: Mutex::new(None),
            state_updater: StateUpdater::new(),
        }
    }

    /// Replace the state updater, e.g. to change its timing.
    #[must_use]
    pub fn with_state_updater(mut self, state_updater: StateUpdater) -> Self {
        self.state_updater = state_updater;
        self
    }

    /// Configuration
    pub fn config(&self) -> &KnxConfig {
        &self.config
    }

    /// Telegram queue
    pub fn queue(&self) -> &Arc<TelegramQueue> {
        &self.queue
    }

    /// Device registry
    pub fn devices(&self) -> &Arc<Devices> {
        self.queue.devices()
    }

    /// State updater
    pub fn state_updater(&self) -> &StateUpdater {
        &self.state_updater
    }

    /// Check whether an interface is attached.
    pub fn is_connected(&self) -> bool {
        self.interface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Connect to the bus as configured and start processing telegrams.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the socket cannot be opened, or the
    /// connect error of the tunnel.
    pub async fn start(&self, state_updater: bool) -> Result<()> {
        let interface = self.connect_interface().await?;
        self.start_with_interface(interface, state_updater);
        Ok(())
    }

    /// Start processing telegrams over an interface created elsewhere.
    pub fn start_with_interface(&self, interface: Arc<dyn KnxIpInterface>, state_updater: bool) {
        self.queue.set_interface(Some(Arc::clone(&interface)));
        *self.interface.lock().unwrap_or_else(PoisonError::into_inner) = Some(interface);
        self.queue.start();
        if state_updater {
            self.state_updater.start(Arc::clone(&self.queue));
        }
        knx_log!(info, "KNX client started");
    }

    async fn connect_interface(&self) -> Result<Arc<dyn KnxIpInterface>> {
        match self.config.connection {
            ConnectionConfig::Tunneling { gateway, local_ip } => {
                knx_log!(info, "Connecting to KNX/IP gateway {}", gateway);
                let transport = UdpClient::unicast(SocketAddrV4::new(local_ip, 0), gateway).await?;
                let tunnel: Arc<dyn KnxIpInterface> =
                    Tunnel::start(Arc::new(transport), self.queue.sender(), TunnelConfig::default())
                        .await?;
                Ok(tunnel)
            }
            ConnectionConfig::Routing { local_ip } => {
                let group = SocketAddrV4::new(KNXNETIP_MULTICAST_ADDR, KNXNETIP_DEFAULT_PORT);
                let transport = UdpClient::multicast(local_ip, group).await?;
                let routing: Arc<dyn KnxIpInterface> =
                    Routing::start(Arc::new(transport), self.queue.sender(), self.config.own_address);
                Ok(routing)
            }
        }
    }

    /// Stop the state updater, drain the queue, then close the interface.
    ///
    /// # Errors
    ///
    /// Returns the error of the interface shutdown.
    pub async fn stop(&self) -> Result<()> {
        self.state_updater.stop();
        self.queue.stop().await;
        self.queue.set_interface(None);

        let interface = self
            .interface
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(interface) = interface {
            interface.stop().await?;
        }
        knx_log!(info, "KNX client stopped");
        Ok(())
    }
}
