//! Telegram dispatch queue.
//!
//! Every telegram, incoming or outgoing, passes through one FIFO queue with
//! a single consumer:
//!
//! - outgoing telegrams wait out the rate limit, then go to the attached
//!   [`KnxIpInterface`];
//! - incoming telegrams go to the registered callbacks in registration
//!   order, then to the devices listening on the group address unless a
//!   callback reported them handled.
//!
//! Errors are logged with the offending telegram and never stop the loop.

use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::addressing::AddressFilter;
use crate::devices::Devices;
use crate::error::{KnxError, Result};
use crate::io::KnxIpInterface;
use crate::telegram::{Telegram, TelegramDirection};

/// Boxed future returned by telegram callbacks. `true` means handled.
pub type TelegramCallbackFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

type TelegramCallbackFn = dyn Fn(Telegram) -> TelegramCallbackFuture + Send + Sync;

/// Token returned by [`TelegramQueue::register_telegram_received_cb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

struct Registration {
    handle: CallbackHandle,
    callback: Box<TelegramCallbackFn>,
    filters: Option<Vec<AddressFilter>>,
}

impl Registration {
    fn is_within_filter(&self, telegram: &Telegram) -> bool {
        match &self.filters {
            None => true,
            Some(filters) => filters
                .iter()
                .any(|filter| filter.matches(telegram.group_address)),
        }
    }
}

#[derive(Debug)]
enum QueueItem {
    Telegram(Telegram),
    Stop,
}

/// Cloneable producer side of the queue.
///
/// Interfaces and devices hold one of these instead of the queue itself.
#[derive(Debug, Clone)]
pub struct TelegramSender {
    tx: mpsc::UnboundedSender<QueueItem>,
    pending: Arc<AtomicUsize>,
}

impl TelegramSender {
    /// Enqueue a telegram. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the queue was dropped.
    pub fn put(&self, telegram: Telegram) -> Result<()> {
        knx_log!(@telegram debug, "{}", telegram);
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueueItem::Telegram(telegram)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(KnxError::InvalidState);
        }
        Ok(())
    }
}

/// Single consumer telegram queue.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use knx_client::service::TelegramQueue;
/// use knx_client::{ga, Payload, Telegram};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> knx_client::Result<()> {
/// let queue = Arc::new(TelegramQueue::new());
/// queue.register_telegram_received_cb(
///     |telegram| async move {
///         println!("{telegram}");
///         false
///     },
///     Some(vec!["1/2/*".parse()?]),
/// );
/// queue.put(Telegram::group_write(ga!(1/2/3), Payload::Binary(1)))?;
/// queue.process_all_telegrams().await?;
/// # Ok(())
/// # }
/// ```
pub struct TelegramQueue {
    sender: TelegramSender,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueItem>>,
    callbacks: RwLock<Vec<Arc<Registration>>>,
    next_handle: AtomicU64,
    rate_limit: Duration,
    interface: RwLock<Option<Arc<dyn KnxIpInterface>>>,
    devices: Arc<Devices>,
    stopped: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramQueue {
    /// Queue without rate limit and with an empty device registry.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: TelegramSender {
                tx,
                pending: Arc::new(AtomicUsize::new(0)),
            },
            receiver: tokio::sync::Mutex::new(rx),
            callbacks: RwLock::new(Vec::new()),
            next_handle: AtomicU64::new(0),
            rate_limit: Duration::ZERO,
            interface: RwLock::new(None),
            devices: Arc::new(Devices::new()),
            stopped: AtomicBool::new(true),
            consumer: Mutex::new(None),
        }
    }

    /// Limit outgoing traffic to `telegrams_per_second`. Zero disables the
    /// limit.
    #[must_use]
    pub fn with_rate_limit(mut self, telegrams_per_second: u32) -> Self {
        self.rate_limit = if telegrams_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / telegrams_per_second
        };
        self
    }

    /// Route unhandled incoming telegrams to `devices`.
    #[must_use]
    pub fn with_devices(mut self, devices: Arc<Devices>) -> Self {
        self.devices = devices;
        self
    }

    /// Delay applied before every outgoing telegram
    pub fn rate_limit(&self) -> Duration {
        self.rate_limit
    }

    /// Device registry receiving unhandled incoming telegrams
    pub fn devices(&self) -> &Arc<Devices> {
        &self.devices
    }

    /// Producer handle for interfaces and devices
    pub fn sender(&self) -> TelegramSender {
        self.sender.clone()
    }

    /// Attach or detach the interface used for outgoing telegrams.
    pub fn set_interface(&self, interface: Option<Arc<dyn KnxIpInterface>>) {
        *self.interface.write().unwrap_or_else(PoisonError::into_inner) = interface;
    }

    /// Enqueue a telegram.
    ///
    /// # Errors
    ///
    /// See [`TelegramSender::put`].
    pub fn put(&self, telegram: Telegram) -> Result<()> {
        self.sender.put(telegram)
    }

    /// Number of telegrams put but not yet taken by the consumer
    pub fn qsize(&self) -> usize {
        self.sender.pending.load(Ordering::SeqCst)
    }

    /// Check whether the consume loop is not running.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Register a callback for incoming telegrams.
    ///
    /// With `filters` the callback only sees telegrams whose group address
    /// matches at least one filter. Returning `true` marks the telegram as
    /// handled: later callbacks and the devices do not see it.
    pub fn register_telegram_received_cb<F, Fut>(
        &self,
        callback: F,
        filters: Option<Vec<AddressFilter>>,
    ) -> CallbackHandle
    where
        F: Fn(Telegram) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let handle = CallbackHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            handle,
            callback: Box::new(move |telegram| -> TelegramCallbackFuture {
                Box::pin(callback(telegram))
            }),
            filters,
        });
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(registration);
        handle
    }

    /// Remove a callback. Unknown handles are ignored.
    pub fn unregister_telegram_received_cb(&self, handle: CallbackHandle) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|registration| registration.handle != handle);
    }

    /// Number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Subscribe to every incoming telegram without consuming it.
    pub fn receiver(self: &Arc<Self>) -> TelegramReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.register_telegram_received_cb(
            move |telegram| {
                let _ = tx.send(telegram);
                async { false }
            },
            None,
        );
        TelegramReceiver {
            rx,
            queue: Arc::downgrade(self),
            handle,
        }
    }

    /// Spawn the consume loop.
    pub fn start(self: &Arc<Self>) {
        let mut consumer = self.consumer.lock().unwrap_or_else(PoisonError::into_inner);
        if consumer.is_some() {
            return;
        }
        self.stopped.store(false, Ordering::SeqCst);
        let queue = Arc::clone(self);
        *consumer = Some(tokio::spawn(async move { queue.run().await }));
    }

    /// Stop the consume loop after everything put so far is processed.
    pub async fn stop(&self) {
        let consumer = self
            .consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(consumer) = consumer {
            let _ = self.sender.tx.send(QueueItem::Stop);
            if let Err(e) = consumer.await {
                knx_log!(error, "Telegram queue consumer ended abnormally: {}", e);
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn run(&self) {
        let mut receiver = self.receiver.lock().await;
        while let Some(item) = receiver.recv().await {
            match item {
                QueueItem::Telegram(telegram) => {
                    self.sender.pending.fetch_sub(1, Ordering::SeqCst);
                    self.process_telegram(telegram).await;
                }
                QueueItem::Stop => break,
            }
        }
        knx_log!(debug, "Telegram queue stopped");
    }

    /// Process everything currently queued, then return.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` while the consume loop is running.
    pub async fn process_all_telegrams(&self) -> Result<()> {
        let mut receiver = self
            .receiver
            .try_lock()
            .ok()
            .ok_or(KnxError::InvalidState)?;
        while let Ok(item) = receiver.try_recv() {
            if let QueueItem::Telegram(telegram) = item {
                self.sender.pending.fetch_sub(1, Ordering::SeqCst);
                self.process_telegram(telegram).await;
            }
        }
        Ok(())
    }

    /// Process one telegram. Failures are logged, not returned.
    pub async fn process_telegram(&self, telegram: Telegram) {
        let result = match telegram.direction {
            TelegramDirection::Incoming => self.process_telegram_incoming(&telegram).await,
            TelegramDirection::Outgoing => self.process_telegram_outgoing(&telegram).await,
        };
        if let Err(e) = result {
            knx_log!(error, "Error while processing telegram {}: {}", telegram, e);
        }
    }

    async fn process_telegram_outgoing(&self, telegram: &Telegram) -> Result<()> {
        if !self.rate_limit.is_zero() {
            tokio::time::sleep(self.rate_limit).await;
        }

        let interface = self
            .interface
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match interface {
            Some(interface) => interface.send_telegram(telegram).await,
            None => {
                knx_log!(warn, "No KNXIP interface defined");
                Ok(())
            }
        }
    }

    /// Hand an incoming telegram to the callbacks, then to the devices.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a device.
    pub async fn process_telegram_incoming(&self, telegram: &Telegram) -> Result<()> {
        let snapshot: Vec<Arc<Registration>> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for registration in snapshot {
            if !registration.is_within_filter(telegram) {
                continue;
            }
            if (registration.callback)(telegram.clone()).await {
                return Ok(());
            }
        }

        self.devices.process(telegram)
    }
}

impl Default for TelegramQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TelegramQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramQueue")
            .field("pending", &self.qsize())
            .field("callbacks", &self.callback_count())
            .field("rate_limit", &self.rate_limit)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Stream of incoming telegrams from [`TelegramQueue::receiver`].
///
/// Unregisters itself when dropped.
#[derive(Debug)]
pub struct TelegramReceiver {
    rx: mpsc::UnboundedReceiver<Telegram>,
    queue: Weak<TelegramQueue>,
    handle: CallbackHandle,
}

impl TelegramReceiver {
    /// Next incoming telegram. `None` once the queue is gone.
    pub async fn recv(&mut self) -> Option<Telegram> {
        self.rx.recv().await
    }
}

impl Drop for TelegramReceiver {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.unregister_telegram_received_cb(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::GroupAddress;
    use crate::devices::{Device, Switch};
    use crate::io::interface::test_support::RecordingInterface;
    use crate::telegram::Payload;

    fn incoming(address: &str) -> Telegram {
        Telegram::group_write(address.parse().unwrap(), Payload::Binary(1))
            .with_direction(TelegramDirection::Incoming)
    }

    fn recorder() -> (Arc<Mutex<Vec<Telegram>>>, impl Fn(Telegram) -> std::future::Ready<bool>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |telegram| {
            sink.lock().unwrap().push(telegram);
            std::future::ready(false)
        };
        (seen, callback)
    }

    #[tokio::test]
    async fn test_start_stop() {
        let queue = Arc::new(TelegramQueue::new());
        assert!(queue.is_stopped());

        queue.start();
        assert!(!queue.is_stopped());

        queue.put(incoming("1/2/3")).unwrap();
        queue.put(incoming("1/2/4")).unwrap();
        queue.stop().await;

        assert!(queue.is_stopped());
        assert_eq!(queue.qsize(), 0);
    }

    #[tokio::test]
    async fn test_stop_drains_queued_telegrams_in_order() {
        let queue = Arc::new(TelegramQueue::new());
        let (seen, callback) = recorder();
        queue.register_telegram_received_cb(callback, None);

        for address in ["1/2/1", "1/2/2", "1/2/3"] {
            queue.put(incoming(address)).unwrap();
        }
        queue.start();
        queue.stop().await;

        let addresses: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|telegram| telegram.group_address.to_string())
            .collect();
        assert_eq!(addresses, ["1/2/1", "1/2/2", "1/2/3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit() {
        let queue = Arc::new(TelegramQueue::new().with_rate_limit(20));
        let interface = RecordingInterface::new();
        queue.set_interface(Some(interface.clone()));
        assert_eq!(queue.rate_limit(), Duration::from_millis(50));

        let start = tokio::time::Instant::now();
        queue.put(incoming("1/1/1")).unwrap();
        queue.put(incoming("1/1/2")).unwrap();
        queue.process_all_telegrams().await.unwrap();
        assert_eq!(tokio::time::Instant::now(), start);

        queue
            .put(Telegram::group_write(GroupAddress::from(1), Payload::Binary(1)))
            .unwrap();
        queue
            .put(Telegram::group_write(GroupAddress::from(2), Payload::Binary(0)))
            .unwrap();
        queue.process_all_telegrams().await.unwrap();

        let instants = interface.instants();
        assert_eq!(instants.len(), 2);
        assert!(instants[0] - start >= Duration::from_millis(50));
        assert!(instants[1] - instants[0] >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let queue = TelegramQueue::new();
        let (seen, callback) = recorder();
        let handle = queue.register_telegram_received_cb(callback, None);

        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        queue.unregister_telegram_received_cb(handle);
        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(queue.callback_count(), 0);
    }

    #[tokio::test]
    async fn test_positive_and_negative_filters() {
        let queue = TelegramQueue::new();
        let (seen, callback) = recorder();
        let filters = vec![
            AddressFilter::new("2/4-8/*").unwrap(),
            AddressFilter::new("1/2/-8").unwrap(),
        ];
        queue.register_telegram_received_cb(callback, Some(filters));

        queue.process_telegram(incoming("1/2/3")).await;
        queue.process_telegram(incoming("1/2/9")).await;
        queue.process_telegram(incoming("2/5/100")).await;

        let addresses: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|telegram| telegram.group_address.to_string())
            .collect();
        assert_eq!(addresses, ["1/2/3", "2/5/100"]);
    }

    #[tokio::test]
    async fn test_handled_telegram_skips_devices() {
        let queue = TelegramQueue::new();
        let switch = Arc::new(Switch::new("light", "1/2/3".parse().unwrap(), queue.sender()));
        queue.devices().add(switch.clone()).unwrap();

        let handle = queue.register_telegram_received_cb(|_| async { true }, None);
        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(switch.state(), None);

        queue.unregister_telegram_received_cb(handle);
        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(switch.state(), Some(true));
    }

    #[tokio::test]
    async fn test_callbacks_run_in_registration_order() {
        let queue = TelegramQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for index in 0..3 {
            let order = Arc::clone(&order);
            queue.register_telegram_received_cb(
                move |_| {
                    order.lock().unwrap().push(index);
                    async move { index == 1 }
                },
                None,
            );
        }

        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_outgoing_without_interface_is_dropped() {
        let queue = TelegramQueue::new();
        queue
            .put(Telegram::group_read(GroupAddress::from(1)))
            .unwrap();
        queue.process_all_telegrams().await.unwrap();
        assert_eq!(queue.qsize(), 0);

        let interface = RecordingInterface::new();
        queue.set_interface(Some(interface.clone()));
        queue
            .put(Telegram::group_read(GroupAddress::from(1)))
            .unwrap();
        queue.process_all_telegrams().await.unwrap();
        assert_eq!(
            interface.telegrams(),
            vec![Telegram::group_read(GroupAddress::from(1))]
        );
    }

    #[tokio::test]
    async fn test_device_error_does_not_stop_processing() {
        let queue = TelegramQueue::new();
        let switch = Arc::new(Switch::new("light", "1/2/3".parse().unwrap(), queue.sender()));
        queue.devices().add(switch.clone()).unwrap();

        let bad = Telegram::group_write("1/2/3".parse().unwrap(), Payload::Array(vec![1, 2]))
            .with_direction(TelegramDirection::Incoming);
        assert!(queue.process_telegram_incoming(&bad).await.is_err());

        queue.put(bad).unwrap();
        queue.put(incoming("1/2/3")).unwrap();
        queue.process_all_telegrams().await.unwrap();
        assert_eq!(switch.state(), Some(true));
        assert_eq!(switch.name(), "light");
    }

    #[tokio::test]
    async fn test_process_all_telegrams_refused_while_running() {
        let queue = Arc::new(TelegramQueue::new());
        queue.start();
        tokio::task::yield_now().await;
        assert!(matches!(
            queue.process_all_telegrams().await,
            Err(KnxError::InvalidState)
        ));
        queue.stop().await;
        assert!(queue.process_all_telegrams().await.is_ok());
    }

    #[tokio::test]
    async fn test_receiver() {
        let queue = Arc::new(TelegramQueue::new());
        let mut receiver = queue.receiver();
        assert_eq!(queue.callback_count(), 1);

        queue.process_telegram(incoming("1/2/3")).await;
        assert_eq!(receiver.recv().await, Some(incoming("1/2/3")));

        drop(receiver);
        assert_eq!(queue.callback_count(), 0);
    }
}
