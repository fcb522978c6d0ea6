//! Device registry keyed by name with a group address index.

use core::fmt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::addressing::GroupAddress;
use crate::devices::Device;
use crate::error::{KnxError, Result};
use crate::service::{TelegramQueue, ValueReader};
use crate::telegram::Telegram;

/// Callback invoked after a device changed state.
pub type DeviceUpdatedCallback = Arc<dyn Fn(&dyn Device) + Send + Sync>;

/// Token returned by [`Devices::register_device_updated_cb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceUpdatedHandle(u64);

/// Shared list of device updated callbacks.
///
/// [`Devices`] hands a clone to every device it registers, so a device can
/// report state changes it caused itself.
#[derive(Clone, Default)]
pub struct DeviceUpdatedNotifier {
    callbacks: Arc<RwLock<Vec<(DeviceUpdatedHandle, DeviceUpdatedCallback)>>>,
}

impl DeviceUpdatedNotifier {
    /// Run every registered callback for `device`.
    pub fn notify(&self, device: &dyn Device) {
        let callbacks: Vec<DeviceUpdatedCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(device);
        }
    }
}

impl fmt::Debug for DeviceUpdatedNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("DeviceUpdatedNotifier")
            .field("callbacks", &count)
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    /// Registration order
    devices: Vec<Arc<dyn Device>>,
    groups: HashMap<GroupAddress, Vec<Arc<dyn Device>>>,
}

/// Registered devices.
#[derive(Default)]
pub struct Devices {
    inner: RwLock<Inner>,
    notifier: DeviceUpdatedNotifier,
    next_handle: AtomicU64,
}

impl Devices {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device.
    ///
    /// # Errors
    ///
    /// Returns a `Device` error if the name is already taken.
    pub fn add(&self, device: Arc<dyn Device>) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.devices.iter().any(|known| known.name() == device.name()) {
            return Err(KnxError::device_already_registered(device.name()));
        }
        for group_address in device.all_addresses() {
            let listeners = inner.groups.entry(group_address).or_default();
            if !listeners.iter().any(|known| known.name() == device.name()) {
                listeners.push(Arc::clone(&device));
            }
        }
        device.set_notifier(Some(self.notifier.clone()));
        inner.devices.push(device);
        Ok(())
    }

    /// Remove a device by name.
    ///
    /// # Errors
    ///
    /// Returns a `Device` error if no device has that name.
    pub fn remove(&self, name: &str) -> Result<Arc<dyn Device>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let index = inner
            .devices
            .iter()
            .position(|device| device.name() == name)
            .ok_or_else(|| KnxError::device_not_found(name))?;
        let device = inner.devices.remove(index);
        device.set_notifier(None);

        inner.groups.retain(|_, listeners| {
            listeners.retain(|listener| listener.name() != name);
            !listeners.is_empty()
        });
        Ok(device)
    }

    /// Device by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .devices
            .iter()
            .find(|device| device.name() == name)
            .cloned()
    }

    /// Check whether a device with `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .devices
            .len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all devices in registration order
    pub fn devices(&self) -> Vec<Arc<dyn Device>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .devices
            .clone()
    }

    /// Devices listening on `group_address`
    pub fn devices_by_group_address(&self, group_address: GroupAddress) -> Vec<Arc<dyn Device>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(&group_address)
            .cloned()
            .unwrap_or_default()
    }

    /// Register a callback for device state changes.
    pub fn register_device_updated_cb<F>(&self, callback: F) -> DeviceUpdatedHandle
    where
        F: Fn(&dyn Device) + Send + Sync + 'static,
    {
        let handle = DeviceUpdatedHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.notifier
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((handle, Arc::new(callback)));
        handle
    }

    /// Remove a device updated callback.
    pub fn unregister_device_updated_cb(&self, handle: DeviceUpdatedHandle) {
        self.notifier
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(known, _)| *known != handle);
    }

    /// Notify the device updated callbacks.
    pub fn device_updated(&self, device: &dyn Device) {
        self.notifier.notify(device);
    }

    /// Hand a telegram to every device listening on its address.
    ///
    /// All devices see the telegram even if one of them fails.
    ///
    /// # Errors
    ///
    /// Returns the first device error.
    pub fn process(&self, telegram: &Telegram) -> Result<()> {
        let mut first_error = None;
        for device in self.devices_by_group_address(telegram.group_address) {
            match device.process(telegram) {
                Ok(true) => self.device_updated(device.as_ref()),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Read the state addresses of every device from the bus.
    pub async fn sync(&self, queue: &TelegramQueue, read_timeout: Duration) {
        for device in self.devices() {
            knx_log!(debug, "Sync {}", device.name());
            for group_address in device.state_addresses() {
                let reader = ValueReader::with_timeout(queue, group_address, read_timeout);
                let Some(telegram) = reader.read().await else {
                    knx_log!(
                        warn,
                        "Could not sync group address '{}' from {}",
                        group_address,
                        device.name()
                    );
                    continue;
                };
                match device.process(&telegram) {
                    Ok(true) => self.device_updated(device.as_ref()),
                    Ok(false) => {}
                    Err(e) => knx_log!(error, "Error while syncing device {}: {}", device.name(), e),
                }
            }
        }
    }
}

impl fmt::Debug for Devices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .devices()
            .iter()
            .map(|device| device.name().to_owned())
            .collect();
        f.debug_struct("Devices").field("devices", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Switch;
    use crate::telegram::{Payload, TelegramDirection};
    use std::sync::Mutex;

    fn switch(name: &str, address: &str, queue: &TelegramQueue) -> Arc<Switch> {
        Arc::new(Switch::new(name, address.parse().unwrap(), queue.sender()))
    }

    fn write(address: &str, value: u8) -> Telegram {
        Telegram::group_write(address.parse().unwrap(), Payload::Binary(value))
            .with_direction(TelegramDirection::Incoming)
    }

    #[test]
    fn test_add_and_lookup() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        devices.add(switch("a", "1/2/3", &queue)).unwrap();
        devices.add(switch("b", "1/2/3", &queue)).unwrap();
        devices.add(switch("c", "1/2/4", &queue)).unwrap();

        assert_eq!(devices.len(), 3);
        assert!(devices.contains("b"));
        let names: Vec<String> = devices
            .devices_by_group_address("1/2/3".parse().unwrap())
            .iter()
            .map(|device| device.name().to_owned())
            .collect();
        assert_eq!(names, ["a", "b"]);
        assert!(devices
            .devices_by_group_address("2/2/2".parse().unwrap())
            .is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        devices.add(switch("a", "1/2/3", &queue)).unwrap();

        match devices.add(switch("a", "1/2/4", &queue)) {
            Err(KnxError::Device(e)) => {
                assert!(e.is_already_registered());
                assert_eq!(e.name(), "a");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_remove() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        devices.add(switch("a", "1/2/3", &queue)).unwrap();

        assert_eq!(devices.remove("a").unwrap().name(), "a");
        assert!(devices.is_empty());
        assert!(devices
            .devices_by_group_address("1/2/3".parse().unwrap())
            .is_empty());
        assert!(devices.remove("a").is_err());
    }

    #[test]
    fn test_process_notifies_on_change() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        devices.add(switch("a", "1/2/3", &queue)).unwrap();

        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let handle = devices.register_device_updated_cb(move |device| {
            sink.lock().unwrap().push(device.name().to_owned());
        });

        devices.process(&write("1/2/3", 1)).unwrap();
        devices.process(&write("1/2/3", 1)).unwrap();
        assert_eq!(*updates.lock().unwrap(), ["a"]);

        devices.unregister_device_updated_cb(handle);
        devices.process(&write("1/2/3", 0)).unwrap();
        assert_eq!(updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_local_change_notifies() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        let outlet = switch("a", "1/2/3", &queue);
        devices.add(outlet.clone()).unwrap();

        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        devices.register_device_updated_cb(move |device| {
            sink.lock().unwrap().push(device.name().to_owned());
        });

        outlet.set_on().unwrap();
        outlet.set_on().unwrap();
        assert_eq!(*updates.lock().unwrap(), ["a"]);

        devices.remove("a").unwrap();
        outlet.set_off().unwrap();
        assert_eq!(updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_process_reaches_all_devices_despite_error() {
        let queue = TelegramQueue::new();
        let devices = Devices::new();
        let first = switch("a", "1/2/3", &queue);
        let second = switch("b", "1/2/3", &queue);
        devices.add(first.clone()).unwrap();
        devices.add(second.clone()).unwrap();

        let bad = Telegram::group_write("1/2/3".parse().unwrap(), Payload::Array(vec![1, 1]));
        assert!(devices.process(&bad).is_err());
        assert_eq!(first.state(), None);

        devices.process(&write("1/2/3", 1)).unwrap();
        assert_eq!(first.state(), Some(true));
        assert_eq!(second.state(), Some(true));
    }
}
