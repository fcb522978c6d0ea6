//! Device trait.

use core::fmt;

use crate::addressing::GroupAddress;
use crate::devices::DeviceUpdatedNotifier;
use crate::error::Result;
use crate::telegram::{Telegram, TelegramType};

/// A bus device model fed with incoming telegrams.
///
/// The `process_*` methods return `Ok(true)` when the device state changed,
/// which triggers the device updated callbacks of the registry.
pub trait Device: Send + Sync + fmt::Debug {
    /// Unique name used as registry key
    fn name(&self) -> &str;

    /// Every group address the device listens on.
    fn all_addresses(&self) -> Vec<GroupAddress>;

    /// Addresses read to sync the device state. Empty by default.
    fn state_addresses(&self) -> Vec<GroupAddress> {
        Vec::new()
    }

    /// Receive the registry notifier on add, `None` on removal. Devices
    /// changing state on their own report through it.
    fn set_notifier(&self, _notifier: Option<DeviceUpdatedNotifier>) {}

    /// Check whether the device listens on `group_address`.
    fn has_group_address(&self, group_address: GroupAddress) -> bool {
        self.all_addresses().contains(&group_address)
    }

    /// Dispatch a telegram by type.
    ///
    /// # Errors
    ///
    /// Returns a `Telegram` error if the payload has the wrong shape.
    fn process(&self, telegram: &Telegram) -> Result<bool> {
        match telegram.telegram_type {
            TelegramType::GroupWrite => self.process_group_write(telegram),
            TelegramType::GroupResponse => self.process_group_response(telegram),
            TelegramType::GroupRead => self.process_group_read(telegram),
        }
    }

    /// Handle a `GroupValueWrite`. Ignored by default.
    fn process_group_write(&self, _telegram: &Telegram) -> Result<bool> {
        Ok(false)
    }

    /// Handle a `GroupValueResponse` like a write.
    fn process_group_response(&self, telegram: &Telegram) -> Result<bool> {
        self.process_group_write(telegram)
    }

    /// Handle a `GroupValueRead`. Devices do not answer reads by default.
    fn process_group_read(&self, _telegram: &Telegram) -> Result<bool> {
        Ok(false)
    }
}
