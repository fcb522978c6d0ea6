//! Binary on/off switch.

use std::sync::{Mutex, PoisonError};

use crate::addressing::GroupAddress;
use crate::devices::{Device, DeviceUpdatedNotifier};
use crate::error::{KnxError, Result};
use crate::service::TelegramSender;
use crate::telegram::{Payload, Telegram};

/// Switch controlled through one group address, with an optional separate
/// state address.
#[derive(Debug)]
pub struct Switch {
    name: String,
    group_address: GroupAddress,
    group_address_state: Option<GroupAddress>,
    respond_to_read: bool,
    state: Mutex<Option<bool>>,
    sender: TelegramSender,
    notifier: Mutex<Option<DeviceUpdatedNotifier>>,
}

impl Switch {
    /// Create a switch on `group_address`. The state is unknown until a
    /// telegram arrives or [`set`](Self::set) is called.
    pub fn new(name: impl Into<String>, group_address: GroupAddress, sender: TelegramSender) -> Self {
        Self {
            name: name.into(),
            group_address,
            group_address_state: None,
            respond_to_read: false,
            state: Mutex::new(None),
            sender,
            notifier: Mutex::new(None),
        }
    }

    /// Read the state from `group_address_state` instead.
    #[must_use]
    pub fn with_state_address(mut self, group_address_state: GroupAddress) -> Self {
        self.group_address_state = Some(group_address_state);
        self
    }

    /// Answer `GroupValueRead` on the switch address with the current state.
    #[must_use]
    pub fn with_respond_to_read(mut self, respond_to_read: bool) -> Self {
        self.respond_to_read = respond_to_read;
        self
    }

    /// Last known state
    pub fn state(&self) -> Option<bool> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a write for `on` and take it as the new state. A change is
    /// reported to the device updated callbacks of the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the telegram could not be queued.
    pub fn set(&self, on: bool) -> Result<()> {
        self.sender
            .put(Telegram::group_write(self.group_address, Payload::Binary(u8::from(on))))?;
        if self.update_state(on) {
            let notifier = self
                .notifier
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(notifier) = notifier {
                notifier.notify(self);
            }
        }
        Ok(())
    }

    fn update_state(&self, on: bool) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *state != Some(on);
        *state = Some(on);
        changed
    }

    /// Switch on.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_on(&self) -> Result<()> {
        self.set(true)
    }

    /// Switch off.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_off(&self) -> Result<()> {
        self.set(false)
    }

    /// Run a textual action, `"on"` or `"off"`. Unknown actions are logged
    /// and ignored.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn do_action(&self, action: &str) -> Result<()> {
        match action {
            "on" => self.set_on(),
            "off" => self.set_off(),
            _ => {
                knx_log!(warn, "Could not understand action {} for device {}", action, self.name);
                Ok(())
            }
        }
    }

    fn parse_payload(payload: Option<&Payload>) -> Result<bool> {
        match payload {
            Some(Payload::Binary(0)) => Ok(false),
            Some(Payload::Binary(1)) => Ok(true),
            _ => Err(KnxError::could_not_parse_telegram("switch expects a binary payload")),
        }
    }
}

impl Device for Switch {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_addresses(&self) -> Vec<GroupAddress> {
        let mut addresses = vec![self.group_address];
        addresses.extend(self.group_address_state);
        addresses
    }

    fn set_notifier(&self, notifier: Option<DeviceUpdatedNotifier>) {
        *self.notifier.lock().unwrap_or_else(PoisonError::into_inner) = notifier;
    }

    fn state_addresses(&self) -> Vec<GroupAddress> {
        vec![self.group_address_state.unwrap_or(self.group_address)]
    }

    fn process_group_write(&self, telegram: &Telegram) -> Result<bool> {
        let on = Self::parse_payload(telegram.payload.as_ref())?;
        Ok(self.update_state(on))
    }

    fn process_group_read(&self, telegram: &Telegram) -> Result<bool> {
        if !self.respond_to_read || telegram.group_address != self.group_address {
            return Ok(false);
        }
        if let Some(on) = self.state() {
            self.sender.put(Telegram::group_response(
                self.group_address,
                Payload::Binary(u8::from(on)),
            ))?;
        }
        Ok(false)
    }
}
