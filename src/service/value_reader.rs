//! Read the current value of one group address from the bus.
//!
//! A [`ValueReader`] sends a `GroupValueRead` and waits for the first
//! `GroupValueResponse` or `GroupValueWrite` on the same address. That
//! answer is consumed: it does not reach the devices. Later telegrams on the
//! address pass through untouched.

use std::time::Duration;

use crate::addressing::{AddressFilter, GroupAddress};
use crate::error::Result;
use crate::service::completion::completion;
use crate::service::telegram_queue::TelegramQueue;
use crate::telegram::{Telegram, TelegramType};

/// Default time to wait for an answer
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// One-shot reader for a group address.
#[derive(Debug)]
pub struct ValueReader<'a> {
    queue: &'a TelegramQueue,
    group_address: GroupAddress,
    timeout: Duration,
}

impl<'a> ValueReader<'a> {
    /// Reader waiting [`DEFAULT_READ_TIMEOUT`].
    pub fn new(queue: &'a TelegramQueue, group_address: GroupAddress) -> Self {
        Self::with_timeout(queue, group_address, DEFAULT_READ_TIMEOUT)
    }

    /// Reader waiting `timeout`.
    pub fn with_timeout(queue: &'a TelegramQueue, group_address: GroupAddress, timeout: Duration) -> Self {
        Self {
            queue,
            group_address,
            timeout,
        }
    }

    /// Address being read
    pub fn group_address(&self) -> GroupAddress {
        self.group_address
    }

    /// Send the read and wait for the answer.
    ///
    /// Returns `None` on timeout or if the read could not be queued. The
    /// callback is unregistered in every case.
    pub async fn read(&self) -> Option<Telegram> {
        let (completer, waiter) = completion::<Telegram>();
        let group_address = self.group_address;
        let handle = self.queue.register_telegram_received_cb(
            move |telegram| {
                // only the telegram completing the read is consumed
                let handled = matches!(
                    telegram.telegram_type,
                    TelegramType::GroupResponse | TelegramType::GroupWrite
                ) && telegram.group_address == group_address
                    && completer.complete(telegram);
                async move { handled }
            },
            Some(vec![AddressFilter::exact(group_address)]),
        );

        if let Err(e) = self.send_group_read() {
            self.queue.unregister_telegram_received_cb(handle);
            knx_log!(warn, "Could not send GroupValueRead to {}: {}", group_address, e);
            return None;
        }

        let telegram = waiter.wait(self.timeout).await;
        self.queue.unregister_telegram_received_cb(handle);

        if telegram.is_none() {
            knx_log!(
                warn,
                "KNX bus did not respond in time to GroupValueRead request for: {}",
                group_address
            );
        }
        telegram
    }

    /// Queue a `GroupValueRead` for the address.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is gone.
    pub fn send_group_read(&self) -> Result<()> {
        self.queue.put(Telegram::group_read(self.group_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Switch;
    use crate::io::interface::test_support::RecordingInterface;
    use crate::telegram::{Payload, TelegramDirection};
    use std::sync::Arc;

    fn address() -> GroupAddress {
        "0/0/42".parse().unwrap()
    }

    #[tokio::test]
    async fn test_value_reader_read_success() {
        let queue = Arc::new(TelegramQueue::new());
        let response = Telegram::group_response(address(), Payload::Binary(1))
            .with_direction(TelegramDirection::Incoming);

        let feeder = {
            let queue = Arc::clone(&queue);
            let response = response.clone();
            async move {
                tokio::task::yield_now().await;
                queue.process_telegram(response).await;
            }
        };

        let reader = ValueReader::new(&queue, address());
        let (result, ()) = tokio::join!(reader.read(), feeder);

        assert_eq!(result, Some(response));
        assert_eq!(queue.callback_count(), 0);
        assert_eq!(queue.qsize(), 1);
    }

    #[tokio::test]
    async fn test_value_reader_passes_later_telegrams_to_devices() {
        let queue = Arc::new(TelegramQueue::new());
        let switch = Arc::new(Switch::new("outlet", address(), queue.sender()));
        queue.devices().add(switch.clone()).unwrap();

        let response = Telegram::group_response(address(), Payload::Binary(0))
            .with_direction(TelegramDirection::Incoming);
        let write = Telegram::group_write(address(), Payload::Binary(1))
            .with_direction(TelegramDirection::Incoming);

        let feeder = {
            let queue = Arc::clone(&queue);
            let response = response.clone();
            async move {
                tokio::task::yield_now().await;
                queue.process_telegram(response).await;
                queue.process_telegram(write).await;
            }
        };

        let reader = ValueReader::new(&queue, address());
        let (result, ()) = tokio::join!(reader.read(), feeder);

        assert_eq!(result, Some(response));
        assert_eq!(switch.state(), Some(true));
    }

    #[tokio::test]
    async fn test_value_reader_timeout() {
        let queue = TelegramQueue::new();
        let reader = ValueReader::with_timeout(&queue, address(), Duration::ZERO);

        assert_eq!(reader.read().await, None);
        assert_eq!(queue.callback_count(), 0);
    }

    #[tokio::test]
    async fn test_value_reader_ignores_other_answers() {
        let queue = Arc::new(TelegramQueue::new());
        let other_address = Telegram::group_response("0/0/43".parse().unwrap(), Payload::Binary(1))
            .with_direction(TelegramDirection::Incoming);
        let read = Telegram::group_read(address()).with_direction(TelegramDirection::Incoming);

        let feeder = {
            let queue = Arc::clone(&queue);
            async move {
                tokio::task::yield_now().await;
                queue.process_telegram(other_address).await;
                queue.process_telegram(read).await;
            }
        };

        let reader = ValueReader::with_timeout(&queue, address(), Duration::from_millis(20));
        let (result, ()) = tokio::join!(reader.read(), feeder);
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_send_group_read() {
        let queue = TelegramQueue::new();
        let interface = RecordingInterface::new();
        queue.set_interface(Some(interface.clone()));

        ValueReader::new(&queue, address()).send_group_read().unwrap();
        queue.process_all_telegrams().await.unwrap();

        assert_eq!(interface.telegrams(), vec![Telegram::group_read(address())]);
    }
}
