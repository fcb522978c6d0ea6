//! One-shot completion signal with a bounded wait.
//!
//! The [`Completer`] half is cloneable and may live inside a synchronous
//! callback; only the first [`Completer::complete`] call has an effect.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

/// Create a connected completer/waiter pair.
pub fn completion<T>() -> (Completer<T>, Waiter<T>) {
    let (sender, receiver) = oneshot::channel();
    (
        Completer {
            slot: Arc::new(Mutex::new(Some(sender))),
        },
        Waiter { receiver },
    )
}

/// Sending half.
#[derive(Debug)]
pub struct Completer<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Completer<T> {
    /// Deliver `value`. Returns `false` if already completed or the waiter
    /// is gone.
    pub fn complete(&self, value: T) -> bool {
        let sender = self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(sender) => sender.send(value).is_ok(),
            None => false,
        }
    }

    /// Check whether a value was already delivered.
    pub fn is_completed(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct Waiter<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Waiter<T> {
    /// Wait up to `timeout` for the value.
    ///
    /// A value delivered before the call is returned even with a zero
    /// timeout.
    pub async fn wait(self, timeout: Duration) -> Option<T> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) | Err(_) => None,
        }
    }
}
