//! Interface between the telegram queue and the bus connection.

use core::fmt;

use async_trait::async_trait;

use crate::error::Result;
use crate::telegram::Telegram;

/// A connection able to put telegrams on the bus.
///
/// Implemented by [`Tunnel`](crate::io::Tunnel) and
/// [`Routing`](crate::io::Routing). The telegram queue forwards every
/// outgoing telegram to the attached interface.
#[async_trait]
pub trait KnxIpInterface: Send + Sync + fmt::Debug {
    /// Transmit one telegram.
    async fn send_telegram(&self, telegram: &Telegram) -> Result<()>;

    /// Close the connection and release the socket.
    async fn stop(&self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Interface recording every telegram with the instant it was sent.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingInterface {
        sent: Mutex<Vec<(Telegram, Instant)>>,
        stopped: Mutex<bool>,
    }

    impl RecordingInterface {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn telegrams(&self) -> Vec<Telegram> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(telegram, _)| telegram.clone())
                .collect()
        }

        pub(crate) fn instants(&self) -> Vec<Instant> {
            self.sent.lock().unwrap().iter().map(|(_, at)| *at).collect()
        }

        pub(crate) fn is_stopped(&self) -> bool {
            *self.stopped.lock().unwrap()
        }
    }

    #[async_trait]
    impl KnxIpInterface for RecordingInterface {
        async fn send_telegram(&self, telegram: &Telegram) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((telegram.clone(), Instant::now()));
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            *self.stopped.lock().unwrap() = true;
            Ok(())
        }
    }
}
