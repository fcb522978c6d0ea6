//! Telegram dispatch and the services built on it.

pub mod completion;
pub mod state_updater;
pub mod telegram_queue;
pub mod value_reader;

pub use state_updater::StateUpdater;
pub use telegram_queue::{
    CallbackHandle, TelegramCallbackFuture, TelegramQueue, TelegramReceiver, TelegramSender,
};
pub use value_reader::ValueReader;
