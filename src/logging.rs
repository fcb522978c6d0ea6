//! Unified logging macro for the crate.
//!
//! All logging goes through the `log` facade on one of four targets, so an
//! application can silence or raise each channel separately:
//!
//! | target           | content                                      |
//! |------------------|----------------------------------------------|
//! | `knx::log`       | life-cycle events, timeouts, warnings        |
//! | `knx::knx`       | decoded KNXnet/IP frames                     |
//! | `knx::telegram`  | telegrams entering the queue                 |
//! | `knx::raw_socket`| raw datagram bytes                           |
//!
//! # Usage
//!
//! ```rust,ignore
//! knx_log!(info, "Connection established");
//! knx_log!(warn, "Retry attempt {}/{}", current, max);
//! knx_log!(@knx debug, "Received {}", frame);
//! knx_log!(@raw debug, "Received from {}: {:02X?}", source, bytes);
//! ```

/// General life-cycle target
pub const TARGET_LOG: &str = "knx::log";
/// Decoded frame target
pub const TARGET_KNX: &str = "knx::knx";
/// Telegram target
pub const TARGET_TELEGRAM: &str = "knx::telegram";
/// Raw datagram target
pub const TARGET_RAW_SOCKET: &str = "knx::raw_socket";

/// Logging macro selecting one of the crate's log targets.
///
/// Without a prefix the message goes to `knx::log`. The prefixes `@knx`,
/// `@telegram` and `@raw` pick the other targets.
macro_rules! knx_log {
    (@knx $level:ident, $($arg:tt)*) => {
        ::log::$level!(target: $crate::logging::TARGET_KNX, $($arg)*)
    };
    (@telegram $level:ident, $($arg:tt)*) => {
        ::log::$level!(target: $crate::logging::TARGET_TELEGRAM, $($arg)*)
    };
    (@raw $level:ident, $($arg:tt)*) => {
        ::log::$level!(target: $crate::logging::TARGET_RAW_SOCKET, $($arg)*)
    };
    (info, $($arg:tt)*) => { ::log::info!(target: $crate::logging::TARGET_LOG, $($arg)*) };
    (debug, $($arg:tt)*) => { ::log::debug!(target: $crate::logging::TARGET_LOG, $($arg)*) };
    (warn, $($arg:tt)*) => { ::log::warn!(target: $crate::logging::TARGET_LOG, $($arg)*) };
    (error, $($arg:tt)*) => { ::log::error!(target: $crate::logging::TARGET_LOG, $($arg)*) };
    (trace, $($arg:tt)*) => { ::log::trace!(target: $crate::logging::TARGET_LOG, $($arg)*) };
}
