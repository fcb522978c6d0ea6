//! Convenience macros for working with KNX addresses and telegrams.

/// Creates a [`GroupAddress`](crate::addressing::GroupAddress) from 3-level notation.
///
/// # Syntax
///
/// ```text
/// ga!(main/middle/sub)
/// ```
///
/// Where:
/// - `main`: Main group (0-31)
/// - `middle`: Middle group (0-7)
/// - `sub`: Sub group (0-255)
///
/// # Examples
///
/// ```
/// use knx_client::{ga, GroupAddress};
///
/// let addr = ga!(1/2/3);
/// assert_eq!(addr, GroupAddress::new(1, 2, 3).unwrap());
/// ```
///
/// # Compile-Time Validation
///
/// ```compile_fail
/// // main group > 31
/// let addr = knx_client::ga!(32/0/0);
/// ```
///
/// ```compile_fail
/// // middle group > 7
/// let addr = knx_client::ga!(1/8/0);
/// ```
#[macro_export]
macro_rules! ga {
    ($main:literal / $middle:literal / $sub:literal) => {{
        const _: () = {
            if $main > 31 {
                panic!("Main group must be 0-31");
            }
            if $middle > 7 {
                panic!("Middle group must be 0-7");
            }
            if $sub > 255 {
                panic!("Sub group must be 0-255");
            }
        };

        // 5 bits main, 3 bits middle, 8 bits sub
        const RAW: u16 = (($main & 0x1F) << 11) | (($middle & 0x07) << 8) | ($sub & 0xFF);
        $crate::addressing::GroupAddress::from(RAW)
    }};
}

/// Creates a [`PhysicalAddress`](crate::addressing::PhysicalAddress) from
/// `area.line.device` notation.
///
/// The components are separated by commas because `1.1.5` does not tokenize
/// as three literals.
///
/// ```
/// use knx_client::{pa, PhysicalAddress};
///
/// assert_eq!(pa!(1, 1, 5), "1.1.5".parse::<PhysicalAddress>().unwrap());
/// ```
///
/// ```compile_fail
/// // area > 15
/// let addr = knx_client::pa!(16, 0, 0);
/// ```
#[macro_export]
macro_rules! pa {
    ($area:literal, $line:literal, $device:literal) => {{
        const _: () = {
            if $area > 15 {
                panic!("Area must be 0-15");
            }
            if $line > 15 {
                panic!("Line must be 0-15");
            }
            if $device > 255 {
                panic!("Device must be 0-255");
            }
        };

        const RAW: u16 = (($area & 0x0F) << 12) | (($line & 0x0F) << 8) | ($device & 0xFF);
        $crate::addressing::PhysicalAddress::from(RAW)
    }};
}

/// Queues a `GroupValueWrite` with inline address notation.
///
/// ```text
/// knx_write!(queue, main/middle/sub, payload)
/// ```
///
/// Expands to `queue.put(Telegram::group_write(ga!(main/middle/sub), payload))`.
#[macro_export]
macro_rules! knx_write {
    ($queue:expr, $main:literal / $middle:literal / $sub:literal, $payload:expr) => {
        $queue.put($crate::telegram::Telegram::group_write(
            $crate::ga!($main / $middle / $sub),
            $payload,
        ))
    };
}

/// Queues a `GroupValueRead` with inline address notation.
///
/// ```text
/// knx_read!(queue, main/middle/sub)
/// ```
#[macro_export]
macro_rules! knx_read {
    ($queue:expr, $main:literal / $middle:literal / $sub:literal) => {
        $queue.put($crate::telegram::Telegram::group_read($crate::ga!(
            $main / $middle / $sub
        )))
    };
}
