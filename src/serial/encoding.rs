//! # Encoding Module
//!
//! Formatting of relayed bytes for the verbose echo.

use chrono::{DateTime, TimeZone};

use crate::bridge::Direction;

/// Upper-case hex with one space between bytes.
///
/// # Examples
///
/// ```
/// use serial_bridge::serial::encoding::hex_spaced;
///
/// assert_eq!(hex_spaced(&[0x48, 0x49]), "48 49");
/// ```
#[must_use]
pub fn hex_spaced(source_data: &[u8]) -> String {
    let encoded = hex::encode_upper(source_data);
    let mut spaced = String::with_capacity(encoded.len() + encoded.len() / 2);
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            spaced.push(' ');
        }
        spaced.push(char::from(pair[0]));
        spaced.push(char::from(pair[1]));
    }
    spaced
}

/// One hex echo line: `[HH:MM:SS.mmm A->B] 48 49`.
#[must_use]
pub fn echo_line<Tz>(direction: Direction, source_data: &[u8], time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{} {}] {}",
        time.format("%H:%M:%S%.3f"),
        direction,
        hex_spaced(source_data)
    )
}
