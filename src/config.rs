//! Registry configuration and command-line value parsers.

use crate::decoder::{BLUE_MAESTRO_MANUFACTURER_ID, ManufacturerId};
use std::time::Duration;

/// Default minimum time between accepted updates of one device.
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_millis(5000);

/// Settings the [`DeviceRegistry`](crate::registry::DeviceRegistry) is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Minimum time between accepted updates of the same device
    pub throttle_window: Duration,
    /// Only advertisements from this company are tracked
    pub target_manufacturer_id: ManufacturerId,
    /// Keep the previous reading when an update fails to decode.
    /// When false, such an update blanks the reading.
    pub keep_stale_reading: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            throttle_window: DEFAULT_THROTTLE_WINDOW,
            target_manufacturer_id: BLUE_MAESTRO_MANUFACTURER_ID,
            keep_stale_reading: true,
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use bluemaestro_listener::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s"
    let (num, unit_millis, unit) = if let Some(num) = src.strip_suffix("ms") {
        (num, 1, "milliseconds")
    } else if let Some(num) = src.strip_suffix('h') {
        (num, 3_600_000, "hours")
    } else if let Some(num) = src.strip_suffix('m') {
        (num, 60_000, "minutes")
    } else if let Some(num) = src.strip_suffix('s') {
        (num, 1000, "seconds")
    } else {
        (src, 1000, "duration")
    };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num))?;
    value
        .checked_mul(unit_millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {}", src))
}

/// Parse a company identifier, either decimal (`307`) or hex (`0x0133`).
///
/// # Examples
/// ```
/// use bluemaestro_listener::config::parse_manufacturer_id;
/// use bluemaestro_listener::ManufacturerId;
///
/// assert_eq!(parse_manufacturer_id("307").unwrap(), ManufacturerId(307));
/// assert_eq!(parse_manufacturer_id("0x0133").unwrap(), ManufacturerId(307));
/// ```
pub fn parse_manufacturer_id(src: &str) -> Result<ManufacturerId, String> {
    let src = src.trim();
    let parsed = match src
        .strip_prefix("0x")
        .or_else(|| src.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => src.parse(),
    };
    parsed
        .map(ManufacturerId)
        .map_err(|_| format!("invalid manufacturer id: {}", src))
}
