//! Blue Maestro advertisement decoding.
//!
//! Routing uses the little-endian company identifier at the start of the
//! manufacturer data. The sensor values are read from the full advertisement
//! record, where every multi-byte field is big-endian:
//!
//! | Offset | Size | Field                              |
//! |--------|------|------------------------------------|
//! | 7      | 1    | Protocol version (only 23)         |
//! | 8      | 1    | Battery (%)                        |
//! | 9      | 2    | Logging interval (s)               |
//! | 11     | 2    | Stored log count                   |
//! | 13     | 2    | Temperature (0.1 °C)               |
//! | 15     | 2    | Relative humidity (0.1 %)          |

use crate::advertisement::RawAdvertisement;
use std::fmt;
use thiserror::Error;

/// Blue Maestro Ltd company identifier.
pub const BLUE_MAESTRO_MANUFACTURER_ID: ManufacturerId = ManufacturerId(307);

/// The only protocol version the decoder understands.
pub const SUPPORTED_PROTOCOL_VERSION: u8 = 23;

/// Records shorter than this are never decoded.
pub const MIN_SCAN_RECORD_LEN: usize = 16;

const VERSION_OFFSET: usize = 7;
const BATTERY_OFFSET: usize = 8;
const LOG_INTERVAL_OFFSET: usize = 9;
const LOG_COUNT_OFFSET: usize = 11;
const TEMPERATURE_OFFSET: usize = 13;
const HUMIDITY_OFFSET: usize = 15;

/// Bluetooth SIG company identifier from the manufacturer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManufacturerId(pub u16);

impl fmt::Display for ManufacturerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.0, self.0)
    }
}

/// Sensor values carried by a supported advertisement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedReading {
    pub protocol_version: u8,
    pub battery_percent: u8,
    pub log_interval_seconds: u16,
    pub stored_log_count: u16,
    /// Degrees Celsius, one decimal of precision
    pub temperature_celsius: f64,
    /// Relative humidity in percent, one decimal of precision
    pub humidity_percent: f64,
}

/// Why an advertisement record did not yield a reading.
///
/// This is an expected outcome for foreign or older devices, not a failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotParseable {
    #[error("scan record too short: {len} bytes")]
    TooShort { len: usize },
    #[error("unsupported protocol version {0} (only 23 supported)")]
    UnsupportedVersion(u8),
}

/// Company identifier of an advertisement, or `None` when it carries less than
/// two bytes of manufacturer data.
pub fn classify(raw: &RawAdvertisement) -> Option<ManufacturerId> {
    match raw.manufacturer_data.as_slice() {
        [lo, hi, ..] => Some(ManufacturerId(u16::from_le_bytes([*lo, *hi]))),
        _ => None,
    }
}

/// Whether an advertisement comes from the `target` vendor.
///
/// Both the registry and the renderer route devices through this check.
pub fn is_target(raw: &RawAdvertisement, target: ManufacturerId) -> bool {
    classify(raw) == Some(target)
}

/// Decode the sensor reading carried in an advertisement's scan record.
pub fn decode_reading(raw: &RawAdvertisement) -> Result<DecodedReading, NotParseable> {
    decode_scan_record(&raw.scan_record)
}

/// Decode a bare scan record.
///
/// Records of at least [`MIN_SCAN_RECORD_LEN`] bytes are accepted by the length
/// guard, but the humidity field ends at offset 16, so a record must hold 17
/// bytes to be decoded in full. Anything shorter is reported as too short.
pub fn decode_scan_record(data: &[u8]) -> Result<DecodedReading, NotParseable> {
    if data.len() < MIN_SCAN_RECORD_LEN {
        return Err(NotParseable::TooShort { len: data.len() });
    }

    let protocol_version = data[VERSION_OFFSET];
    if protocol_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(NotParseable::UnsupportedVersion(protocol_version));
    }

    let too_short = NotParseable::TooShort { len: data.len() };
    let humidity = read_u16_be(data, HUMIDITY_OFFSET).ok_or(too_short)?;

    Ok(DecodedReading {
        protocol_version,
        battery_percent: data[BATTERY_OFFSET],
        log_interval_seconds: read_u16_be(data, LOG_INTERVAL_OFFSET).ok_or(too_short)?,
        stored_log_count: read_u16_be(data, LOG_COUNT_OFFSET).ok_or(too_short)?,
        temperature_celsius: tenths(read_u16_be(data, TEMPERATURE_OFFSET).ok_or(too_short)?),
        humidity_percent: tenths(humidity),
    })
}

fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2)
        .map(|bytes| u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[inline]
fn tenths(raw: u16) -> f64 {
    f64::from(raw) / 10.0
}
