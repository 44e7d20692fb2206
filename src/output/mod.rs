//! Output formatters for tracked devices.
//!
//! A formatter renders one [`TrackedDevice`] per line. Advertisements from
//! other vendors are not tracked, but can still be listed through
//! [`OutputFormatter::format_unrecognized`].

pub mod influxdb;
pub mod text;

use crate::advertisement::RawAdvertisement;
use crate::registry::TrackedDevice;

/// Trait for formatting tracked devices into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a tracked device.
    ///
    /// Returns `None` when the format has nothing to say about the device,
    /// e.g. a line protocol point without any field.
    fn format(&self, device: &TrackedDevice) -> Option<String>;

    /// Placeholder line for a device that is not from the target vendor.
    fn format_unrecognized(&self, raw: &RawAdvertisement) -> String {
        format!("Not a BM device {} - {}", raw.manufacturer_hex(), raw.id)
    }
}

/// Available output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    /// One `key=value` property listing per device
    #[default]
    Text,
    /// InfluxDB line protocol
    Influxdb,
}

impl Format {
    /// Build the formatter for this format.
    ///
    /// `measurement_name` is only used by the InfluxDB format.
    pub fn formatter(self, measurement_name: &str) -> Box<dyn OutputFormatter> {
        match self {
            Format::Text => Box::new(text::TextFormatter),
            Format::Influxdb => Box::new(influxdb::InfluxDbFormatter::new(
                measurement_name.to_string(),
            )),
        }
    }
}
