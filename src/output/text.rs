//! Plain property listing, one device per line.

use crate::output::OutputFormatter;
use crate::registry::TrackedDevice;
use std::fmt::Display;

const BLANK: &str = "-";

/// Lists name, id and every sensor value of a device. Missing values are
/// printed as `-`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

fn property(value: Option<impl Display>) -> String {
    value.map_or_else(|| BLANK.to_string(), |v| v.to_string())
}

impl OutputFormatter for TextFormatter {
    fn format(&self, device: &TrackedDevice) -> Option<String> {
        let reading = device.reading.as_ref();
        Some(format!(
            "name={} id={} temperature={} humidity={} battery={} log_interval={} stored_log_count={}",
            property(device.name()),
            device.id(),
            property(reading.map(|r| format!("{:.1}", r.temperature_celsius))),
            property(reading.map(|r| format!("{:.1}", r.humidity_percent))),
            property(reading.map(|r| r.battery_percent)),
            property(reading.map(|r| r.log_interval_seconds)),
            property(reading.map(|r| r.stored_log_count)),
        ))
    }
}
