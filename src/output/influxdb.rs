//! InfluxDB line protocol output formatter.

use crate::output::OutputFormatter;
use crate::registry::TrackedDevice;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape commas, spaces and equals signs in a tag value.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | ' ' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", key, escape_tag(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", key, value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    // Times before the epoch cannot be expressed; the point is written without one.
    if let Some(since_epoch) = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
    {
        write!(fmt, " {}", since_epoch.as_nanos())?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// InfluxDB line protocol formatter.
///
/// Devices are tagged with their id and advertised name (falling back to the
/// id). Devices without a reading have no fields and produce no line.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    fn tag_set(&self, device: &TrackedDevice) -> BTreeMap<String, String> {
        let id = device.id().to_string();
        let name = device.name().map_or_else(|| id.clone(), str::to_string);

        let mut tags = BTreeMap::new();
        tags.insert("id".to_string(), id);
        tags.insert("name".to_string(), name);
        tags
    }

    fn field_set(&self, device: &TrackedDevice) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();

        if let Some(r) = device.reading {
            let mut add = |name: &str, value: FieldValue| {
                fields.insert(name.to_string(), value);
            };
            add("temperature", FieldValue::Float(r.temperature_celsius));
            add("humidity", FieldValue::Float(r.humidity_percent));
            add("battery", FieldValue::Integer(r.battery_percent.into()));
            add("log_interval", FieldValue::Integer(r.log_interval_seconds.into()));
            add("stored_log_count", FieldValue::Integer(r.stored_log_count.into()));
        }

        fields
    }

    fn to_data_point(&self, device: &TrackedDevice) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(device),
            field_set: self.field_set(device),
            timestamp: Some(device.advertisement.received_at),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, device: &TrackedDevice) -> Option<String> {
        let point = self.to_data_point(device);
        (!point.field_set.is_empty()).then(|| point.to_string())
    }
}
