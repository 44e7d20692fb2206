//! `bluemaestro-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. Decoding lives in [`crate::decoder`], the throttled device
//! set in [`crate::registry`], and the run loop in [`crate::app`] where it can be
//! tested deterministically with an injected scanner and injected output streams.

pub mod advertisement;
pub mod app;
pub mod config;
pub mod decoder;
pub mod mac_address;
pub mod output;
pub mod registry;
pub mod scanner;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{DeviceId, RawAdvertisement};
pub use config::{RegistryConfig, parse_duration, parse_manufacturer_id};
pub use decoder::{
    DecodedReading, ManufacturerId, NotParseable, classify, decode_reading, decode_scan_record,
    is_target,
};
pub use mac_address::MacAddress;
pub use output::influxdb::InfluxDbFormatter;
pub use output::text::TextFormatter;
pub use output::{Format, OutputFormatter};
pub use registry::{DeviceRegistry, IgnoreReason, TrackedDevice, UpsertOutcome};
pub use scanner::{Backend, ScanError};
