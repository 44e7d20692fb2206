//! Core application runner for `bluemaestro-listener`.
//!
//! This module is decoupled from CLI parsing and process exit codes so it can
//! be tested deterministically.

use crate::advertisement::RawAdvertisement;
use crate::config::{
    DEFAULT_THROTTLE_WINDOW, RegistryConfig, parse_duration, parse_manufacturer_id,
};
use crate::decoder::{ManufacturerId, decode_reading, is_target};
use crate::output::{Format, OutputFormatter};
use crate::registry::{DeviceRegistry, IgnoreReason, UpsertOutcome};
use crate::scanner::{Backend, ScanError};
use clap::Parser;
use log::info;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Update each device at most once per interval.
    /// Accepts duration with suffix: 5s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub throttle: Duration,

    /// Company identifier of the devices to track, decimal or 0x-prefixed hex
    #[arg(long, default_value = "307", value_parser = parse_manufacturer_id)]
    pub manufacturer_id: ManufacturerId,

    /// Output format
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "bluemaestro_measurement")]
    pub influxdb_measurement: String,

    /// Blank a device's reading when an update cannot be decoded,
    /// instead of keeping the previous one
    #[arg(long)]
    pub discard_stale_reading: bool,

    /// Start a new scan session, forgetting every device, after this long
    #[arg(long, value_parser = parse_duration)]
    pub session: Option<Duration>,

    /// Also print a line for advertisements from other vendors
    #[arg(long)]
    pub show_unrecognized: bool,

    /// Print every tracked device, in first-seen order, when scanning ends
    #[arg(long)]
    pub summary: bool,

    /// Verbose output, print why advertisements could not be decoded
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            throttle: DEFAULT_THROTTLE_WINDOW,
            manufacturer_id: RegistryConfig::default().target_manufacturer_id,
            format: Format::default(),
            influxdb_measurement: "bluemaestro_measurement".to_string(),
            discard_stale_reading: false,
            session: None,
            show_unrecognized: false,
            summary: false,
            verbose: false,
            backend: Backend::default(),
        }
    }
}

impl Options {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            throttle_window: self.throttle,
            target_manufacturer_id: self.manufacturer_id,
            keep_stale_reading: !self.discard_stale_reading,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Future returned by [`Scanner::start_scan`].
pub type ScanFuture<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<RawAdvertisement>, ScanError>> + Send + 'a>>;

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(&self, backend: Backend, preferred: ManufacturerId) -> ScanFuture<'_>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(&self, backend: Backend, preferred: ManufacturerId) -> ScanFuture<'_> {
        Box::pin(async move { crate::scanner::start_scan(backend, preferred).await })
    }
}

fn write_line(out: &mut dyn Write, line: Option<String>) -> io::Result<()> {
    match line {
        Some(line) => writeln!(out, "{line}"),
        None => Ok(()),
    }
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - Every advertisement goes through the device registry; each insert or
///   update writes the device to `out`.
/// - Advertisements from other vendors are written as placeholders only when
///   `options.show_unrecognized` is set.
/// - Decode failures of tracked devices are written to `err` only when
///   `options.verbose` is set.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let formatter: Box<dyn OutputFormatter> =
        options.format.formatter(&options.influxdb_measurement);
    let mut registry = DeviceRegistry::new(options.registry_config());

    let mut advertisements = scanner
        .start_scan(options.backend, options.manufacturer_id)
        .await?;
    let mut session_start = Instant::now();

    while let Some(raw) = advertisements.recv().await {
        let now = Instant::now();
        if let Some(length) = options.session
            && now.duration_since(session_start) >= length
        {
            info!("Scan session ended, forgetting {} devices", registry.len());
            registry.clear();
            session_start = now;
        }

        let id = raw.id.clone();
        let unrecognized = (options.show_unrecognized
            && !is_target(&raw, options.manufacturer_id))
        .then(|| formatter.format_unrecognized(&raw));
        let decode_failure = options
            .verbose
            .then(|| decode_reading(&raw).err())
            .flatten();

        match registry.upsert(raw, now) {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => {
                if let Some(reason) = decode_failure {
                    writeln!(err, "{id}: {reason}")?;
                }
                write_line(out, registry.get(&id).and_then(|d| formatter.format(d)))?;
            }
            UpsertOutcome::Ignored(IgnoreReason::NotTargetVendor) => write_line(out, unrecognized)?,
            UpsertOutcome::Ignored(IgnoreReason::Throttled) => {}
        }
    }

    if options.summary {
        for device in registry.snapshot() {
            write_line(out, formatter.format(device))?;
        }
    }

    Ok(())
}
