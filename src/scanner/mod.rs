//! BLE scanner backends.
//!
//! Backends deliver every received advertisement, from any vendor, as a
//! [`RawAdvertisement`] over a channel. Classification and decoding happen in
//! the consumer.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

use crate::advertisement::RawAdvertisement;
use crate::decoder::ManufacturerId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Channel buffer size for received advertisements.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Start scanning with the specified backend.
///
/// `preferred` selects which company's data becomes the manufacturer payload
/// when a backend only exposes manufacturer data as a map and a device
/// advertises several entries.
///
/// # Returns
/// A receiver of advertisements. The scan runs until the receiver is dropped
/// or the process is interrupted.
pub async fn start_scan(
    backend: Backend,
    preferred: ManufacturerId,
) -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    #[cfg(not(feature = "bluer"))]
    let _ = preferred;

    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => bluer::start_scan(preferred).await,
        #[cfg(feature = "hci")]
        Backend::Hci => hci::start_scan().await,
    }
}
