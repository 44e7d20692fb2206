//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ exposes parsed device properties rather than raw advertisement
//! records, so the record is rebuilt from the manufacturer data with
//! [`synthesize_scan_record`].

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError};
use crate::advertisement::{RawAdvertisement, synthesize_scan_record};
use crate::decoder::ManufacturerId;
use crate::mac_address::MacAddress;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{StreamExt, pin_mut};
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start an LE discovery session and forward every advertisement update.
pub async fn start_scan(
    preferred: ManufacturerId,
) -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    info!("Scanning on adapter {}", adapter.name());

    // Duplicate data is needed to see every advertisement, not just the first
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
    let events = adapter.discover_devices_with_changes().await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        let _session = session;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            match read_advertisement(&adapter, address, preferred).await {
                Ok(raw) => {
                    if tx.send(raw).await.is_err() {
                        debug!("Advertisement receiver dropped, stopping scan");
                        break;
                    }
                }
                Err(e) => warn!("{}: {}", MacAddress::from(address), e),
            }
        }
    });

    Ok(rx)
}

/// Read the current advertisement properties of a discovered device.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
    preferred: ManufacturerId,
) -> Result<RawAdvertisement, ScanError> {
    let device = adapter.device(address)?;
    let name = device.name().await?;
    let manufacturer_data = device.manufacturer_data().await?.unwrap_or_default();

    let (manufacturer_payload, scan_record) =
        match pick_manufacturer_entry(&manufacturer_data, preferred) {
            Some((company_id, data)) => {
                let mut payload = company_id.to_le_bytes().to_vec();
                payload.extend_from_slice(data);
                (payload, synthesize_scan_record(company_id, data))
            }
            None => (Vec::new(), Vec::new()),
        };

    Ok(RawAdvertisement::new(
        MacAddress::from(address),
        name,
        manufacturer_payload,
        scan_record,
    ))
}

/// The preferred company's entry, else the one with the lowest company id.
fn pick_manufacturer_entry(
    data: &HashMap<u16, Vec<u8>>,
    preferred: ManufacturerId,
) -> Option<(u16, &[u8])> {
    data.get(&preferred.0)
        .map(|d| (preferred.0, d.as_slice()))
        .or_else(|| {
            data.iter()
                .min_by_key(|(id, _)| **id)
                .map(|(id, d)| (*id, d.as_slice()))
        })
}
