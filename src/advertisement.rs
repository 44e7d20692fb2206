//! Raw discovery events as delivered by the scanner backends.
//!
//! An advertisement record is a sequence of AD structures, each laid out as
//! `[length][type][data...]` where `length` counts the type byte and the data.

use crate::mac_address::MacAddress;
use std::fmt;
use std::time::SystemTime;

/// AD type: flags
pub const AD_TYPE_FLAGS: u8 = 0x01;
/// AD type: shortened local name
pub const AD_TYPE_SHORT_NAME: u8 = 0x08;
/// AD type: complete local name
pub const AD_TYPE_COMPLETE_NAME: u8 = 0x09;
/// AD type: manufacturer specific data
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// LE General Discoverable, BR/EDR not supported.
const DEFAULT_FLAGS: u8 = 0x06;

/// Opaque identifier of a peripheral, stable within a scan session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<MacAddress> for DeviceId {
    fn from(mac: MacAddress) -> Self {
        Self(mac.to_string())
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single discovery event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAdvertisement {
    /// Identity of the peripheral
    pub id: DeviceId,
    /// Advertised local name, if any
    pub name: Option<String>,
    /// Manufacturer specific data, starting with the little-endian company id.
    /// Empty when the device did not advertise any.
    pub manufacturer_data: Vec<u8>,
    /// The full advertisement record
    pub scan_record: Vec<u8>,
    /// Wall-clock time the event was received
    pub received_at: SystemTime,
}

impl RawAdvertisement {
    /// Build an advertisement received now.
    pub fn new(
        id: impl Into<DeviceId>,
        name: Option<String>,
        manufacturer_data: Vec<u8>,
        scan_record: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            name,
            manufacturer_data,
            scan_record,
            received_at: SystemTime::now(),
        }
    }

    /// Build an advertisement from a raw record, pulling the local name and the
    /// manufacturer data out of its AD structures.
    pub fn from_scan_record(id: impl Into<DeviceId>, scan_record: &[u8]) -> Self {
        let manufacturer_data = find_ad(scan_record, AD_TYPE_MANUFACTURER_DATA)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        Self::new(id, local_name(scan_record), manufacturer_data, scan_record.to_vec())
    }

    /// Hex dump of the manufacturer data, used for the "unrecognized" line.
    pub fn manufacturer_hex(&self) -> String {
        self.manufacturer_data
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Iterate over the `(type, data)` pairs of an advertisement record.
///
/// Iteration stops at a zero-length structure or at one that runs past the end
/// of the record.
pub fn ad_structures(record: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        if offset + 2 > record.len() {
            return None;
        }
        let len = record[offset] as usize;
        if len == 0 || offset + 1 + len > record.len() {
            return None;
        }
        let ad_type = record[offset + 1];
        let data = &record[offset + 2..offset + 1 + len];
        offset += 1 + len;
        Some((ad_type, data))
    })
}

/// Data of the first AD structure of the given type.
pub fn find_ad(record: &[u8], ad_type: u8) -> Option<&[u8]> {
    ad_structures(record)
        .find(|(t, _)| *t == ad_type)
        .map(|(_, data)| data)
}

/// Complete local name, falling back to the shortened one.
pub fn local_name(record: &[u8]) -> Option<String> {
    find_ad(record, AD_TYPE_COMPLETE_NAME)
        .or_else(|| find_ad(record, AD_TYPE_SHORT_NAME))
        .map(|name| String::from_utf8_lossy(name).into_owned())
}

/// Rebuild an advertisement record from a company id and its manufacturer data.
///
/// Backends that only expose parsed manufacturer data use this so that the
/// record keeps its on-air layout: a flags structure followed by the
/// manufacturer structure, which puts the first vendor byte at offset 7.
/// Data too long for a single AD structure is left out.
pub fn synthesize_scan_record(company_id: u16, data: &[u8]) -> Vec<u8> {
    let mut record = vec![2, AD_TYPE_FLAGS, DEFAULT_FLAGS];
    if let Ok(len) = u8::try_from(3 + data.len()) {
        record.push(len);
        record.push(AD_TYPE_MANUFACTURER_DATA);
        record.extend_from_slice(&company_id.to_le_bytes());
        record.extend_from_slice(data);
    }
    record
}
