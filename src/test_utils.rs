use crate::advertisement::{DeviceId, RawAdvertisement};
use crate::mac_address::MacAddress;
use std::time::SystemTime;

/// A stable address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xD4, 0xCA, 0x6E, 0x00, 0x00, 0x01]);

/// Manufacturer data of a Blue Maestro beacon: company id 307, little-endian.
pub fn bm_manufacturer_data() -> Vec<u8> {
    vec![0x33, 0x01, 23, 80]
}

/// A 17-byte Blue Maestro advertisement record.
pub fn bm_scan_record() -> Vec<u8> {
    vec![
        0x02, 0x01, 0x06, // Flags
        0x0D, 0xFF, // Manufacturer data AD header
        0x33, 0x01, // Company id 307
        23,   // Protocol version
        80,   // Battery: 80 %
        0x00, 0x3C, // Log interval: 60 s
        0x00, 0x05, // Stored logs: 5
        0x00, 0xFA, // Temperature: 25.0 °C
        0x02, 0x58, // Humidity: 60.0 %
    ]
}

/// Build an advertisement with a fixed receive time.
pub fn advertisement(
    id: impl Into<DeviceId>,
    manufacturer_data: Vec<u8>,
    scan_record: Vec<u8>,
) -> RawAdvertisement {
    RawAdvertisement {
        id: id.into(),
        name: None,
        manufacturer_data,
        scan_record,
        received_at: SystemTime::UNIX_EPOCH,
    }
}

/// A decodable Blue Maestro advertisement.
pub fn bm_advertisement(id: impl Into<DeviceId>) -> RawAdvertisement {
    advertisement(id, bm_manufacturer_data(), bm_scan_record())
}

/// An advertisement from some other vendor (Apple, 0x004C).
pub fn foreign_advertisement(id: impl Into<DeviceId>) -> RawAdvertisement {
    advertisement(id, vec![0x4C, 0x00, 0x02, 0x15], bm_scan_record())
}
