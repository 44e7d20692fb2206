//! Bluetooth device address used as the device identity on Linux backends.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth device address stored in display order (most significant byte first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Build an address from the little-endian byte order used on the HCI wire.
    pub fn from_hci_bytes(bytes: &[u8; 6]) -> Self {
        let mut addr = *bytes;
        addr.reverse();
        Self(addr)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing an address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: '{0}' is not a two digit hex byte")]
    InvalidPart(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (byte, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPart(part.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidPart(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x0F]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:0F");
    }

    #[test]
    fn test_from_hci_bytes_reverses() {
        let addr = MacAddress::from_hci_bytes(&[0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(addr, MacAddress([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
    }

    #[test]
    fn test_from_str_roundtrips_display() {
        let addr: MacAddress = "d4:ca:6e:01:02:03".parse().unwrap();
        assert_eq!(addr.to_string(), "D4:CA:6E:01:02:03");
    }

    #[test]
    fn test_from_str_invalid() {
        assert_eq!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        );
        assert_eq!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPart("GG".to_string()))
        );
        assert_eq!(
            "AA:BB:CC:DD:EE:F".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPart("F".to_string()))
        );
    }
}
