//! Deduplicated, throttled set of the devices seen during a scan session.
//!
//! Each device is tracked independently and may be refreshed at most once per
//! throttle window. The first advertisement of a device is always accepted.
//! Devices are kept in first-seen order; an update replaces the entry in place.

use crate::advertisement::{DeviceId, RawAdvertisement};
use crate::config::RegistryConfig;
use crate::decoder::{DecodedReading, decode_reading, is_target};
use log::{debug, trace};
use std::collections::HashMap;
use std::time::Instant;

/// A device currently shown in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDevice {
    /// The last accepted advertisement
    pub advertisement: RawAdvertisement,
    /// The most recent reading, if the device ever produced one
    pub reading: Option<DecodedReading>,
    /// The entry may not be refreshed before this instant
    pub next_eligible_update: Instant,
}

impl TrackedDevice {
    pub fn id(&self) -> &DeviceId {
        &self.advertisement.id
    }

    pub fn name(&self) -> Option<&str> {
        self.advertisement.name.as_deref()
    }
}

/// Why an advertisement left the registry untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The advertisement did not come from the configured vendor
    NotTargetVendor,
    /// The device was refreshed less than one throttle window ago
    Throttled,
}

/// Result of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A device seen for the first time was appended
    Inserted,
    /// An existing entry was replaced in place
    Updated,
    /// Nothing changed
    Ignored(IgnoreReason),
}

impl UpsertOutcome {
    pub fn is_upserted(self) -> bool {
        !matches!(self, UpsertOutcome::Ignored(_))
    }
}

#[derive(Debug)]
pub struct DeviceRegistry {
    config: RegistryConfig,
    devices: Vec<TrackedDevice>,
    index: HashMap<DeviceId, usize>,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        DeviceRegistry {
            config,
            devices: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Record an advertisement received at `now`.
    ///
    /// Advertisements from other vendors and refreshes arriving before the
    /// device's `next_eligible_update` are ignored. Otherwise the entry is
    /// replaced wholesale and its next eligible update is pushed to
    /// `now + throttle_window`. An advertisement that fails to decode still
    /// refreshes the entry; whether it keeps the previous reading follows
    /// [`RegistryConfig::keep_stale_reading`].
    pub fn upsert(&mut self, raw: RawAdvertisement, now: Instant) -> UpsertOutcome {
        if !is_target(&raw, self.config.target_manufacturer_id) {
            trace!("{}: not a target vendor device", raw.id);
            return UpsertOutcome::Ignored(IgnoreReason::NotTargetVendor);
        }

        let existing = self.index.get(&raw.id).copied();
        if let Some(position) = existing
            && now < self.devices[position].next_eligible_update
        {
            trace!("{}: throttled", raw.id);
            return UpsertOutcome::Ignored(IgnoreReason::Throttled);
        }

        let reading = match decode_reading(&raw) {
            Ok(reading) => Some(reading),
            Err(reason) => {
                debug!("{}: no reading: {}", raw.id, reason);
                existing
                    .filter(|_| self.config.keep_stale_reading)
                    .and_then(|position| self.devices[position].reading)
            }
        };

        let device = TrackedDevice {
            advertisement: raw,
            reading,
            next_eligible_update: now + self.config.throttle_window,
        };

        match existing {
            Some(position) => {
                debug!("{}: updated", device.id());
                self.devices[position] = device;
                UpsertOutcome::Updated
            }
            None => {
                debug!("{}: inserted", device.id());
                self.index.insert(device.id().clone(), self.devices.len());
                self.devices.push(device);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Forget every device, as when a new scan session starts.
    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }

    /// Tracked devices in first-seen order.
    pub fn snapshot(&self) -> &[TrackedDevice] {
        &self.devices
    }

    pub fn get(&self, id: &DeviceId) -> Option<&TrackedDevice> {
        self.index.get(id).map(|&position| &self.devices[position])
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ManufacturerId;
    use crate::test_utils::{bm_advertisement, foreign_advertisement};
    use std::time::Duration;

    const WINDOW: Duration = Duration::from_millis(5000);

    fn registry() -> DeviceRegistry {
        DeviceRegistry::default()
    }

    fn ids(registry: &DeviceRegistry) -> Vec<&str> {
        registry.snapshot().iter().map(|d| d.id().as_str()).collect()
    }

    fn unparseable(id: &str) -> RawAdvertisement {
        let mut raw = bm_advertisement(id);
        raw.scan_record[7] = 22;
        raw
    }

    #[test]
    fn test_first_advertisement_inserted() {
        let mut registry = registry();
        let now = Instant::now();

        assert_eq!(registry.upsert(bm_advertisement("a"), now), UpsertOutcome::Inserted);

        let device = &registry.snapshot()[0];
        assert_eq!(device.id().as_str(), "a");
        assert_eq!(device.reading.unwrap().battery_percent, 80);
        assert_eq!(device.next_eligible_update, now + WINDOW);
    }

    #[test]
    fn test_foreign_vendor_ignored() {
        let mut registry = registry();
        let now = Instant::now();

        assert_eq!(
            registry.upsert(foreign_advertisement("x"), now),
            UpsertOutcome::Ignored(IgnoreReason::NotTargetVendor)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_manufacturer_data_ignored() {
        let mut registry = registry();
        let mut raw = bm_advertisement("a");
        raw.manufacturer_data.clear();

        assert_eq!(
            registry.upsert(raw, Instant::now()),
            UpsertOutcome::Ignored(IgnoreReason::NotTargetVendor)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_configured_target_vendor() {
        let mut registry = DeviceRegistry::new(RegistryConfig {
            target_manufacturer_id: ManufacturerId(0x004C),
            ..RegistryConfig::default()
        });
        let now = Instant::now();

        assert_eq!(
            registry.upsert(bm_advertisement("a"), now),
            UpsertOutcome::Ignored(IgnoreReason::NotTargetVendor)
        );
        assert_eq!(registry.upsert(foreign_advertisement("x"), now), UpsertOutcome::Inserted);
    }

    #[test]
    fn test_throttle_boundary() {
        let mut registry = registry();
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);

        assert_eq!(
            registry.upsert(bm_advertisement("a"), start + WINDOW - Duration::from_millis(1)),
            UpsertOutcome::Ignored(IgnoreReason::Throttled)
        );
        assert_eq!(
            registry.upsert(bm_advertisement("a"), start + WINDOW),
            UpsertOutcome::Updated
        );
    }

    #[test]
    fn test_throttled_event_does_not_extend_window() {
        let mut registry = registry();
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);

        for ms in [1, 1000, 4000, 4999] {
            assert_eq!(
                registry.upsert(bm_advertisement("a"), start + Duration::from_millis(ms)),
                UpsertOutcome::Ignored(IgnoreReason::Throttled)
            );
        }
        assert_eq!(registry.snapshot()[0].next_eligible_update, start + WINDOW);
        assert_eq!(
            registry.upsert(bm_advertisement("a"), start + Duration::from_millis(5001)),
            UpsertOutcome::Updated
        );
    }

    #[test]
    fn test_update_resets_window() {
        let mut registry = registry();
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);
        let later = start + Duration::from_secs(7);
        registry.upsert(bm_advertisement("a"), later);

        assert_eq!(registry.snapshot()[0].next_eligible_update, later + WINDOW);
        assert_eq!(
            registry.upsert(bm_advertisement("a"), start + Duration::from_secs(11)),
            UpsertOutcome::Ignored(IgnoreReason::Throttled)
        );
    }

    #[test]
    fn test_devices_throttled_independently() {
        let mut registry = registry();
        let now = Instant::now();

        assert_eq!(registry.upsert(bm_advertisement("a"), now), UpsertOutcome::Inserted);
        assert_eq!(registry.upsert(bm_advertisement("b"), now), UpsertOutcome::Inserted);
        assert_eq!(
            registry.upsert(bm_advertisement("a"), now),
            UpsertOutcome::Ignored(IgnoreReason::Throttled)
        );
        assert_eq!(
            registry.upsert(bm_advertisement("b"), now),
            UpsertOutcome::Ignored(IgnoreReason::Throttled)
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ignored_does_not_change_snapshot() {
        let mut registry = registry();
        let now = Instant::now();
        registry.upsert(bm_advertisement("a"), now);
        registry.upsert(bm_advertisement("b"), now);
        let before = registry.snapshot().to_vec();

        let mut renamed = bm_advertisement("a");
        renamed.name = Some("changed".to_string());
        registry.upsert(renamed, now + Duration::from_millis(10));
        registry.upsert(foreign_advertisement("c"), now);

        assert_eq!(registry.snapshot(), before.as_slice());
    }

    #[test]
    fn test_updates_keep_order_and_length() {
        let mut registry = registry();
        let start = Instant::now();
        for id in ["c", "a", "b"] {
            registry.upsert(bm_advertisement(id), start);
        }

        for round in 1..=3 {
            let now = start + WINDOW * round;
            for id in ["b", "a", "c"] {
                let mut raw = bm_advertisement(id);
                raw.scan_record[8] = 80 - round as u8;
                assert_eq!(registry.upsert(raw, now), UpsertOutcome::Updated);
            }
        }

        assert_eq!(ids(&registry), vec!["c", "a", "b"]);
        for device in registry.snapshot() {
            assert_eq!(device.reading.unwrap().battery_percent, 77);
        }
    }

    #[test]
    fn test_update_replaces_advertisement() {
        let mut registry = registry();
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);

        let mut renamed = bm_advertisement("a");
        renamed.name = Some("CB Tempo".to_string());
        registry.upsert(renamed, start + WINDOW);

        let id = DeviceId::from("a");
        assert_eq!(registry.get(&id).unwrap().name(), Some("CB Tempo"));
    }

    #[test]
    fn test_unparseable_first_advertisement_tracked_without_reading() {
        let mut registry = registry();

        assert_eq!(registry.upsert(unparseable("a"), Instant::now()), UpsertOutcome::Inserted);
        assert_eq!(registry.snapshot()[0].reading, None);
    }

    #[test]
    fn test_unparseable_update_keeps_stale_reading() {
        let mut registry = registry();
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);

        assert_eq!(registry.upsert(unparseable("a"), start + WINDOW), UpsertOutcome::Updated);

        let device = &registry.snapshot()[0];
        assert_eq!(device.reading.unwrap().temperature_celsius, 25.0);
        assert_eq!(device.advertisement.scan_record[7], 22);
        assert_eq!(device.next_eligible_update, start + WINDOW + WINDOW);
    }

    #[test]
    fn test_unparseable_update_discards_reading_when_configured() {
        let mut registry = DeviceRegistry::new(RegistryConfig {
            keep_stale_reading: false,
            ..RegistryConfig::default()
        });
        let start = Instant::now();
        registry.upsert(bm_advertisement("a"), start);

        assert_eq!(registry.upsert(unparseable("a"), start + WINDOW), UpsertOutcome::Updated);
        assert_eq!(registry.snapshot()[0].reading, None);
    }

    #[test]
    fn test_zero_window_never_throttles() {
        let mut registry = DeviceRegistry::new(RegistryConfig {
            throttle_window: Duration::ZERO,
            ..RegistryConfig::default()
        });
        let now = Instant::now();

        assert_eq!(registry.upsert(bm_advertisement("a"), now), UpsertOutcome::Inserted);
        assert_eq!(registry.upsert(bm_advertisement("a"), now), UpsertOutcome::Updated);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clear_starts_new_session() {
        let mut registry = registry();
        let now = Instant::now();
        registry.upsert(bm_advertisement("a"), now);
        registry.upsert(bm_advertisement("b"), now);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(&DeviceId::from("a")).is_none());

        // A cleared device is new again, so the throttle no longer applies
        assert_eq!(registry.upsert(bm_advertisement("b"), now), UpsertOutcome::Inserted);
        assert_eq!(registry.upsert(bm_advertisement("a"), now), UpsertOutcome::Inserted);
        assert_eq!(ids(&registry), vec!["b", "a"]);
    }

    #[test]
    fn test_many_devices() {
        let mut registry = registry();
        let now = Instant::now();
        let ids: Vec<String> = (0..100).map(|i| format!("dev-{i:03}")).collect();

        for id in &ids {
            assert!(registry.upsert(bm_advertisement(id.as_str()), now).is_upserted());
        }
        for id in &ids {
            assert!(!registry.upsert(bm_advertisement(id.as_str()), now).is_upserted());
        }

        assert_eq!(registry.len(), 100);
        assert_eq!(registry.snapshot()[42].id().as_str(), "dev-042");
    }
}
