//! Beacon sightings, shared by every monitor loop.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::wdev_drv::MacAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sighting {
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
    pub count: u64,
}

#[derive(Debug, Default)]
pub struct BeaconSightings {
    table: Mutex<HashMap<MacAddr, Sighting>>,
}

impl BeaconSightings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a beacon from `mac`. Returns `true` the first time the address
    /// is seen.
    pub fn observe(&self, mac: MacAddr, time: SystemTime) -> bool {
        let Ok(mut table) = self.table.lock() else {
            return false;
        };

        match table.get_mut(&mac) {
            Some(sighting) => {
                sighting.last_seen = time;
                sighting.count += 1;
                false
            }
            None => {
                table.insert(
                    mac,
                    Sighting {
                        first_seen: time,
                        last_seen: time,
                        count: 1,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, mac: &MacAddr) -> Option<Sighting> {
        self.table.lock().ok()?.get(mac).copied()
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_first_sight_only() {
        let sightings = BeaconSightings::new();
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        let t0 = SystemTime::UNIX_EPOCH;

        assert!(sightings.observe(mac, t0));
        assert!(!sightings.observe(mac, t0 + Duration::from_secs(1)));
        assert!(!sightings.observe(mac, t0 + Duration::from_secs(2)));

        let sighting = sightings.get(&mac).unwrap();
        assert_eq!(sighting.count, 3);
        assert_eq!(sighting.first_seen, t0);
        assert_eq!(sighting.last_seen, t0 + Duration::from_secs(2));
        assert_eq!(sightings.len(), 1);
    }
}
