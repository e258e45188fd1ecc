//! NAN synchronisation beacon.
//!
//! 24 byte management header, 12 bytes of fixed fields (timestamp, beacon
//! interval, capabilities) and one vendor element holding the master
//! preference, cluster and service id list attributes. 72 bytes in total.

use super::{FrameBuf, SRC_ADDR_OFFSET};
use crate::wdev_drv::MacAddr;

pub const BEACON_LEN: usize = 72;

pub const TIMESTAMP_OFFSET: usize = 24;
pub const INTERVAL_OFFSET: usize = 32;
pub const MASTER_MAC_OFFSET: usize = 50;

/// Beacon interval bytes of a synchronisation beacon (512 TU).
pub const SYNC_INTERVAL: [u8; 2] = [0x00, 0x02];
/// Beacon interval bytes of an offset (discovery window) beacon.
pub const OFFSET_INTERVAL: [u8; 2] = [0x80, 0x00];

const BEACON_TEMPLATE: [u8; BEACON_LEN] = [
    0x80, 0x00, // management, beacon
    0x00, 0x00, // duration
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // destination
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // source
    0x50, 0x6F, 0x9A, 0x01, 0xD9, 0x49, // BSSID
    0x00, 0x00, // sequence control
    // 24: timestamp
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    // 32: beacon interval
    0x00, 0x02,
    // 34: capabilities
    0x20, 0x04,
    // 36: vendor element, 34 bytes
    0xDD, 34, 0x50, 0x6F, 0x9A, 0x13,
    // 42: master preference attribute
    0x00, 0x02, 0x00, 0x8C, 0xFE,
    // 47: cluster attribute
    0x01, 0x0D, 0x00,
    // 50: master address, random factor, preference
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFE, 0x8C,
    // 58: hop count to the master
    0x00,
    // 59: anchor master beacon transmission time
    0x00, 0x00, 0x00, 0x00,
    // 63: service id list attribute
    0x02, 0x06, 0x00, 0x75, 0x94, 0x31, 0x93, 0xEA, 0xC9,
];

impl FrameBuf {
    /// Writes a beacon sent by `mac`, which is also the cluster master.
    ///
    /// `timestamp` is in seconds; `sync` selects the synchronisation
    /// interval over the offset one. Returns the frame length.
    pub fn build_beacon(&mut self, mac: MacAddr, sync: bool, timestamp: u64) -> usize {
        self.put(0, &BEACON_TEMPLATE);
        self.put(SRC_ADDR_OFFSET, mac.octets());
        self.put(TIMESTAMP_OFFSET, &timestamp.to_le_bytes());
        self.put(
            INTERVAL_OFFSET,
            if sync { &SYNC_INTERVAL } else { &OFFSET_INTERVAL },
        );
        self.put(MASTER_MAC_OFFSET, mac.octets());
        BEACON_LEN
    }
}
