//! Byte level codec of the NAN management frames.
//!
//! Frames are laid out at fixed offsets and written into a `FrameBuf`, a
//! scratch buffer owned by a single writer and reused across sends. The
//! builders return the length of the frame they wrote; `FrameBuf::frame`
//! hands out the bytes.
//!
//! - `beacon`: synchronisation beacons.
//! - `discovery`: publish/subscribe service discovery frames.
//! - `followup`: point to point follow-up frames carrying a small payload.
//! - `ie`: the `{id, u16 LE length, data}` attribute list codec.

pub mod beacon;
pub mod discovery;
pub mod followup;
pub mod ie;

use crate::error::{NanError, Result};

/// Scratch buffer capacity, one frame at a time.
pub const FRAME_CAPACITY: usize = 4096;

/// Length of the 802.11 management header.
pub const MGMT_HEADER_LEN: usize = 24;

/// BSSID every NAN frame carries, used as the cluster marker.
pub const NAN_BSSID: [u8; 6] = [0x50, 0x6F, 0x9A, 0x01, 0xD9, 0x49];

/// NAN network (group) address, destination of discovery frames.
pub const NAN_GROUP_ADDR: [u8; 6] = [0x51, 0x6F, 0x9A, 0x01, 0x00, 0x00];

/// Wi-Fi Alliance OUI followed by the NAN type.
pub const NAN_OUI_TYPE: [u8; 4] = [0x50, 0x6F, 0x9A, 0x13];

/// Body prefix of NAN action frames: public action, vendor specific, then
/// the NAN OUI and type.
pub const NAN_ACTION_PREFIX: [u8; 6] = [0x04, 0x09, 0x50, 0x6F, 0x9A, 0x13];

/// Service id shared by every node of the deployment.
pub const SERVICE_ID: [u8; 6] = [0x75, 0x94, 0x31, 0x93, 0xEA, 0xC9];

/// Largest service payload, its length travels in a single byte.
pub const MAX_SERVICE_PAYLOAD: usize = u8::MAX as usize;

/// Offset of the transmitter address in the management header.
pub const SRC_ADDR_OFFSET: usize = 10;

/// Header of the NAN action frames. The source is filled at send time.
const NAN_ACTION_HEAD: [u8; 30] = [
    0xD0, 0x00, // management, action
    0x00, 0x00, // duration
    0x51, 0x6F, 0x9A, 0x01, 0x00, 0x00, // destination
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // source
    0x50, 0x6F, 0x9A, 0x01, 0xD9, 0x49, // BSSID
    0x00, 0x00, // sequence control
    0x04, 0x09, 0x50, 0x6F, 0x9A, 0x13,
];

/// Single writer scratch buffer frames are assembled in.
///
/// The builders take `&mut self`, so a frame cannot be rebuilt while the
/// bytes of the previous one are still borrowed for a send.
pub struct FrameBuf {
    bytes: Box<[u8]>,
}

impl FrameBuf {
    pub fn new() -> Self {
        Self {
            bytes: vec![0u8; FRAME_CAPACITY].into_boxed_slice(),
        }
    }

    /// The first `len` bytes, as returned by a builder.
    pub fn frame(&self, len: usize) -> &[u8] {
        &self.bytes[..len.min(FRAME_CAPACITY)]
    }

    fn put(&mut self, offset: usize, data: &[u8]) -> usize {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        offset + data.len()
    }

    /// Writes the NAN action header addressed to `dst` from `src`.
    fn put_action_head(&mut self, src: &[u8; 6], dst: &[u8; 6]) -> usize {
        let end = self.put(0, &NAN_ACTION_HEAD);
        self.put(4, dst);
        self.put(SRC_ADDR_OFFSET, src);
        end
    }
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

fn check_payload(len: usize, fixed: usize) -> Result<()> {
    let max = MAX_SERVICE_PAYLOAD.min(FRAME_CAPACITY - fixed);
    if len > max {
        return Err(NanError::PayloadTooLarge { len, max }.into());
    }
    Ok(())
}

/// Whether an action frame body is a NAN action frame.
pub fn is_nan_action(body: &[u8]) -> bool {
    body.starts_with(&NAN_ACTION_PREFIX)
}
