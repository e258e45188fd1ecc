//! Minimal 802.11 management header decoding.

use crate::nan_frame::MGMT_HEADER_LEN;
use crate::wdev_drv::MacAddr;

const TYPE_MANAGEMENT: u8 = 0;
const SUBTYPE_BEACON: u8 = 8;
const SUBTYPE_ACTION: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Beacon,
    Action,
    Other { ftype: u8, subtype: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dot11Header {
    pub kind: FrameKind,
    /// Receiver.
    pub addr1: MacAddr,
    /// Transmitter.
    pub addr2: MacAddr,
    pub bssid: MacAddr,
}

impl Dot11Header {
    /// Decodes the header of `frame`, `None` when it is shorter than a
    /// management header.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < MGMT_HEADER_LEN {
            return None;
        }

        let fc = frame[0];
        let ftype = (fc >> 2) & 0x03;
        let subtype = (fc >> 4) & 0x0F;
        let kind = match (ftype, subtype) {
            (TYPE_MANAGEMENT, SUBTYPE_BEACON) => FrameKind::Beacon,
            (TYPE_MANAGEMENT, SUBTYPE_ACTION) => FrameKind::Action,
            _ => FrameKind::Other { ftype, subtype },
        };

        Some(Self {
            kind,
            addr1: MacAddr::from_slice(&frame[4..10])?,
            addr2: MacAddr::from_slice(&frame[10..16])?,
            bssid: MacAddr::from_slice(&frame[16..22])?,
        })
    }
}
