//! Monitor mode capture of NAN frames.
//!
//! A `RawCapture` reads radiotap framed 802.11 frames from a monitor
//! interface, pre-filtered in the kernel on the NAN cluster BSSID. The
//! `MonitorPipeline` classifies each one:
//!
//! - frames sent by this host are dropped,
//! - NAN action frames have their attributes parsed and surfaced one by one,
//! - beacons update the sighting table, the first one from an address is
//!   surfaced,
//! - anything else is logged at debug level.
//!
//! A bad frame never stops the loop; only a read error does.

pub mod bpf;
pub mod dot11;
pub mod raw_socket;
pub mod sightings;

use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, trace, warn};
use radiotap::Radiotap;

use crate::error::Result;
use crate::nan_events::{NanEvent, NanEventSink};
use crate::nan_frame::ie::IeList;
use crate::nan_frame::{is_nan_action, MGMT_HEADER_LEN, NAN_ACTION_PREFIX};
use crate::wdev_drv::MacAddr;
use dot11::{Dot11Header, FrameKind};
use raw_socket::RawCapture;
use sightings::BeaconSightings;

/// Trailing frame check sequence length.
const FCS_LEN: usize = 4;

/// What happened to one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Radiotap or 802.11 header could not be decoded.
    Undecodable,
    /// Sent by this host.
    Echo,
    /// NAN action frame, with the number of attributes surfaced.
    NanAttributes(usize),
    /// NAN action frame whose attribute list is malformed.
    Malformed,
    Beacon { first: bool },
    Ignored,
}

pub struct MonitorPipeline {
    /// Radio the monitor interface belongs to.
    radio: u32,
    /// Addresses of the local interfaces.
    own: Vec<MacAddr>,
    sightings: Arc<BeaconSightings>,
    sink: Arc<dyn NanEventSink>,
}

impl MonitorPipeline {
    pub fn new(
        radio: u32, own: Vec<MacAddr>, sightings: Arc<BeaconSightings>,
        sink: Arc<dyn NanEventSink>,
    ) -> Self {
        Self {
            radio,
            own,
            sightings,
            sink,
        }
    }

    /// Reads and processes frames until the capture fails.
    pub fn run(&self, capture: &RawCapture) -> Result<()> {
        loop {
            let packet = capture.recv()?;
            let outcome = self.process_frame(&packet, SystemTime::now());
            trace!("{}: {:?}", capture.ifname(), outcome);
        }
    }

    /// Classifies one radiotap framed capture.
    pub fn process_frame(&self, packet: &[u8], time: SystemTime) -> FrameOutcome {
        let radiotap = match Radiotap::from_bytes(packet) {
            Ok(radiotap) => radiotap,
            Err(e) => {
                debug!("Couldn't read radiotap header: {:?}", e);
                return FrameOutcome::Undecodable;
            }
        };

        let Some(mut frame) = packet.get(radiotap.header.length..) else {
            return FrameOutcome::Undecodable;
        };
        if radiotap.flags.map_or(false, |flags| flags.fcs) {
            frame = &frame[..frame.len().saturating_sub(FCS_LEN)];
        }

        let Some(header) = Dot11Header::parse(frame) else {
            debug!("Short 802.11 frame of {} bytes", frame.len());
            return FrameOutcome::Undecodable;
        };

        if self.own.contains(&header.addr2) {
            return FrameOutcome::Echo;
        }

        trace!(
            "{:?} from {} freq {:?} signal {:?} rate {:?}",
            header.kind,
            header.addr2,
            radiotap.channel.as_ref().map(|c| c.freq),
            radiotap.antenna_signal.as_ref().map(|s| s.value),
            radiotap.rate.as_ref().map(|r| r.value)
        );

        let body = &frame[MGMT_HEADER_LEN..];
        match header.kind {
            FrameKind::Action if is_nan_action(body) => {
                self.surface_attributes(header.addr2, &body[NAN_ACTION_PREFIX.len()..], time)
            }
            FrameKind::Beacon => {
                let first = self.sightings.observe(header.addr2, time);
                if first {
                    self.sink.emit(NanEvent::BeaconSighted {
                        mac: header.addr2,
                        time,
                    });
                }
                FrameOutcome::Beacon { first }
            }
            kind => {
                debug!("Dropping {:?} from {}", kind, header.addr2);
                FrameOutcome::Ignored
            }
        }
    }

    fn surface_attributes(&self, mac: MacAddr, attrs: &[u8], time: SystemTime) -> FrameOutcome {
        let list = match IeList::parse(attrs) {
            Ok(list) => list,
            Err(e) => {
                warn!("Dropping NAN frame from {}: {}", mac, e);
                debug!("Attributes: {}", hex::encode(attrs));
                return FrameOutcome::Malformed;
            }
        };

        let mut count = 0;
        for ie in &list {
            self.sink.emit(NanEvent::PeerIeObserved {
                mac,
                ie_id: ie.id,
                bytes: ie.data.to_vec(),
                radio: self.radio,
                time,
            });
            count += 1;
        }
        FrameOutcome::NanAttributes(count)
    }
}
