//! Events surfaced to the message routing layer.

use std::time::SystemTime;

use log::warn;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[cfg(test)]
use mockall::automock;

use crate::wdev_drv::MacAddr;

#[derive(Debug, Clone, PartialEq)]
pub enum NanEvent {
    /// A NAN attribute received from a peer.
    PeerIeObserved {
        mac: MacAddr,
        ie_id: u8,
        bytes: Vec<u8>,
        /// Radio of the monitor interface that captured the frame.
        radio: u32,
        time: SystemTime,
    },
    /// First beacon seen from `mac`.
    BeaconSighted { mac: MacAddr, time: SystemTime },
}

/// Receiver of the events. Called from the capture threads, so it must not
/// block.
#[cfg_attr(test, automock)]
pub trait NanEventSink: Send + Sync {
    fn emit(&self, event: NanEvent);
}

impl NanEventSink for mpsc::Sender<NanEvent> {
    fn emit(&self, event: NanEvent) {
        match self.try_send(event) {
            Ok(()) => (),
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping {:?}", event)
            }
            Err(TrySendError::Closed(_)) => warn!("Event queue closed"),
        }
    }
}
