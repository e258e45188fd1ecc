//! Per interface NAN transmit state and the handling of the asynchronous
//! nl80211 events that complete it.
//!
//! The main components are:
//! - `NanSession`: serialises the sends of one interface, applies the 100 ms
//!   suppression rule and keeps the send statistics.
//! - `SessionRegistry`: interface index to session map, created lazily, plus
//!   the process wide remain on channel record. It dispatches nl80211 events.
//! - `scheduler::BeaconScheduler`: periodic beacons for one session.

pub mod roc;
pub mod scheduler;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use log::{debug, error, info, trace, warn};

use crate::config::NanConfig;
use crate::error::Result;
use crate::nan_frame::{FrameBuf, SRC_ADDR_OFFSET};
use crate::wdev_drv::{
    GenlTransport, InterfaceIndex, MacAddr, Nl80211Attr, Nl80211Command,
    NlEvent,
};
use crate::wifi_directory::{Directory, Interface};
use roc::RocTracker;

/// Minimum time between two sends on one interface.
pub const SEND_SUPPRESSION: Duration = Duration::from_millis(100);
/// Transmit status later than this after the send is logged.
const SLOW_STATUS: Duration = Duration::from_millis(300);
/// Submitting a frame to the kernel slower than this is logged.
const SLOW_SUBMIT: Duration = Duration::from_millis(5);

/// Service info sent with the discovery frame paired with every beacon.
const BEACON_DISCOVERY_PAYLOAD: [u8; 1] = [0x01];

/// Radio parameters of the sends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SendSettings {
    pub frequency: u32,
    pub beacon_dwell_ms: u32,
    pub discovery_dwell_ms: u32,
    pub followup_dwell_ms: u32,
}

impl From<&NanConfig> for SendSettings {
    fn from(config: &NanConfig) -> Self {
        Self {
            frequency: config.frequency_mhz,
            beacon_dwell_ms: config.beacon_dwell_ms,
            discovery_dwell_ms: config.discovery_dwell_ms,
            followup_dwell_ms: config.followup_dwell_ms,
        }
    }
}

/// Snapshot of the send counters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionStats {
    pub last_sent: Option<Instant>,
    pub last_submit_latency: Option<Duration>,
    pub last_seq: Option<u32>,
    pub send_errors: u64,
}

struct SendState {
    stats: SessionStats,
    /// A send whose transmit status has not arrived yet.
    awaiting_status: bool,
    frame: FrameBuf,
}

/// Transmit side of one interface.
pub struct NanSession<T: GenlTransport> {
    iface: Interface,
    transport: Arc<T>,
    settings: SendSettings,
    state: Mutex<SendState>,
}

impl<T: GenlTransport> NanSession<T> {
    pub fn new(iface: Interface, transport: Arc<T>, settings: SendSettings) -> Self {
        Self {
            iface,
            transport,
            settings,
            state: Mutex::new(SendState {
                stats: SessionStats::default(),
                awaiting_status: false,
                frame: FrameBuf::new(),
            }),
        }
    }

    pub fn interface(&self) -> &Interface {
        &self.iface
    }

    pub fn stats(&self) -> Result<SessionStats> {
        Ok(self.lock_state()?.stats)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SendState>> {
        self.state
            .lock()
            .map_err(|e| anyhow!("session {} lock poisoned: {}", self.iface.name, e))
    }

    /// Sends a raw management frame, starting with the frame control field.
    /// The source address is overwritten with the interface address.
    ///
    /// A send less than 100 ms after the previous one is dropped and reported
    /// as success.
    pub fn send_raw(&self, frame: &[u8], frequency: u32, dwell_ms: u32) -> Result<()> {
        let mut state = self.lock_state()?;
        if Self::suppressed(&state) {
            return Ok(());
        }
        let attrs = self.frame_attrs(frame, frequency, dwell_ms);
        self.transmit(&mut state, attrs)
    }

    /// Sends a beacon followed by a publish discovery frame, so a listener
    /// gets the cluster and the service in the same cycle. The suppression
    /// rule applies to the pair.
    pub fn send_beacon(&self, sync: bool) -> Result<()> {
        let mut state = self.lock_state()?;
        if Self::suppressed(&state) {
            return Ok(());
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let len = state.frame.build_beacon(self.iface.mac, sync, timestamp);
        let attrs = self.frame_attrs(
            state.frame.frame(len),
            self.settings.frequency,
            self.settings.beacon_dwell_ms,
        );
        self.transmit(&mut state, attrs)?;

        let len = state.frame.build_discovery(
            self.iface.mac,
            &BEACON_DISCOVERY_PAYLOAD,
            true,
        )?;
        let attrs = self.frame_attrs(
            state.frame.frame(len),
            self.settings.frequency,
            self.settings.discovery_dwell_ms,
        );
        self.transmit(&mut state, attrs)
    }

    /// Sends a publish (or subscribe) frame carrying `payload`.
    pub fn send_discovery(&self, payload: &[u8], publish: bool, dwell_ms: u32) -> Result<()> {
        let mut state = self.lock_state()?;
        if Self::suppressed(&state) {
            return Ok(());
        }

        let len = state.frame.build_discovery(self.iface.mac, payload, publish)?;
        let attrs = self.frame_attrs(state.frame.frame(len), self.settings.frequency, dwell_ms);
        self.transmit(&mut state, attrs)
    }

    /// Sends `payload` to `dst` (broadcast when `None`) in a follow-up frame.
    pub fn send_followup(
        &self, dst: Option<MacAddr>, port: u8, frequency: u32, payload: &[u8],
    ) -> Result<()> {
        let mut state = self.lock_state()?;
        if Self::suppressed(&state) {
            return Ok(());
        }

        let dst = dst.unwrap_or(MacAddr::BROADCAST);
        let len = state.frame.build_followup(self.iface.mac, dst, port, payload)?;
        let attrs = self.frame_attrs(
            state.frame.frame(len),
            frequency,
            self.settings.followup_dwell_ms,
        );
        self.transmit(&mut state, attrs)
    }

    fn suppressed(state: &SendState) -> bool {
        match state.stats.last_sent {
            Some(last) if last.elapsed() < SEND_SUPPRESSION => {
                trace!("Send suppressed, last one {:?} ago", last.elapsed());
                true
            }
            _ => false,
        }
    }

    /// Attributes of a frame request. The frame is copied once, straight
    /// into the attribute, with its source address set to the interface one.
    fn frame_attrs(&self, frame: &[u8], frequency: u32, dwell_ms: u32) -> Vec<Nl80211Attr> {
        let mut frame = frame.to_vec();
        if let Some(src) = frame.get_mut(SRC_ADDR_OFFSET..SRC_ADDR_OFFSET + 6) {
            src.copy_from_slice(self.iface.mac.octets());
        }

        vec![
            Nl80211Attr::Ifindex(self.iface.index.into()),
            Nl80211Attr::Wdev(self.iface.device),
            Nl80211Attr::WiphyFreq(frequency),
            Nl80211Attr::OffchannelTxOk,
            Nl80211Attr::Duration(dwell_ms),
            Nl80211Attr::Frame(frame),
        ]
    }

    fn transmit(&self, state: &mut SendState, attrs: Vec<Nl80211Attr>) -> Result<()> {
        let t0 = Instant::now();
        match self.transport.send(Nl80211Command::Frame, attrs) {
            Ok(seq) => {
                state.stats.last_sent = Some(t0);
                state.stats.last_submit_latency = Some(t0.elapsed());
                state.stats.last_seq = Some(seq);
                state.awaiting_status = true;
                Ok(())
            }
            Err(e) => {
                state.stats.send_errors += 1;
                error!("Failed to send frame on {}: {:#}", self.iface.name, e);
                Err(e)
            }
        }
    }

    /// Handles a transmit status for this interface.
    ///
    /// Statuses carry no per frame id, so the status is attributed to the
    /// latest send. The suppression rule keeps at most one send in flight per
    /// interface, which is what makes this attribution hold.
    pub fn on_tx_status(&self, acked: bool) -> Result<()> {
        let mut state = self.lock_state()?;
        if !state.awaiting_status {
            debug!("TX status on {} without a pending send", self.iface.name);
            return Ok(());
        }
        state.awaiting_status = false;

        let since_sent = state.stats.last_sent.map(|t| t.elapsed()).unwrap_or_default();
        let submit = state.stats.last_submit_latency.unwrap_or_default();
        if since_sent > SLOW_STATUS || submit > SLOW_SUBMIT {
            warn!(
                "TX on {}: status after {:?}, submit took {:?}, ack {}",
                self.iface.name, since_sent, submit, acked
            );
        } else {
            trace!(
                "TX on {}: status after {:?}, ack {}",
                self.iface.name,
                since_sent,
                acked
            );
        }
        Ok(())
    }

    #[cfg(test)]
    fn awaiting_status(&self) -> bool {
        self.lock_state().map(|s| s.awaiting_status).unwrap_or(false)
    }
}

/// Sessions by interface index and the remain on channel record.
pub struct SessionRegistry<T: GenlTransport> {
    directory: Arc<Directory<T>>,
    settings: SendSettings,
    sessions: Mutex<HashMap<InterfaceIndex, Arc<NanSession<T>>>>,
    roc: RocTracker,
}

impl<T: GenlTransport> SessionRegistry<T> {
    pub fn new(directory: Arc<Directory<T>>, settings: SendSettings) -> Self {
        Self {
            directory,
            settings,
            sessions: Mutex::new(HashMap::new()),
            roc: RocTracker::new(),
        }
    }

    pub fn roc(&self) -> &RocTracker {
        &self.roc
    }

    /// Asks the radio of `index` to stay on `frequency`, recording the
    /// request so the kernel events can be matched to it.
    pub fn remain_on_channel(
        &self, index: InterfaceIndex, frequency: u32, duration_ms: u32,
    ) -> Result<Option<u64>> {
        let iface = self.directory.interface(index)?;
        self.directory
            .remain_on_channel(&iface, frequency, duration_ms, &self.roc)
    }

    fn lock_sessions(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<InterfaceIndex, Arc<NanSession<T>>>>> {
        self.sessions
            .lock()
            .map_err(|e| anyhow!("session registry lock poisoned: {}", e))
    }

    /// The session of `index`, created on first use. Fails with
    /// `NanError::UnknownInterface` when the last enumeration did not report
    /// the interface.
    pub fn session(&self, index: InterfaceIndex) -> Result<Arc<NanSession<T>>> {
        if let Some(session) = self.lock_sessions()?.get(&index) {
            return Ok(Arc::clone(session));
        }

        let iface = self.directory.interface(index)?;
        let mut sessions = self.lock_sessions()?;
        let session = sessions.entry(index).or_insert_with(|| {
            info!("New NAN session on {} ({})", iface.name, index);
            Arc::new(NanSession::new(
                iface,
                self.directory.transport(),
                self.settings,
            ))
        });
        Ok(Arc::clone(session))
    }

    /// An existing session, events never create one.
    pub fn existing(&self, index: InterfaceIndex) -> Option<Arc<NanSession<T>>> {
        self.lock_sessions().ok()?.get(&index).cloned()
    }

    /// Dispatches one nl80211 event.
    pub fn handle_event(&self, event: &NlEvent) {
        let ifindex = event.ifindex();

        match event.cmd {
            Nl80211Command::FrameTxStatus => {
                let acked = event.attrs.contains(&Nl80211Attr::Ack);
                match ifindex.and_then(|idx| self.existing(idx)) {
                    Some(session) => {
                        if let Err(e) = session.on_tx_status(acked) {
                            warn!("{:#}", e);
                        }
                    }
                    None => debug!("TX status for interface {:?} without a session", ifindex),
                }
            }
            Nl80211Command::RemainOnChannel => {
                let mut frequency = 0;
                let mut duration = 0;
                let mut cookie = None;
                for attr in &event.attrs {
                    match attr {
                        Nl80211Attr::WiphyFreq(f) => frequency = *f,
                        Nl80211Attr::Duration(d) => duration = *d,
                        Nl80211Attr::Cookie(c) => cookie = Some(*c),
                        _ => (),
                    }
                }
                self.roc.started(
                    frequency,
                    Duration::from_millis(duration as u64),
                    cookie,
                );
            }
            Nl80211Command::CancelRemainOnChannel => {
                self.roc.finished();
            }
            Nl80211Command::FrameWaitCancel => {
                let name = ifindex
                    .and_then(|idx| self.existing(idx))
                    .map(|session| session.interface().name.clone());
                debug!("Frame wait cancelled on {:?} ({:?})", name, ifindex);
            }
            Nl80211Command::Frame => {
                // Index 0 is the echo of our own send
                if let Some(idx) = ifindex.filter(|idx| idx.0 != 0) {
                    for attr in &event.attrs {
                        if let Nl80211Attr::Frame(frame) = attr {
                            debug!("Frame received on {}: {}", idx, hex::encode(frame));
                        }
                    }
                }
            }
            other => trace!("Unhandled nl80211 event {:?}: {:?}", other, event.attrs),
        }
    }
}
