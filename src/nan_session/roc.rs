//! Remain on channel bookkeeping.
//!
//! Only one channel excursion is tracked at a time for the whole process. A
//! request opens the record, the kernel start event stamps it and the cancel
//! event closes it, so the request to start latency and the time spent on
//! channel can be logged. A new request replaces the pending record. Sends
//! never wait on any of this.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingRoc {
    /// When the request was made, or when the start was seen for an
    /// excursion requested by someone else.
    pub requested: Instant,
    /// When the kernel reported the radio on channel.
    pub started: Option<Instant>,
    pub frequency: u32,
    pub duration: Duration,
    pub cookie: Option<u64>,
}

impl PendingRoc {
    fn new(frequency: u32, duration: Duration, cookie: Option<u64>) -> Self {
        Self {
            requested: Instant::now(),
            started: None,
            frequency,
            duration,
            cookie,
        }
    }

    /// Time between the request and the kernel start event.
    pub fn start_latency(&self) -> Option<Duration> {
        self.started
            .map(|started| started.saturating_duration_since(self.requested))
    }
}

#[derive(Debug, Default)]
pub struct RocTracker {
    pending: Mutex<Option<PendingRoc>>,
}

impl RocTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Option<MutexGuard<'_, Option<PendingRoc>>> {
        self.pending.lock().ok()
    }

    /// Opens a record for a request about to be sent.
    pub fn requested(&self, frequency: u32, duration: Duration) {
        let Some(mut pending) = self.lock() else {
            return;
        };
        if let Some(previous) = pending.replace(PendingRoc::new(frequency, duration, None)) {
            warn!(
                "ROC on {} MHz replaced before it ended",
                previous.frequency
            );
        }
    }

    /// The kernel accepted the request and answered with `cookie`.
    pub fn accepted(&self, cookie: Option<u64>) {
        let Some(mut pending) = self.lock() else {
            return;
        };
        if let Some(roc) = pending.as_mut() {
            roc.cookie = roc.cookie.or(cookie);
        }
    }

    /// The request failed, nothing will start.
    pub fn rejected(&self) {
        if let Some(mut pending) = self.lock() {
            pending.take();
        }
    }

    /// Kernel start event. Stamps the pending request, or records an
    /// excursion that was not requested here.
    pub fn started(&self, frequency: u32, duration: Duration, cookie: Option<u64>) {
        let Some(mut pending) = self.lock() else {
            return;
        };

        let matches = pending.as_ref().map_or(false, |roc| {
            roc.started.is_none() && (roc.cookie.is_none() || roc.cookie == cookie)
        });
        if !matches {
            if let Some(previous) = pending.take() {
                warn!(
                    "ROC on {} MHz replaced before it ended",
                    previous.frequency
                );
            }
            *pending = Some(PendingRoc::new(frequency, duration, cookie));
        }

        if let Some(roc) = pending.as_mut() {
            roc.started = Some(Instant::now());
            roc.frequency = frequency;
            roc.duration = duration;
            roc.cookie = cookie.or(roc.cookie);
            debug!(
                "ROC started on {} MHz, {:?} after the request",
                roc.frequency,
                roc.start_latency().unwrap_or_default()
            );
        }
    }

    /// Clears the pending record and logs how long the radio stayed.
    pub fn finished(&self) -> Option<PendingRoc> {
        let roc = self.lock()?.take();
        match &roc {
            Some(roc) => info!(
                "ROC on {} MHz ended {:?} after the request, start took {:?}, requested {:?}",
                roc.frequency,
                roc.requested.elapsed(),
                roc.start_latency(),
                roc.duration
            ),
            None => debug!("ROC ended without a recorded start"),
        }
        roc
    }

    pub fn pending(&self) -> Option<PendingRoc> {
        self.lock()?.clone()
    }
}
