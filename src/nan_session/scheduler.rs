//! Periodic beacon transmission for one session.
//!
//! Sends are blocking netlink writes, so each tick runs on the blocking pool
//! and the runtime threads stay free for timers and channels.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};

use super::NanSession;
use crate::wdev_drv::GenlTransport;

/// Sends a beacon every period until dropped.
pub struct BeaconScheduler {
    _drop_tx: oneshot::Sender<()>,
}

impl BeaconScheduler {
    /// Starts the task. Must be called from within a tokio runtime.
    pub fn start<T: GenlTransport>(
        session: Arc<NanSession<T>>, period: Duration, sync: bool,
    ) -> Self {
        let (drop_tx, mut drop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let name = session.interface().name.clone();
            info!("Beacon scheduler started on {} every {:?}", name, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let session = Arc::clone(&session);
                        match tokio::task::spawn_blocking(move || session.send_beacon(sync)).await {
                            Ok(Err(e)) => warn!("Beacon on {} failed: {:#}", name, e),
                            Err(e) => error!("Beacon task on {} panicked: {}", name, e),
                            Ok(Ok(())) => (),
                        }
                    }
                    _ = &mut drop_rx => {
                        info!("Beacon scheduler on {} is stopping", name);
                        break;
                    }
                }
            }
        });

        Self { _drop_tx: drop_tx }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::config::NanConfig;
    use crate::nan_session::SendSettings;
    use crate::wdev_drv::{InterfaceIndex, MacAddr, MockGenlTransport, Nl80211Iftype};
    use crate::wifi_directory::Interface;

    fn session_with(mock: MockGenlTransport) -> Arc<NanSession<MockGenlTransport>> {
        let iface = Interface {
            index: InterfaceIndex(3),
            name: "wlan0".to_string(),
            mac: MacAddr([2, 0, 0, 0, 0, 1]),
            phy: 0,
            device: 1,
            iftype: Nl80211Iftype::IftypeStation,
            frequency: None,
        };
        Arc::new(NanSession::new(
            iface,
            Arc::new(mock),
            SendSettings::from(&NanConfig::default()),
        ))
    }

    fn session(sent: Arc<AtomicU32>) -> Arc<NanSession<MockGenlTransport>> {
        let mut mock = MockGenlTransport::new();
        mock.expect_send().returning(move |_, _| {
            Ok(sent.fetch_add(1, Ordering::SeqCst) + 1)
        });
        session_with(mock)
    }

    #[tokio::test]
    async fn test_beacons_until_dropped() {
        let sent = Arc::new(AtomicU32::new(0));
        let scheduler = BeaconScheduler::start(
            session(Arc::clone(&sent)),
            Duration::from_millis(120),
            true,
        );

        // Ticks at 0, 120 and 240 ms, each a beacon and a discovery frame
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(scheduler);
        let at_drop = sent.load(Ordering::SeqCst);
        assert!(at_drop >= 4, "sent {}", at_drop);
        assert_eq!(at_drop % 2, 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(sent.load(Ordering::SeqCst), at_drop);
    }

    #[tokio::test]
    async fn test_slow_send_does_not_stall_runtime() {
        let mut mock = MockGenlTransport::new();
        mock.expect_send().returning(|_, _| {
            std::thread::sleep(Duration::from_millis(150));
            Ok(1)
        });
        let scheduler = BeaconScheduler::start(session_with(mock), Duration::from_secs(1), true);

        // The first tick is immediate, its sends hold a thread for 300 ms
        tokio::task::yield_now().await;
        let t0 = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(t0.elapsed() < Duration::from_millis(150), "{:?}", t0.elapsed());

        drop(scheduler);
    }
}
