use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use nan_link::config::NanConfig;
use nan_link::error::Result;
use nan_link::monitor_capture::raw_socket::RawCapture;
use nan_link::monitor_capture::sightings::BeaconSightings;
use nan_link::monitor_capture::MonitorPipeline;
use nan_link::nan_events::{NanEvent, NanEventSink};
use nan_link::nan_frame::NAN_ACTION_PREFIX;
use nan_link::nan_session::scheduler::BeaconScheduler;
use nan_link::nan_session::{SendSettings, SessionRegistry};
use nan_link::wdev_drv::nl80211_drv::nl80211_const::FRAME_TYPE_ACTION;
use nan_link::wdev_drv::Nl80211Transport;
use nan_link::wifi_directory::{Directory, Interface, Partition};

type Registry = SessionRegistry<Nl80211Transport>;

/// Asks for NAN action frames on every active interface. Runs before the
/// event loop, the subscription waits for its acks on the event socket.
fn register_frames(directory: &Directory<Nl80211Transport>, partition: &Partition) {
    for iface in &partition.active {
        if let Err(e) = directory.register_frame_notifications(
            iface,
            FRAME_TYPE_ACTION,
            &NAN_ACTION_PREFIX,
        ) {
            warn!("No NAN frame notifications on {}: {:#}", iface.name, e);
        }
    }
}

/// Opens a session and starts beaconing on every active interface.
fn start_sessions(
    registry: &Registry, partition: &Partition, config: &NanConfig,
) -> Vec<BeaconScheduler> {
    let mut schedulers = Vec::new();

    for iface in &partition.active {
        match registry.session(iface.index) {
            Ok(session) => schedulers.push(BeaconScheduler::start(
                session,
                config.beacon_period(),
                true,
            )),
            Err(e) => error!("No NAN session on {}: {:#}", iface.name, e),
        }
    }

    schedulers
}

/// Starts one capture thread per monitor interface.
fn start_captures(
    partition: &Partition, own: &[Interface], sink: Arc<dyn NanEventSink>,
) {
    let own_macs: Vec<_> = own.iter().map(|iface| iface.mac).collect();
    let sightings = Arc::new(BeaconSightings::new());

    for (phy, monitors) in &partition.monitors {
        for monitor in monitors {
            let capture = match RawCapture::open(&monitor.name) {
                Ok(capture) => capture,
                Err(e) => {
                    error!("Can't capture on {}: {:#}", monitor.name, e);
                    continue;
                }
            };

            let pipeline = MonitorPipeline::new(
                *phy,
                own_macs.clone(),
                Arc::clone(&sightings),
                Arc::clone(&sink),
            );

            let spawned = thread::Builder::new()
                .name(format!("capture-{}", monitor.name))
                .spawn(move || {
                    if let Err(e) = pipeline.run(&capture) {
                        error!("Capture on {} stopped: {:#}", capture.ifname(), e);
                    }
                });
            if let Err(e) = spawned {
                error!("Failed to spawn capture thread: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    info!("Starting nan-link");

    let config = NanConfig::load().await?;
    debug!("{:?}", config);

    let transport = Arc::new(Nl80211Transport::connect(config.event_deadline())?);
    let directory = Arc::new(Directory::new(Arc::clone(&transport)));

    let partition = directory.ensure_monitors(&config.monitor_name)?;
    let interfaces = directory.list_interfaces()?;
    info!(
        "{} active interfaces, monitors on {} radios",
        partition.active.len(),
        partition.monitors.len()
    );

    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&directory),
        SendSettings::from(&config),
    ));

    let (event_tx, mut event_rx) = mpsc::channel::<NanEvent>(config.event_queue_len);
    let consumer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                NanEvent::PeerIeObserved {
                    mac,
                    ie_id,
                    bytes,
                    radio,
                    ..
                } => info!(
                    "Attribute {:#04x} from {} on radio {}: {}",
                    ie_id,
                    mac,
                    radio,
                    hex::encode(bytes)
                ),
                NanEvent::BeaconSighted { mac, .. } => {
                    info!("New NAN device {}", mac)
                }
            }
        }
    });

    register_frames(&directory, &partition);
    start_captures(&partition, &interfaces, Arc::new(event_tx));

    let running = Arc::new(AtomicBool::new(true));
    let event_loop = {
        let running = Arc::clone(&running);
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || {
            transport.receive_events(&running, &mut |event| registry.handle_event(&event))
        })
    };

    let schedulers = start_sessions(&registry, &partition, &config);

    info!("Service ready. Press enter to quit.");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let _ = lines.next_line().await;

    drop(schedulers);
    running.store(false, Ordering::Relaxed);
    match event_loop.await {
        Ok(Err(e)) => error!("Event loop failed: {:#}", e),
        Err(e) => error!("Event loop panicked: {}", e),
        Ok(Ok(())) => (),
    }
    consumer.abort();

    info!("nan-link stopped");

    Ok(())
}
