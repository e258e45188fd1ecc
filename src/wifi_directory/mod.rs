//! This module keeps track of the radios and virtual interfaces nl80211
//! reports.
//!
//! The main components are:
//! - `Radio` and `Interface`: snapshots built from enumeration dumps.
//! - `Partition`: interfaces split into active ones and monitors grouped by
//!   their radio, recomputed on every `list_interfaces`.
//! - `Directory`: the operations, all going through a `GenlTransport`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context};
use log::{debug, error, info, trace, warn};

use crate::error::{NanError, Result};
use crate::nan_session::roc::RocTracker;
use crate::wdev_drv::{
    GenlTransport, InterfaceIndex, MacAddr, Nl80211Attr, Nl80211Command,
    Nl80211Iftype, StaInfoAttr,
};

/// A physical radio.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Radio {
    pub id: u32,
    pub name: String,
    pub supported_iftypes: Vec<Nl80211Iftype>,
    pub band_count: usize,
    /// Frames may be sent on another channel than the operating one.
    pub offchannel_tx: bool,
}

impl Radio {
    pub fn supports_monitor(&self) -> bool {
        self.supported_iftypes.contains(&Nl80211Iftype::IftypeMonitor)
    }

    fn merge(&mut self, attrs: &[Nl80211Attr]) {
        for attr in attrs {
            match attr {
                Nl80211Attr::Wiphy(id) => self.id = *id,
                Nl80211Attr::WiphyName(name) => self.name = name.clone(),
                Nl80211Attr::SupportedIftypes(types) => {
                    self.supported_iftypes = types.clone()
                }
                Nl80211Attr::WiphyBands(count) => self.band_count += count,
                Nl80211Attr::OffchannelTxOk => self.offchannel_tx = true,
                other => trace!("Ignoring wiphy attribute {:?}", other.kind()),
            }
        }
    }
}

/// A virtual interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub index: InterfaceIndex,
    pub name: String,
    pub mac: MacAddr,
    /// Owning radio.
    pub phy: u32,
    /// Wireless device id.
    pub device: u64,
    pub iftype: Nl80211Iftype,
    /// Operating frequency in MHz, when the interface is on a channel.
    pub frequency: Option<u32>,
}

impl Interface {
    /// Builds an interface from an nl80211 interface message.
    ///
    /// Returns `None` for wireless devices without a netdev (no ifindex),
    /// those cannot be addressed by index.
    pub fn from_attrs(attrs: &[Nl80211Attr]) -> Option<Self> {
        let mut index = None;
        let mut iface = Interface {
            index: InterfaceIndex::default(),
            name: String::new(),
            mac: MacAddr::default(),
            phy: 0,
            device: 0,
            iftype: Nl80211Iftype::IftypeUnspecified,
            frequency: None,
        };

        for attr in attrs {
            match attr {
                Nl80211Attr::Ifindex(idx) => index = Some(InterfaceIndex(*idx)),
                Nl80211Attr::Ifname(name) => iface.name = name.clone(),
                Nl80211Attr::Mac(mac) => iface.mac = *mac,
                Nl80211Attr::Wiphy(phy) => iface.phy = *phy,
                Nl80211Attr::Wdev(wdev) => iface.device = *wdev,
                Nl80211Attr::Iftype(iftype) => iface.iftype = *iftype,
                Nl80211Attr::WiphyFreq(freq) => iface.frequency = Some(*freq),
                other => trace!("Ignoring interface attribute {:?}", other.kind()),
            }
        }

        iface.index = index?;
        Some(iface)
    }

    pub fn is_monitor(&self) -> bool {
        self.iftype == Nl80211Iftype::IftypeMonitor
    }
}

/// Interfaces split by role.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub active: Vec<Interface>,
    /// Monitor interfaces keyed by the radio they belong to.
    pub monitors: BTreeMap<u32, Vec<Interface>>,
}

impl Partition {
    pub fn from_interfaces(interfaces: &[Interface]) -> Self {
        let mut partition = Partition::default();
        for iface in interfaces {
            if iface.is_monitor() {
                partition
                    .monitors
                    .entry(iface.phy)
                    .or_default()
                    .push(iface.clone());
            } else {
                partition.active.push(iface.clone());
            }
        }
        partition
    }
}

/// Counters of one peer station.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Station {
    pub mac: MacAddr,
    pub inactive_ms: Option<u32>,
    pub connected_secs: Option<u32>,
    pub rx_bytes: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub rx_packets: Option<u32>,
    pub tx_packets: Option<u32>,
    pub tx_retries: Option<u32>,
    pub tx_failed: Option<u32>,
    pub signal_dbm: Option<i8>,
}

impl Station {
    fn from_attrs(attrs: &[Nl80211Attr]) -> Self {
        let mut station = Station::default();
        for attr in attrs {
            match attr {
                Nl80211Attr::Mac(mac) => station.mac = *mac,
                Nl80211Attr::StaInfo(info) => {
                    for item in info {
                        match item {
                            StaInfoAttr::InactiveTimeMs(v) => {
                                station.inactive_ms = Some(*v)
                            }
                            StaInfoAttr::ConnectedTimeSecs(v) => {
                                station.connected_secs = Some(*v)
                            }
                            StaInfoAttr::RxBytes(v) => station.rx_bytes = Some(*v),
                            StaInfoAttr::TxBytes(v) => station.tx_bytes = Some(*v),
                            StaInfoAttr::RxPackets(v) => {
                                station.rx_packets = Some(*v)
                            }
                            StaInfoAttr::TxPackets(v) => {
                                station.tx_packets = Some(*v)
                            }
                            StaInfoAttr::TxRetries(v) => {
                                station.tx_retries = Some(*v)
                            }
                            StaInfoAttr::TxFailed(v) => station.tx_failed = Some(*v),
                            StaInfoAttr::SignalDbm(v) => {
                                station.signal_dbm = Some(*v)
                            }
                            StaInfoAttr::BeaconLoss(_) | StaInfoAttr::Unknown(..) => {}
                        }
                    }
                }
                _ => {}
            }
        }
        station
    }
}

/// Name of the monitor interface created on `phy`: the trailing digits of
/// `base` are replaced by the radio id, so "nanmon0" becomes "nanmon1" on
/// phy 1.
pub fn monitor_name_for(base: &str, phy: u32) -> String {
    format!("{}{}", base.trim_end_matches(|c: char| c.is_ascii_digit()), phy)
}

/// Radio and interface directory.
pub struct Directory<T: GenlTransport> {
    transport: Arc<T>,
    partition: Mutex<Partition>,
}

impl<T: GenlTransport> Directory<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            partition: Mutex::new(Partition::default()),
        }
    }

    pub fn transport(&self) -> Arc<T> {
        Arc::clone(&self.transport)
    }

    /// Dumps the radios, ordered by id.
    ///
    /// The kernel may split one radio over several messages; they are merged
    /// by radio id.
    pub fn list_radios(&self) -> Result<Vec<Radio>> {
        let replies = self.transport.execute(
            Nl80211Command::GetWiPhy,
            vec![Nl80211Attr::SplitWiphyDump],
            true,
            Nl80211Command::NewWiPhy,
        )?;

        let mut radios: BTreeMap<u32, Radio> = BTreeMap::new();
        for attrs in replies {
            let Some(id) = attrs.iter().find_map(|attr| match attr {
                Nl80211Attr::Wiphy(id) => Some(*id),
                _ => None,
            }) else {
                debug!("Skipping wiphy message without an id");
                continue;
            };

            radios.entry(id).or_default().merge(&attrs);
        }

        Ok(radios.into_values().collect())
    }

    /// Dumps the interfaces, ordered by index, and recomputes the partition.
    pub fn list_interfaces(&self) -> Result<Vec<Interface>> {
        let replies = self.transport.execute(
            Nl80211Command::GetInterface,
            vec![],
            true,
            Nl80211Command::NewInterface,
        )?;

        let mut interfaces: Vec<Interface> = replies
            .iter()
            .filter_map(|attrs| {
                let iface = Interface::from_attrs(attrs);
                if iface.is_none() {
                    debug!("Skipping wireless device without a netdev");
                }
                iface
            })
            .collect();
        interfaces.sort_by_key(|iface| iface.index);

        let partition = Partition::from_interfaces(&interfaces);
        *self
            .partition
            .lock()
            .map_err(|e| anyhow!("partition lock poisoned: {}", e))? = partition;

        Ok(interfaces)
    }

    /// The partition computed by the last `list_interfaces`.
    pub fn partition(&self) -> Result<Partition> {
        Ok(self
            .partition
            .lock()
            .map_err(|e| anyhow!("partition lock poisoned: {}", e))?
            .clone())
    }

    /// Looks an interface up in the last enumeration.
    pub fn interface(&self, index: InterfaceIndex) -> Result<Interface> {
        let partition = self.partition()?;
        partition
            .active
            .iter()
            .chain(partition.monitors.values().flatten())
            .find(|iface| iface.index == index)
            .cloned()
            .ok_or_else(|| NanError::UnknownInterface(index.into()).into())
    }

    /// Creates a monitor interface named `name` on radio `phy`.
    ///
    /// Needs CAP_NET_ADMIN. Creating an existing name is not masked: the
    /// kernel answer is returned as is.
    pub fn create_monitor_interface(&self, phy: u32, name: &str) -> Result<Interface> {
        info!("Creating monitor interface {} on phy {}", name, phy);

        let replies = self
            .transport
            .execute(
                Nl80211Command::NewInterface,
                vec![
                    Nl80211Attr::Ifname(name.to_string()),
                    Nl80211Attr::Wiphy(phy),
                    Nl80211Attr::Iftype(Nl80211Iftype::IftypeMonitor),
                ],
                false,
                Nl80211Command::NewInterface,
            )
            .with_context(|| NanError::CreateFailed {
                name: name.to_string(),
                phy,
            })?;

        replies
            .iter()
            .find_map(|attrs| Interface::from_attrs(attrs))
            .ok_or_else(|| {
                anyhow!("no interface in the reply").context(NanError::CreateFailed {
                    name: name.to_string(),
                    phy,
                })
            })
    }

    pub fn delete_interface(&self, index: InterfaceIndex) -> Result<()> {
        info!("Deleting interface {}", index);
        self.transport.execute(
            Nl80211Command::DelInterface,
            vec![Nl80211Attr::Ifindex(index.into())],
            false,
            Nl80211Command::DelInterface,
        )?;
        Ok(())
    }

    pub fn set_link_up(&self, index: InterfaceIndex) -> Result<()> {
        self.transport.set_link_up(index)
    }

    /// Asks the kernel to deliver the management frames of type
    /// `frame_type` starting with `match_prefix` to the event socket.
    ///
    /// If another process registered an overlapping match on the same radio
    /// the kernel may refuse or silently not deliver; nothing here can tell.
    pub fn register_frame_notifications(
        &self, iface: &Interface, frame_type: u16, match_prefix: &[u8],
    ) -> Result<()> {
        info!(
            "Registering for frames of type {:#06x} matching {} on {}",
            frame_type,
            hex::encode(match_prefix),
            iface.name
        );
        self.transport.subscribe(
            Nl80211Command::RegisterFrame,
            vec![
                Nl80211Attr::Ifindex(iface.index.into()),
                Nl80211Attr::Wdev(iface.device),
                Nl80211Attr::FrameType(frame_type),
                Nl80211Attr::FrameMatch(match_prefix.to_vec()),
            ],
        )?;
        Ok(())
    }

    /// Dumps the stations known to `iface`.
    pub fn station_info(&self, iface: &Interface) -> Result<Vec<Station>> {
        let replies = self.transport.execute(
            Nl80211Command::GetStation,
            vec![Nl80211Attr::Ifindex(iface.index.into())],
            true,
            Nl80211Command::NewStation,
        )?;

        Ok(replies.iter().map(|attrs| Station::from_attrs(attrs)).collect())
    }

    /// Asks the radio of `iface` to stay on `frequency` for `duration_ms`.
    /// Returns the cookie the kernel uses in the matching events.
    ///
    /// The request is recorded in `roc` before it is sent, so the start and
    /// cancel events can be matched to it.
    pub fn remain_on_channel(
        &self, iface: &Interface, frequency: u32, duration_ms: u32,
        roc: &RocTracker,
    ) -> Result<Option<u64>> {
        debug!(
            "Remain on channel {} MHz for {} ms on {}",
            frequency, duration_ms, iface.name
        );
        roc.requested(frequency, Duration::from_millis(duration_ms as u64));

        let replies = self
            .transport
            .execute(
                Nl80211Command::RemainOnChannel,
                vec![
                    Nl80211Attr::Ifindex(iface.index.into()),
                    Nl80211Attr::Wdev(iface.device),
                    Nl80211Attr::WiphyFreq(frequency),
                    Nl80211Attr::Duration(duration_ms),
                    Nl80211Attr::DontWaitForAck,
                ],
                false,
                Nl80211Command::RemainOnChannel,
            )
            .map_err(|e| {
                roc.rejected();
                e
            })?;

        let cookie = replies.iter().flatten().find_map(|attr| match attr {
            Nl80211Attr::Cookie(cookie) => Some(*cookie),
            _ => None,
        });
        roc.accepted(cookie);
        Ok(cookie)
    }

    /// Makes sure every monitor capable radio has a monitor interface that is
    /// up. Failures are logged per radio. Returns the new partition.
    pub fn ensure_monitors(&self, base_name: &str) -> Result<Partition> {
        let radios = self.list_radios()?;
        self.list_interfaces()?;
        let partition = self.partition()?;

        for radio in radios {
            if let Some(monitors) = partition.monitors.get(&radio.id) {
                for monitor in monitors {
                    if let Err(e) = self.set_link_up(monitor.index) {
                        warn!("Failed to bring {} up: {:#}", monitor.name, e);
                    }
                }
                continue;
            }

            if !radio.supports_monitor() {
                debug!("Radio {} has no monitor support", radio.name);
                continue;
            }

            let name = monitor_name_for(base_name, radio.id);
            match self.create_monitor_interface(radio.id, &name) {
                Ok(iface) => {
                    if let Err(e) = self.set_link_up(iface.index) {
                        error!("Failed to bring {} up: {:#}", iface.name, e);
                    }
                }
                Err(e) => error!("{:#}", e),
            }
        }

        self.list_interfaces()?;
        self.partition()
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::{always, eq};

    use super::*;
    use crate::wdev_drv::MockGenlTransport;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn iface_attrs(
        index: u32, name: &str, phy: u32, iftype: Nl80211Iftype,
    ) -> Vec<Nl80211Attr> {
        vec![
            Nl80211Attr::Ifindex(index),
            Nl80211Attr::Ifname(name.to_string()),
            Nl80211Attr::Wiphy(phy),
            Nl80211Attr::Iftype(iftype),
            Nl80211Attr::Wdev((phy as u64) << 32 | index as u64),
            Nl80211Attr::Mac(MacAddr([2, 0, 0, 0, phy as u8, index as u8])),
            Nl80211Attr::Generation(7),
        ]
    }

    fn expect_interface_dump(mock: &mut MockGenlTransport, dump: Vec<Vec<Nl80211Attr>>) {
        mock.expect_execute()
            .with(
                eq(Nl80211Command::GetInterface),
                always(),
                eq(true),
                eq(Nl80211Command::NewInterface),
            )
            .returning(move |_, _, _, _| Ok(dump.clone()));
    }

    #[test]
    fn test_partition_two_active_one_monitor() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        expect_interface_dump(
            &mut mock,
            vec![
                iface_attrs(5, "nanmon1", 1, Nl80211Iftype::IftypeMonitor),
                iface_attrs(3, "wlan0", 0, Nl80211Iftype::IftypeStation),
                iface_attrs(4, "wlan1", 1, Nl80211Iftype::IftypeAp),
            ],
        );

        let directory = Directory::new(Arc::new(mock));
        let interfaces = directory.list_interfaces()?;
        let partition = directory.partition()?;

        assert_eq!(interfaces.len(), 3);
        assert_eq!(interfaces[0].index, InterfaceIndex(3));
        assert_eq!(
            partition
                .active
                .iter()
                .map(|iface| iface.name.as_str())
                .collect::<Vec<_>>(),
            vec!["wlan0", "wlan1"]
        );
        assert_eq!(partition.monitors.len(), 1);
        assert_eq!(partition.monitors[&1].len(), 1);
        assert_eq!(partition.monitors[&1][0].index, InterfaceIndex(5));
        Ok(())
    }

    #[test]
    fn test_partition_is_recomputed() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        let mut calls = 0;
        mock.expect_execute().times(2).returning(move |_, _, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(vec![iface_attrs(5, "nanmon0", 0, Nl80211Iftype::IftypeMonitor)])
            } else {
                Ok(vec![iface_attrs(3, "wlan0", 0, Nl80211Iftype::IftypeStation)])
            }
        });

        let directory = Directory::new(Arc::new(mock));
        directory.list_interfaces()?;
        assert_eq!(directory.partition()?.monitors.len(), 1);

        directory.list_interfaces()?;
        let partition = directory.partition()?;
        assert!(partition.monitors.is_empty());
        assert_eq!(partition.active.len(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_interface() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        expect_interface_dump(
            &mut mock,
            vec![iface_attrs(3, "wlan0", 0, Nl80211Iftype::IftypeStation)],
        );

        let directory = Directory::new(Arc::new(mock));
        directory.list_interfaces()?;

        assert_eq!(directory.interface(InterfaceIndex(3))?.name, "wlan0");
        let err = directory.interface(InterfaceIndex(9)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<NanError>(),
            Some(&NanError::UnknownInterface(9))
        );
        Ok(())
    }

    #[test]
    fn test_list_radios_merges_split_messages() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute()
            .with(
                eq(Nl80211Command::GetWiPhy),
                eq(vec![Nl80211Attr::SplitWiphyDump]),
                eq(true),
                eq(Nl80211Command::NewWiPhy),
            )
            .returning(|_, _, _, _| {
                Ok(vec![
                    vec![
                        Nl80211Attr::Wiphy(1),
                        Nl80211Attr::WiphyName("phy1".to_string()),
                    ],
                    vec![Nl80211Attr::Wiphy(1), Nl80211Attr::WiphyBands(2)],
                    vec![
                        Nl80211Attr::Wiphy(1),
                        Nl80211Attr::SupportedIftypes(vec![
                            Nl80211Iftype::IftypeStation,
                            Nl80211Iftype::IftypeMonitor,
                        ]),
                        Nl80211Attr::OffchannelTxOk,
                        Nl80211Attr::Unknown(300, vec![1]),
                    ],
                    vec![
                        Nl80211Attr::Wiphy(0),
                        Nl80211Attr::WiphyName("phy0".to_string()),
                    ],
                ])
            });

        let directory = Directory::new(Arc::new(mock));
        let radios = directory.list_radios()?;

        assert_eq!(radios.len(), 2);
        assert_eq!(radios[0].name, "phy0");
        assert!(!radios[0].supports_monitor());
        assert_eq!(radios[1].name, "phy1");
        assert_eq!(radios[1].band_count, 2);
        assert!(radios[1].supports_monitor());
        assert!(radios[1].offchannel_tx);
        Ok(())
    }

    #[test]
    fn test_create_monitor_failure() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute()
            .with(
                eq(Nl80211Command::NewInterface),
                eq(vec![
                    Nl80211Attr::Ifname("nanmon0".to_string()),
                    Nl80211Attr::Wiphy(0),
                    Nl80211Attr::Iftype(Nl80211Iftype::IftypeMonitor),
                ]),
                eq(false),
                always(),
            )
            .returning(|_, _, _, _| {
                Err(NanError::Kernel {
                    code: libc::EPERM,
                    name: "EPERM",
                    cmd: "NewInterface".to_string(),
                }
                .into())
            });

        let directory = Directory::new(Arc::new(mock));
        let err = directory.create_monitor_interface(0, "nanmon0").unwrap_err();

        assert_eq!(
            err.downcast_ref::<NanError>(),
            Some(&NanError::CreateFailed {
                name: "nanmon0".to_string(),
                phy: 0
            })
        );
        Ok(())
    }

    #[test]
    fn test_register_frame_notifications() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_subscribe()
            .with(
                eq(Nl80211Command::RegisterFrame),
                eq(vec![
                    Nl80211Attr::Ifindex(3),
                    Nl80211Attr::Wdev(3),
                    Nl80211Attr::FrameType(0x00D0),
                    Nl80211Attr::FrameMatch(vec![0x04, 0x09]),
                ]),
            )
            .times(1)
            .returning(|_, _| Ok(12));

        let directory = Directory::new(Arc::new(mock));
        let iface = Interface::from_attrs(&iface_attrs(
            3,
            "wlan0",
            0,
            Nl80211Iftype::IftypeStation,
        ))
        .unwrap();

        directory.register_frame_notifications(&iface, 0x00D0, &[0x04, 0x09])?;
        Ok(())
    }

    #[test]
    fn test_station_info() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute()
            .with(
                eq(Nl80211Command::GetStation),
                eq(vec![Nl80211Attr::Ifindex(3)]),
                eq(true),
                eq(Nl80211Command::NewStation),
            )
            .returning(|_, _, _, _| {
                Ok(vec![vec![
                    Nl80211Attr::Mac(MacAddr([1, 2, 3, 4, 5, 6])),
                    Nl80211Attr::StaInfo(vec![
                        StaInfoAttr::InactiveTimeMs(40),
                        StaInfoAttr::RxBytes(1024),
                        StaInfoAttr::SignalDbm(-55),
                    ]),
                ]])
            });

        let directory = Directory::new(Arc::new(mock));
        let iface = Interface::from_attrs(&iface_attrs(
            3,
            "wlan0",
            0,
            Nl80211Iftype::IftypeStation,
        ))
        .unwrap();
        let stations = directory.station_info(&iface)?;

        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].mac, MacAddr([1, 2, 3, 4, 5, 6]));
        assert_eq!(stations[0].inactive_ms, Some(40));
        assert_eq!(stations[0].rx_bytes, Some(1024));
        assert_eq!(stations[0].signal_dbm, Some(-55));
        assert_eq!(stations[0].tx_bytes, None);
        Ok(())
    }

    #[test]
    fn test_remain_on_channel_returns_cookie() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute()
            .withf(|cmd, attrs, dump, reply| {
                *cmd == Nl80211Command::RemainOnChannel
                    && !*dump
                    && *reply == Nl80211Command::RemainOnChannel
                    && attrs.contains(&Nl80211Attr::WiphyFreq(2437))
                    && attrs.contains(&Nl80211Attr::Duration(50))
                    && attrs.contains(&Nl80211Attr::DontWaitForAck)
            })
            .returning(|_, _, _, _| Ok(vec![vec![Nl80211Attr::Cookie(77)]]));

        let directory = Directory::new(Arc::new(mock));
        let iface = Interface::from_attrs(&iface_attrs(
            3,
            "wlan0",
            0,
            Nl80211Iftype::IftypeStation,
        ))
        .unwrap();
        let roc = RocTracker::new();

        assert_eq!(directory.remain_on_channel(&iface, 2437, 50, &roc)?, Some(77));

        let pending = roc.pending().unwrap();
        assert_eq!(pending.frequency, 2437);
        assert_eq!(pending.duration, Duration::from_millis(50));
        assert_eq!(pending.cookie, Some(77));
        assert!(pending.started.is_none());
        Ok(())
    }

    #[test]
    fn test_remain_on_channel_failure_clears_record() {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute().returning(|_, _, _, _| {
            Err(NanError::Kernel {
                code: libc::EBUSY,
                name: "EBUSY",
                cmd: "RemainOnChannel".to_string(),
            }
            .into())
        });

        let directory = Directory::new(Arc::new(mock));
        let iface = Interface::from_attrs(&iface_attrs(
            3,
            "wlan0",
            0,
            Nl80211Iftype::IftypeStation,
        ))
        .unwrap();
        let roc = RocTracker::new();

        assert!(directory.remain_on_channel(&iface, 2437, 50, &roc).is_err());
        assert!(roc.pending().is_none());
    }

    #[test]
    fn test_ensure_monitors_creates_missing() -> Result<()> {
        init_logger();
        let mut mock = MockGenlTransport::new();
        mock.expect_execute()
            .with(eq(Nl80211Command::GetWiPhy), always(), always(), always())
            .returning(|_, _, _, _| {
                Ok(vec![
                    vec![
                        Nl80211Attr::Wiphy(0),
                        Nl80211Attr::SupportedIftypes(vec![
                            Nl80211Iftype::IftypeMonitor,
                        ]),
                    ],
                    vec![
                        Nl80211Attr::Wiphy(1),
                        Nl80211Attr::SupportedIftypes(vec![
                            Nl80211Iftype::IftypeMonitor,
                        ]),
                    ],
                ])
            });

        let mut dumps = 0;
        mock.expect_execute()
            .with(eq(Nl80211Command::GetInterface), always(), always(), always())
            .times(2)
            .returning(move |_, _, _, _| {
                dumps += 1;
                let mut dump = vec![
                    iface_attrs(3, "wlan0", 0, Nl80211Iftype::IftypeStation),
                    iface_attrs(4, "nanmon0", 0, Nl80211Iftype::IftypeMonitor),
                ];
                if dumps == 2 {
                    dump.push(iface_attrs(6, "nanmon1", 1, Nl80211Iftype::IftypeMonitor));
                }
                Ok(dump)
            });

        mock.expect_execute()
            .with(
                eq(Nl80211Command::NewInterface),
                always(),
                eq(false),
                always(),
            )
            .times(1)
            .returning(|_, attrs, _, _| {
                assert!(attrs.contains(&Nl80211Attr::Ifname("nanmon1".to_string())));
                Ok(vec![iface_attrs(6, "nanmon1", 1, Nl80211Iftype::IftypeMonitor)])
            });

        mock.expect_set_link_up()
            .with(eq(InterfaceIndex(4)))
            .times(1)
            .returning(|_| Ok(()));
        mock.expect_set_link_up()
            .with(eq(InterfaceIndex(6)))
            .times(1)
            .returning(|_| Ok(()));

        let directory = Directory::new(Arc::new(mock));
        let partition = directory.ensure_monitors("nanmon0")?;

        assert_eq!(partition.monitors.len(), 2);
        assert_eq!(partition.monitors[&1][0].name, "nanmon1");
        assert_eq!(partition.active.len(), 1);
        Ok(())
    }

    #[test]
    fn test_monitor_name_for() {
        assert_eq!(monitor_name_for("nanmon0", 0), "nanmon0");
        assert_eq!(monitor_name_for("nanmon0", 2), "nanmon2");
        assert_eq!(monitor_name_for("mon", 1), "mon1");
    }
}
