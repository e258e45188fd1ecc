//! Wi-Fi Aware (NAN) over stock Linux radios.
//!
//! Frames are sent through nl80211 management frame transmission and peer
//! frames are read from monitor interfaces. The `nan-link` binary wires these
//! modules into a daemon.

pub mod config;
pub mod error;
pub mod monitor_capture;
pub mod nan_events;
pub mod nan_frame;
pub mod nan_session;
pub mod wdev_drv;
pub mod wifi_directory;
