//! Runtime settings. Every field has a compiled-in default; a JSON file in
//! the user config directory may override some of them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILE: &str = "nan-link.json";

/// Follow-up dwell time override, in milliseconds.
pub const STAY_ENV: &str = "NAN_STAY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NanConfig {
    /// Channel 6.
    pub frequency_mhz: u32,
    pub beacon_dwell_ms: u32,
    pub discovery_dwell_ms: u32,
    pub followup_dwell_ms: u32,
    /// 512 TU.
    pub beacon_period_us: u64,
    pub monitor_name: String,
    pub event_deadline_secs: u64,
    pub event_queue_len: usize,
}

impl Default for NanConfig {
    fn default() -> Self {
        Self {
            frequency_mhz: 2437,
            beacon_dwell_ms: 20,
            discovery_dwell_ms: 20,
            followup_dwell_ms: 30,
            beacon_period_us: 512 * 1024,
            monitor_name: "nanmon0".to_string(),
            event_deadline_secs: 5,
            event_queue_len: 256,
        }
    }
}

impl NanConfig {
    /// Reads the config file if there is one, then applies the environment.
    pub async fn load() -> Result<Self> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_json(&content)?
            }
            _ => Self::default(),
        };

        config.apply_stay(std::env::var(STAY_ENV).ok().as_deref());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| anyhow!("invalid configuration: {}", e))
    }

    fn apply_stay(&mut self, stay: Option<&str>) {
        let Some(stay) = stay else {
            return;
        };
        match stay.trim().parse() {
            Ok(ms) => self.followup_dwell_ms = ms,
            Err(_) => warn!("Ignoring {}={}, not a number", STAY_ENV, stay),
        }
    }

    pub fn beacon_period(&self) -> Duration {
        Duration::from_micros(self.beacon_period_us)
    }

    pub fn event_deadline(&self) -> Duration {
        Duration::from_secs(self.event_deadline_secs)
    }
}

fn config_file_path() -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("org", "nan-link", "nan-link")?;
    Some(proj_dirs.config_dir().join(CONFIG_FILE))
}
