use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::PhaseTimeouts;
use crate::core::bluetooth::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DISCONNECT_TIMEOUT_SECS, DEFAULT_DISCOVERY_TIMEOUT_SECS,
    DEFAULT_SCAN_DURATION_MS, DEFAULT_WRITE_TIMEOUT_SECS, DEVICE_NAME_PREFIX,
};
use crate::core::bluetooth::MatchPolicy;
use crate::utils::ensure_directory_exists;

const CONFIG_FILE_NAME: &str = "bluetooth_config.json";

/// Bluetooth settings configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Which advertisements the scan accepts, and what a fruitless scan means.
    pub match_policy: MatchPolicy,
    /// Prefix of the advertised notifier name; the bus route number follows it.
    pub device_name_prefix: String,
    /// How long a scan may run before giving up.
    pub scan_timeout_ms: u64,
    pub connect_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub disconnect_timeout_secs: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        BleConfig {
            match_policy: MatchPolicy::ServiceAndName,
            device_name_prefix: DEVICE_NAME_PREFIX.to_string(),
            scan_timeout_ms: DEFAULT_SCAN_DURATION_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            disconnect_timeout_secs: DEFAULT_DISCONNECT_TIMEOUT_SECS,
        }
    }
}

impl BleConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn phase_timeouts(&self) -> PhaseTimeouts {
        PhaseTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            discovery: Duration::from_secs(self.discovery_timeout_secs),
            write: Duration::from_secs(self.write_timeout_secs),
            disconnect: Duration::from_secs(self.disconnect_timeout_secs),
        }
    }

    pub fn file_path(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE_NAME)
    }

    /// Loads the config from a configuration file.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = Self::file_path(config_dir);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !fs::try_exists(&file_path).await? {
            warn!("Bluetooth config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Bluetooth config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;

        let file_path = Self::file_path(config_dir);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize bluetooth config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Bluetooth config saved to {:?}", file_path_str);
        Ok(())
    }
}
