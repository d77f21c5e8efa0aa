//! Application state management
//! This module wires the configuration, the Bluetooth stack and the manager together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::config::AppConfig;
use crate::core::bluetooth::{BluestTransport, BluetoothManager};
use crate::core::permissions::HostPermissions;

pub type NotifierManager = BluetoothManager<BluestTransport, HostPermissions>;

/// Global application state
pub struct AppState {
    /// The Bluetooth manager instance
    pub bluetooth_manager: NotifierManager,
    pub config_dir: PathBuf,
}

impl AppState {
    /// Loads the config under `config_dir` and opens the default Bluetooth adapter.
    pub async fn new(config_dir: &Path) -> Result<Self> {
        let config = AppConfig::load(config_dir).await?;

        info!("Initializing BluetoothManager...");
        let transport = BluestTransport::new().await?;
        let manager = BluetoothManager::new(
            Arc::new(transport),
            HostPermissions,
            Arc::new(config.settings),
            config.bluetooth,
        );

        Ok(Self {
            bluetooth_manager: manager,
            config_dir: config_dir.to_path_buf(),
        })
    }

    /// Gets a handle to the Bluetooth manager
    pub fn bluetooth_manager(&self) -> NotifierManager {
        self.bluetooth_manager.clone()
    }
}
