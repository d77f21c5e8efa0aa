pub mod bluetooth_config;
pub mod settings;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use log::warn;
use tokio::fs;

use crate::config::bluetooth_config::BleConfig;
use crate::config::settings::SettingsStore;

const APP_DIR_NAME: &str = "comfy-move";

pub struct AppConfig {
    pub bluetooth: BleConfig,
    pub settings: SettingsStore,
}

impl AppConfig {
    /// Loads every config file under `config_dir`.
    ///
    /// A missing bluetooth config is written out with its defaults so it can be edited.
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let first_run = !fs::try_exists(BleConfig::file_path(config_dir)).await?;
        let bluetooth = BleConfig::load_config(config_dir).await?;
        if first_run {
            if let Err(e) = bluetooth.save_config(config_dir).await {
                warn!("Could not write default bluetooth config: {}", e);
            }
        }

        Ok(AppConfig {
            bluetooth,
            settings: SettingsStore::load(config_dir).await?,
        })
    }
}

/// `<platform config dir>/comfy-move`
pub fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| anyhow!("Could not determine config directory"))
}
