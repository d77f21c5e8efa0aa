use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{watch, Mutex};

use crate::utils::ensure_directory_exists;

const SETTINGS_FILE_NAME: &str = "settings.json";

/// User preferences persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whether the notifier should chime when the request arrives.
    pub sound_on: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings { sound_on: true }
    }
}

/// Owns the persisted settings and publishes the sound preference.
pub struct SettingsStore {
    file_path: PathBuf,
    settings: Mutex<Settings>,
    sound_on: watch::Sender<bool>,
}

impl SettingsStore {
    /// Loads the settings file under `config_dir`, falling back to defaults.
    pub async fn load(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(SETTINGS_FILE_NAME);
        let settings = if fs::try_exists(&file_path).await? {
            let settings_json = fs::read_to_string(&file_path).await?;
            let settings: Settings = serde_json::from_str(&settings_json)?;
            info!("Settings loaded from {:?}", file_path);
            settings
        } else {
            warn!("Settings file not found at {:?}, using default.", file_path);
            Settings::default()
        };
        Ok(Self::with_settings(file_path, settings))
    }

    fn with_settings(file_path: PathBuf, settings: Settings) -> Self {
        let (sound_on, _) = watch::channel(settings.sound_on);
        Self {
            file_path,
            settings: Mutex::new(settings),
            sound_on,
        }
    }

    /// The sound preference as a stream of values; always holds the latest one.
    pub fn sound_on(&self) -> watch::Receiver<bool> {
        self.sound_on.subscribe()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    /// Updates and persists the sound preference.
    pub async fn set_sound_on(&self, enabled: bool) -> Result<()> {
        let mut settings = self.settings.lock().await;
        settings.sound_on = enabled;
        self.sound_on.send_replace(enabled);
        info!("Sound preference set to {}", enabled);
        self.save(&settings).await
    }

    async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.file_path.parent() {
            ensure_directory_exists(dir).await?;
        }

        let settings_json = match serde_json::to_string_pretty(settings) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize settings to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&self.file_path, settings_json).await?;
        info!("Settings saved to {:?}", self.file_path);
        Ok(())
    }
}
