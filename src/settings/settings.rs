// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::audio::session::DEFAULT_SKIP_INTERVAL_MS;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to write settings file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub skip_interval_ms: u64,  // forward/backward jump
    pub status_interval_ms: u64, // how often a playing track reports its position
    pub volume: f32,             // 0.0-1.0
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            skip_interval_ms: DEFAULT_SKIP_INTERVAL_MS,
            status_interval_ms: 250,
            volume: 1.0,
        }
    }
}

/// Where trail content lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub base_url: String,
    /// Downloaded media, relative to the app directory unless absolute
    pub media_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            base_url: "https://talkingtrailstorage.blob.core.windows.net/projects".to_string(),
            media_dir: PathBuf::from("media"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String, // tracing EnvFilter directive, RUST_LOG wins
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub playback: PlaybackSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            playback: PlaybackSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self, SettingsError> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|source| SettingsError::Read { path: path.clone(), source })?;

        let mut settings: AppSettings = serde_json::from_str(&content)?;
        settings.playback.volume = settings.playback.volume.clamp(0.0, 1.0);

        info!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<(), SettingsError> {
        let path = Self::get_settings_path(app_dir);
        let write_err = |source| SettingsError::Write { path: path.clone(), source };

        fs::create_dir_all(app_dir).map_err(write_err)?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(write_err)?;

        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Media directory resolved against the app directory
    pub fn media_dir(&self, app_dir: &Path) -> PathBuf {
        if self.storage.media_dir.is_absolute() {
            self.storage.media_dir.clone()
        } else {
            app_dir.join(&self.storage.media_dir)
        }
    }
}
