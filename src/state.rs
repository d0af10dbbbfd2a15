// Application state management
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::audio::{AudioProvider, AudioSession, EngineConfig, LocalAudioEngine};
use crate::db::DatabaseConnection;
use crate::settings::AppSettings;

/// Everything consumers need, built once at startup and passed around explicitly.
pub struct AppState {
    pub session: Arc<AudioSession>,
    pub db: DatabaseConnection,
    pub settings: AppSettings,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(session: AudioSession, db: DatabaseConnection, settings: AppSettings, app_dir: PathBuf) -> Self {
        Self {
            session: Arc::new(session),
            db,
            settings,
            app_dir,
        }
    }

    /// Load settings, open the download database and start an audio session
    /// on the local engine.
    pub fn initialize(app_dir: &Path) -> Result<Self> {
        let settings = AppSettings::load(app_dir).context("Failed to load settings")?;
        let db = DatabaseConnection::new(&app_dir.join("trailguide.db"))
            .context("Failed to initialize database")?;

        let provider: Arc<dyn AudioProvider> =
            Arc::new(LocalAudioEngine::new(EngineConfig::from(&settings.playback)));
        let session = AudioSession::new(provider)
            .with_skip_interval(settings.playback.skip_interval_ms);

        info!(app_dir = %app_dir.display(), "Application state initialized");
        Ok(Self::new(session, db, settings, app_dir.to_path_buf()))
    }

    /// Directory holding offline media
    pub fn media_dir(&self) -> PathBuf {
        self.settings.media_dir(&self.app_dir)
    }

    /// Release the audio resource, if any. Call before exiting.
    pub async fn shutdown(&self) {
        self.session.unload().await;
    }
}
