// Settings module
// Persisted application settings (settings.json in the app directory)

#[allow(clippy::module_inception)]
pub mod settings;

pub use settings::{AppSettings, LoggingSettings, PlaybackSettings, SettingsError, StorageSettings};
