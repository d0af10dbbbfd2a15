// TrailGuide - Talking trail narration player
// Module declarations
pub mod audio;
pub mod commands;
pub mod db;
pub mod settings;
pub mod state;
pub mod trail;

use tracing_subscriber::EnvFilter;

pub use audio::{AudioSession, LocalAudioEngine, SessionPhase, SessionSnapshot};
pub use settings::AppSettings;
pub use state::AppState;

/// Install the global tracing subscriber. `RUST_LOG` wins over `filter`.
/// Calling this more than once is harmless.
pub fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
