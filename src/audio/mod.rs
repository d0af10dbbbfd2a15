// Audio playback module
// Session controller over a pluggable provider; the local engine decodes with
// Symphonia and plays through cpal

pub mod decoder;
pub mod engine;
pub mod output;
pub mod provider;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

pub use engine::{EngineConfig, LocalAudioEngine};
pub use provider::{AudioProvider, LoadError, PlaybackStatus, ProviderError, ResourceHandle};
pub use session::{AudioSession, LoadOutcome, SessionPhase, SessionSnapshot};
