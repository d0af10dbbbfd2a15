// Audio resource provider capability
// The session controller talks to the platform media subsystem only through this trait

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Opaque id of a loaded audio resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(u64);

impl ResourceHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status reported by a loaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub position_ms: u64,
    /// `None` while the length is still unknown
    pub duration_ms: Option<u64>,
    pub is_playing: bool,
    pub is_loaded: bool,
    /// Set on the update that reports reaching the end of the track
    pub did_just_finish: bool,
}

impl PlaybackStatus {
    pub fn unloaded() -> Self {
        Self::default()
    }
}

/// Callback invoked by the provider on every status change of one handle.
pub type StatusCallback = Box<dyn Fn(PlaybackStatus) + Send + Sync + 'static>;

/// Acquiring an audio resource failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unsupported audio uri: {0}")]
    UnsupportedUri(String),
    #[error("audio source not found: {0}")]
    NotFound(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("audio provider failed: {0}")]
    Provider(#[from] ProviderError),
}

/// An operation on an already acquired resource failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("unknown resource handle {0}")]
    UnknownHandle(ResourceHandle),
    #[error("playback thread for {0} is gone")]
    Disconnected(ResourceHandle),
    #[error("{0}")]
    Backend(String),
}

/// Media subsystem capability consumed by [`crate::audio::session::AudioSession`].
///
/// Every method except [`AudioProvider::on_status_change`] may suspend while the
/// underlying subsystem does its work. After `release(handle)` returns, the
/// callback registered for `handle` must never fire again.
#[async_trait]
pub trait AudioProvider: Send + Sync + 'static {
    async fn acquire(&self, uri: &str) -> Result<ResourceHandle, LoadError>;

    async fn release(&self, handle: ResourceHandle) -> Result<(), ProviderError>;

    async fn play(&self, handle: ResourceHandle) -> Result<(), ProviderError>;

    async fn pause(&self, handle: ResourceHandle) -> Result<(), ProviderError>;

    async fn set_position(&self, handle: ResourceHandle, position_ms: u64) -> Result<(), ProviderError>;

    async fn status(&self, handle: ResourceHandle) -> Result<PlaybackStatus, ProviderError>;

    /// Replace the status subscription for `handle`.
    fn on_status_change(&self, handle: ResourceHandle, callback: StatusCallback) -> Result<(), ProviderError>;
}
