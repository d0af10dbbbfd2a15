// Audio session controller
// Owns at most one audio resource at a time and publishes playback telemetry

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::provider::{
    AudioProvider, LoadError, PlaybackStatus, ProviderError, ResourceHandle, StatusCallback,
};

/// Default jump for `forward()` / `backward()`.
pub const DEFAULT_SKIP_INTERVAL_MS: u64 = 10_000;

/// Where the session is in its load / play lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Loading,
    Paused,
    Playing,
    /// Transient, while a position change is in flight
    Seeking,
    /// Last load failed. Consumers treat it like `Idle`.
    Error,
}

impl SessionPhase {
    /// A resource is loaded and accepts transport commands.
    pub fn is_ready(self) -> bool {
        matches!(self, SessionPhase::Paused | SessionPhase::Playing | SessionPhase::Seeking)
    }
}

/// Published session state, as seen by every subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub source_uri: Option<String>,
    pub phase: SessionPhase,
    pub playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl SessionSnapshot {
    pub fn empty() -> Self {
        Self {
            source_uri: None,
            phase: SessionPhase::Idle,
            playing: false,
            position_ms: 0,
            duration_ms: 0,
        }
    }

    /// Position as a fraction of the duration, 0.0 when the length is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration_ms == 0 {
            0.0
        } else {
            self.position_ms as f64 / self.duration_ms as f64
        }
    }
}

/// How a `play_audio` call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Playing,
    /// A later `play_audio`, `stop` or `unload` took over before this load finished
    Superseded,
}

/// Clamp a requested position to `[0, duration_ms]`.
pub fn clamp_position(position_ms: i64, duration_ms: u64) -> u64 {
    (position_ms.max(0) as u64).min(duration_ms)
}

/// Format milliseconds as `m:ss`.
pub fn format_time(ms: u64) -> String {
    let total_seconds = ms / 1000;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

struct Inner {
    generation: u64,
    handle: Option<ResourceHandle>,
    source_uri: Option<String>,
    phase: SessionPhase,
    playing: bool,
    position_ms: u64,
    duration_ms: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            generation: 0,
            handle: None,
            source_uri: None,
            phase: SessionPhase::Idle,
            playing: false,
            position_ms: 0,
            duration_ms: 0,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_uri: self.source_uri.clone(),
            phase: self.phase,
            playing: self.playing,
            position_ms: self.position_ms,
            duration_ms: self.duration_ms,
        }
    }

    /// Forget the resource and all telemetry. Returns the handle that was held.
    fn reset(&mut self, phase: SessionPhase) -> Option<ResourceHandle> {
        self.source_uri = None;
        self.phase = phase;
        self.playing = false;
        self.position_ms = 0;
        self.duration_ms = 0;
        self.handle.take()
    }

    fn is_current(&self, generation: u64, handle: ResourceHandle) -> bool {
        self.generation == generation && self.handle == Some(handle)
    }

    fn apply_status(&mut self, status: &PlaybackStatus) {
        if status.is_loaded {
            self.duration_ms = status.duration_ms.unwrap_or(0);
            self.position_ms = status.position_ms.min(self.duration_ms);
            self.playing = status.is_playing;
            if matches!(self.phase, SessionPhase::Paused | SessionPhase::Playing) {
                self.phase = self.ready_phase();
            }
        } else {
            self.position_ms = 0;
            self.duration_ms = 0;
            self.playing = false;
        }
    }

    fn ready_phase(&self) -> SessionPhase {
        if self.playing {
            SessionPhase::Playing
        } else {
            SessionPhase::Paused
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    publisher: watch::Sender<SessionSnapshot>,
}

impl Shared {
    // Called with the inner lock held so subscribers see updates in mutation order
    fn publish(&self, inner: &Inner) {
        self.publisher.send_replace(inner.snapshot());
    }
}

/// Process-wide audio session.
///
/// Create one per application, hand it to consumers (usually behind an `Arc`)
/// and call [`AudioSession::unload`] on teardown. Every operation publishes the
/// resulting state to subscribers before it returns.
///
/// Each `play_audio`, `stop` and `unload` starts a new generation. Work that
/// resumes after an `.await` only touches state if its generation is still
/// current, so a load that was overtaken never repopulates the session.
pub struct AudioSession {
    provider: Arc<dyn AudioProvider>,
    shared: Arc<Shared>,
    skip_interval_ms: u64,
}

impl AudioSession {
    pub fn new(provider: Arc<dyn AudioProvider>) -> Self {
        let (publisher, _) = watch::channel(SessionSnapshot::empty());
        Self {
            provider,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::new()),
                publisher,
            }),
            skip_interval_ms: DEFAULT_SKIP_INTERVAL_MS,
        }
    }

    pub fn with_skip_interval(mut self, skip_interval_ms: u64) -> Self {
        self.skip_interval_ms = skip_interval_ms;
        self
    }

    pub fn skip_interval_ms(&self) -> u64 {
        self.skip_interval_ms
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.inner.lock().snapshot()
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.publisher.subscribe()
    }

    /// Release whatever is loaded, load `uri` and start playing it from zero.
    ///
    /// Calling this with the URI that is already loaded restarts the track.
    pub async fn play_audio(&self, uri: &str) -> Result<LoadOutcome, LoadError> {
        let (generation, previous) = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            let previous = inner.reset(SessionPhase::Loading);
            inner.source_uri = Some(uri.to_string());
            self.shared.publish(&inner);
            (inner.generation, previous)
        };

        if let Some(previous) = previous {
            self.release_quietly(previous).await;
        }

        debug!(uri, generation, "Loading audio");
        let handle = match self.provider.acquire(uri).await {
            Ok(handle) => handle,
            Err(err) => return self.fail_load(uri, generation, None, err).await,
        };

        let superseded = {
            let mut inner = self.shared.inner.lock();
            if inner.generation == generation {
                inner.handle = Some(handle);
            }
            inner.generation != generation
        };
        if superseded {
            debug!(uri, %handle, "Discarding superseded audio load");
            self.release_quietly(handle).await;
            return Ok(LoadOutcome::Superseded);
        }

        let callback = self.status_callback(generation, handle);
        if let Err(err) = self.provider.on_status_change(handle, callback) {
            return self.fail_load(uri, generation, Some(handle), err.into()).await;
        }
        if let Err(err) = self.provider.play(handle).await {
            return self.fail_load(uri, generation, Some(handle), err.into()).await;
        }
        let status = match self.provider.status(handle).await {
            Ok(status) => status,
            Err(err) => return self.fail_load(uri, generation, Some(handle), err.into()).await,
        };

        let mut inner = self.shared.inner.lock();
        if !inner.is_current(generation, handle) {
            // Whoever superseded us took the handle and released it
            return Ok(LoadOutcome::Superseded);
        }
        inner.apply_status(&status);
        inner.phase = inner.ready_phase();
        self.shared.publish(&inner);
        info!(uri, duration_ms = inner.duration_ms, "Playing audio");
        Ok(LoadOutcome::Playing)
    }

    /// Resume a paused track. No-op when nothing is loaded or already playing.
    pub async fn play(&self) {
        let Some((generation, handle)) = self.loaded() else {
            return;
        };
        match self.provider.status(handle).await {
            Ok(status) if status.is_loaded && !status.is_playing => {}
            Ok(_) => return,
            Err(err) => return self.log_provider_error("play", err),
        }
        if let Err(err) = self.provider.play(handle).await {
            return self.log_provider_error("play", err);
        }
        self.set_playing(generation, handle, true);
    }

    /// Pause a playing track. No-op when nothing is loaded or already paused.
    pub async fn pause(&self) {
        let Some((generation, handle)) = self.loaded() else {
            return;
        };
        match self.provider.status(handle).await {
            Ok(status) if status.is_loaded && status.is_playing => {}
            Ok(_) => return,
            Err(err) => return self.log_provider_error("pause", err),
        }
        if let Err(err) = self.provider.pause(handle).await {
            return self.log_provider_error("pause", err);
        }
        self.set_playing(generation, handle, false);
    }

    /// Move to `position_ms`, clamped to the track length. Playing/paused is kept.
    pub async fn seek_to(&self, position_ms: i64) {
        let Some((generation, handle)) = self.loaded() else {
            return;
        };
        let duration_ms = self.shared.inner.lock().duration_ms;
        if duration_ms == 0 {
            return;
        }
        self.seek_within(generation, handle, clamp_position(position_ms, duration_ms))
            .await;
    }

    pub async fn forward(&self) {
        self.skip(self.skip_interval_ms as i64).await;
    }

    pub async fn backward(&self) {
        self.skip(-(self.skip_interval_ms as i64)).await;
    }

    /// Release the loaded track and clear all telemetry. Idempotent.
    pub async fn stop(&self) {
        self.release_session("stop").await;
    }

    /// Lifecycle teardown, same effect as [`AudioSession::stop`].
    pub async fn unload(&self) {
        self.release_session("unload").await;
    }

    async fn skip(&self, offset_ms: i64) {
        let Some((generation, handle)) = self.loaded() else {
            return;
        };
        let status = match self.provider.status(handle).await {
            Ok(status) if status.is_loaded => status,
            Ok(_) => return,
            Err(err) => return self.log_provider_error("skip", err),
        };
        let duration_ms = status.duration_ms.unwrap_or(0);
        if duration_ms == 0 {
            return;
        }
        let target = clamp_position(status.position_ms as i64 + offset_ms, duration_ms);
        self.seek_within(generation, handle, target).await;
    }

    async fn seek_within(&self, generation: u64, handle: ResourceHandle, target_ms: u64) {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.is_current(generation, handle) {
                return;
            }
            inner.phase = SessionPhase::Seeking;
            self.shared.publish(&inner);
        }

        let result = self.provider.set_position(handle, target_ms).await;

        let mut inner = self.shared.inner.lock();
        if !inner.is_current(generation, handle) {
            return;
        }
        match result {
            Ok(()) => inner.position_ms = target_ms.min(inner.duration_ms),
            Err(err) => warn!(%handle, error = %err, "Audio seek failed"),
        }
        inner.phase = inner.ready_phase();
        self.shared.publish(&inner);
    }

    async fn release_session(&self, reason: &'static str) {
        let handle = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            let handle = inner.reset(SessionPhase::Idle);
            self.shared.publish(&inner);
            handle
        };
        if let Some(handle) = handle {
            debug!(%handle, reason, "Releasing audio resource");
            self.release_quietly(handle).await;
        }
    }

    async fn fail_load(
        &self,
        uri: &str,
        generation: u64,
        handle: Option<ResourceHandle>,
        err: LoadError,
    ) -> Result<LoadOutcome, LoadError> {
        let superseded = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                true
            } else {
                inner.reset(SessionPhase::Error);
                self.shared.publish(&inner);
                false
            }
        };
        if superseded {
            debug!(uri, error = %err, "Ignoring failure of superseded audio load");
            return Ok(LoadOutcome::Superseded);
        }
        warn!(uri, error = %err, "Audio play error");
        if let Some(handle) = handle {
            self.release_quietly(handle).await;
        }
        Err(err)
    }

    fn status_callback(&self, generation: u64, handle: ResourceHandle) -> StatusCallback {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move |status: PlaybackStatus| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut inner = shared.inner.lock();
            if !inner.is_current(generation, handle) {
                return;
            }
            if status.did_just_finish {
                debug!(%handle, "Audio track finished");
            }
            inner.apply_status(&status);
            shared.publish(&inner);
        })
    }

    fn set_playing(&self, generation: u64, handle: ResourceHandle, playing: bool) {
        let mut inner = self.shared.inner.lock();
        if !inner.is_current(generation, handle) {
            return;
        }
        inner.playing = playing;
        if inner.phase != SessionPhase::Seeking {
            inner.phase = inner.ready_phase();
        }
        self.shared.publish(&inner);
    }

    /// Generation and handle of a track that accepts transport commands.
    fn loaded(&self) -> Option<(u64, ResourceHandle)> {
        let inner = self.shared.inner.lock();
        match inner.handle {
            Some(handle) if inner.phase.is_ready() => Some((inner.generation, handle)),
            _ => None,
        }
    }

    async fn release_quietly(&self, handle: ResourceHandle) {
        if let Err(err) = self.provider.release(handle).await {
            warn!(%handle, error = %err, "Failed to release audio resource");
        }
    }

    fn log_provider_error(&self, operation: &'static str, err: ProviderError) {
        warn!(operation, error = %err, "Audio transport command failed");
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        let handle = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            let handle = inner.reset(SessionPhase::Idle);
            self.shared.publish(&inner);
            handle
        };
        let Some(handle) = handle else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let provider = Arc::clone(&self.provider);
                runtime.spawn(async move {
                    if let Err(err) = provider.release(handle).await {
                        warn!(%handle, error = %err, "Failed to release audio resource on drop");
                    }
                });
            }
            Err(_) => warn!(%handle, "Audio session dropped outside a runtime, resource not released"),
        }
    }
}
