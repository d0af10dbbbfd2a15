// Scripted in-memory provider for session tests
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

use super::provider::{
    AudioProvider, LoadError, PlaybackStatus, ProviderError, ResourceHandle, StatusCallback,
};

const DEFAULT_DURATION_MS: u64 = 60_000;

struct FakeResource {
    uri: String,
    playing: bool,
    position_ms: u64,
    duration_ms: u64,
    callback: Option<Arc<StatusCallback>>,
}

impl FakeResource {
    fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            position_ms: self.position_ms,
            duration_ms: Some(self.duration_ms),
            is_playing: self.playing,
            is_loaded: true,
            did_just_finish: false,
        }
    }
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    open: HashMap<ResourceHandle, FakeResource>,
    durations: HashMap<String, u64>,
    failing: HashSet<String>,
    failing_play: HashSet<String>,
    gates: HashMap<String, Arc<Notify>>,
    acquired_total: usize,
    provider_calls: usize,
}

#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_duration(&self, uri: &str, duration_ms: u64) {
        self.state.lock().durations.insert(uri.to_string(), duration_ms);
    }

    pub fn fail(&self, uri: &str) {
        self.state.lock().failing.insert(uri.to_string());
    }

    /// Let `acquire(uri)` succeed but make `play` on the resource fail.
    pub fn fail_play(&self, uri: &str) {
        self.state.lock().failing_play.insert(uri.to_string());
    }

    /// Make `acquire(uri)` wait until [`FakeProvider::open_gate`] is called.
    pub fn hold(&self, uri: &str) {
        self.state.lock().gates.insert(uri.to_string(), Arc::new(Notify::new()));
    }

    pub fn open_gate(&self, uri: &str) {
        if let Some(gate) = self.state.lock().gates.remove(uri) {
            gate.notify_one();
        }
    }

    pub fn open_handles(&self) -> Vec<ResourceHandle> {
        let mut handles: Vec<_> = self.state.lock().open.keys().copied().collect();
        handles.sort_by_key(|h| h.id());
        handles
    }

    pub fn open_uris(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut uris: Vec<_> = state.open.values().map(|r| r.uri.clone()).collect();
        uris.sort();
        uris
    }

    pub fn acquired_total(&self) -> usize {
        self.state.lock().acquired_total
    }

    pub fn provider_calls(&self) -> usize {
        self.state.lock().provider_calls
    }

    /// Keep a copy of the registered callback so a test can fire it after release.
    pub fn callback(&self, handle: ResourceHandle) -> Option<Arc<StatusCallback>> {
        self.state.lock().open.get(&handle).and_then(|r| r.callback.clone())
    }

    /// Advance a playing resource and report the new status.
    pub fn tick(&self, handle: ResourceHandle, elapsed_ms: u64) {
        let update = {
            let mut state = self.state.lock();
            let Some(resource) = state.open.get_mut(&handle) else {
                return;
            };
            if resource.playing {
                resource.position_ms = (resource.position_ms + elapsed_ms).min(resource.duration_ms);
            }
            resource.callback.clone().map(|cb| (cb, resource.status()))
        };
        if let Some((callback, status)) = update {
            (**callback)(status);
        }
    }

    fn update<F>(&self, handle: ResourceHandle, change: F) -> Result<(), ProviderError>
    where
        F: FnOnce(&mut FakeResource),
    {
        let update = {
            let mut state = self.state.lock();
            state.provider_calls += 1;
            let resource = state
                .open
                .get_mut(&handle)
                .ok_or(ProviderError::UnknownHandle(handle))?;
            change(resource);
            resource.callback.clone().map(|cb| (cb, resource.status()))
        };
        // Fire outside the lock, the callback re-enters the session
        if let Some((callback, status)) = update {
            (**callback)(status);
        }
        Ok(())
    }
}

#[async_trait]
impl AudioProvider for FakeProvider {
    async fn acquire(&self, uri: &str) -> Result<ResourceHandle, LoadError> {
        let gate = {
            let mut state = self.state.lock();
            state.provider_calls += 1;
            state.gates.get(uri).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if state.failing.contains(uri) {
            return Err(LoadError::NotFound(uri.to_string()));
        }
        state.next_id += 1;
        state.acquired_total += 1;
        let handle = ResourceHandle::new(state.next_id);
        let duration_ms = state.durations.get(uri).copied().unwrap_or(DEFAULT_DURATION_MS);
        state.open.insert(
            handle,
            FakeResource {
                uri: uri.to_string(),
                playing: false,
                position_ms: 0,
                duration_ms,
                callback: None,
            },
        );
        Ok(handle)
    }

    async fn release(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.provider_calls += 1;
        state
            .open
            .remove(&handle)
            .map(|_| ())
            .ok_or(ProviderError::UnknownHandle(handle))
    }

    async fn play(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        {
            let state = self.state.lock();
            if let Some(resource) = state.open.get(&handle) {
                if state.failing_play.contains(&resource.uri) {
                    return Err(ProviderError::Backend(format!("cannot start {}", resource.uri)));
                }
            }
        }
        self.update(handle, |r| r.playing = true)
    }

    async fn pause(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        self.update(handle, |r| r.playing = false)
    }

    async fn set_position(&self, handle: ResourceHandle, position_ms: u64) -> Result<(), ProviderError> {
        self.update(handle, |r| r.position_ms = position_ms.min(r.duration_ms))
    }

    async fn status(&self, handle: ResourceHandle) -> Result<PlaybackStatus, ProviderError> {
        let mut state = self.state.lock();
        state.provider_calls += 1;
        state
            .open
            .get(&handle)
            .map(FakeResource::status)
            .ok_or(ProviderError::UnknownHandle(handle))
    }

    fn on_status_change(&self, handle: ResourceHandle, callback: StatusCallback) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        let resource = state
            .open
            .get_mut(&handle)
            .ok_or(ProviderError::UnknownHandle(handle))?;
        resource.callback = Some(Arc::new(callback));
        Ok(())
    }
}
