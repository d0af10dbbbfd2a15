// Local audio engine
// AudioProvider backed by Symphonia + cpal, one playback thread per loaded track

use async_trait::async_trait;
use parking_lot::Mutex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::decoder::TrackDecoder;
use super::output::AudioOutput;
use super::provider::{
    AudioProvider, LoadError, PlaybackStatus, ProviderError, ResourceHandle, StatusCallback,
};
use crate::settings::PlaybackSettings;

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Engine tuning taken from the playback settings
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub status_interval: Duration,
    pub volume: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(250),
            volume: 1.0,
        }
    }
}

impl From<&PlaybackSettings> for EngineConfig {
    fn from(settings: &PlaybackSettings) -> Self {
        Self {
            status_interval: Duration::from_millis(settings.status_interval_ms.max(10)),
            volume: settings.volume,
        }
    }
}

/// Map a track URI to a local file. Remote media has to be downloaded first.
pub fn resolve_local_path(uri: &str) -> Result<PathBuf, LoadError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path.replace("%20", " ")));
    }
    if uri.contains("://") {
        return Err(LoadError::UnsupportedUri(uri.to_string()));
    }
    if uri.trim().is_empty() {
        return Err(LoadError::NotFound(uri.to_string()));
    }
    Ok(PathBuf::from(uri))
}

/// Convert interleaved samples between channel layouts.
/// Mono is spread to every output channel; downmixing to mono averages.
pub fn remap_channels(samples: &[f32], from: usize, to: usize) -> Cow<'_, [f32]> {
    if from == to || from == 0 || to == 0 {
        return Cow::Borrowed(samples);
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
            continue;
        }
        for ch in 0..to {
            out.push(frame[ch.min(from - 1)]);
        }
    }
    Cow::Owned(out)
}

enum VoiceCommand {
    Play(oneshot::Sender<()>),
    Pause(oneshot::Sender<()>),
    Seek(u64, oneshot::Sender<Result<u64, String>>),
    Stop,
}

struct VoiceShared {
    status: Mutex<PlaybackStatus>,
    callback: Mutex<Option<StatusCallback>>,
}

impl VoiceShared {
    fn publish(&self, status: PlaybackStatus) {
        *self.status.lock() = status;
        if let Some(callback) = self.callback.lock().as_ref() {
            callback(status);
        }
    }
}

struct Voice {
    commands: Sender<VoiceCommand>,
    shared: Arc<VoiceShared>,
}

pub struct LocalAudioEngine {
    config: EngineConfig,
    next_id: AtomicU64,
    voices: Mutex<HashMap<ResourceHandle, Voice>>,
}

impl LocalAudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            voices: Mutex::new(HashMap::new()),
        }
    }

    /// Number of tracks currently loaded
    pub fn loaded_count(&self) -> usize {
        self.voices.lock().len()
    }

    fn voice(&self, handle: ResourceHandle) -> Result<(Sender<VoiceCommand>, Arc<VoiceShared>), ProviderError> {
        self.voices
            .lock()
            .get(&handle)
            .map(|v| (v.commands.clone(), Arc::clone(&v.shared)))
            .ok_or(ProviderError::UnknownHandle(handle))
    }

    async fn request<T>(
        &self,
        handle: ResourceHandle,
        command: impl FnOnce(oneshot::Sender<T>) -> VoiceCommand,
    ) -> Result<T, ProviderError> {
        let (commands, _) = self.voice(handle)?;
        let (ack_tx, ack_rx) = oneshot::channel();
        commands
            .send(command(ack_tx))
            .map_err(|_| ProviderError::Disconnected(handle))?;
        ack_rx.await.map_err(|_| ProviderError::Disconnected(handle))
    }
}

impl Default for LocalAudioEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for LocalAudioEngine {
    fn drop(&mut self) {
        for (_, voice) in self.voices.lock().drain() {
            voice.shared.callback.lock().take();
            let _ = voice.commands.send(VoiceCommand::Stop);
        }
    }
}

#[async_trait]
impl AudioProvider for LocalAudioEngine {
    async fn acquire(&self, uri: &str) -> Result<ResourceHandle, LoadError> {
        let path = resolve_local_path(uri)?;
        if !path.is_file() {
            return Err(LoadError::NotFound(uri.to_string()));
        }

        let handle = ResourceHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let shared = Arc::new(VoiceShared {
            status: Mutex::new(PlaybackStatus::unloaded()),
            callback: Mutex::new(None),
        });
        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let config = self.config;
        let thread_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("voice-{}", handle.id()))
            .spawn(move || run_voice(path, config, inbox, thread_shared, ready_tx))
            .map_err(|e| LoadError::Output(format!("Failed to spawn playback thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(LoadError::Output("playback thread exited during load".to_string())),
        }

        self.voices.lock().insert(handle, Voice { commands, shared });
        debug!(uri, %handle, "Audio resource acquired");
        Ok(handle)
    }

    async fn release(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        let voice = self.voices
            .lock()
            .remove(&handle)
            .ok_or(ProviderError::UnknownHandle(handle))?;
        // Drop the subscription first so nothing fires after we return
        voice.shared.callback.lock().take();
        let _ = voice.commands.send(VoiceCommand::Stop);
        debug!(%handle, "Audio resource released");
        Ok(())
    }

    async fn play(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        self.request(handle, VoiceCommand::Play).await
    }

    async fn pause(&self, handle: ResourceHandle) -> Result<(), ProviderError> {
        self.request(handle, VoiceCommand::Pause).await
    }

    async fn set_position(&self, handle: ResourceHandle, position_ms: u64) -> Result<(), ProviderError> {
        self.request(handle, |ack| VoiceCommand::Seek(position_ms, ack))
            .await?
            .map(|_| ())
            .map_err(ProviderError::Backend)
    }

    async fn status(&self, handle: ResourceHandle) -> Result<PlaybackStatus, ProviderError> {
        let (_, shared) = self.voice(handle)?;
        let status = *shared.status.lock();
        Ok(status)
    }

    fn on_status_change(&self, handle: ResourceHandle, callback: StatusCallback) -> Result<(), ProviderError> {
        let (_, shared) = self.voice(handle)?;
        *shared.callback.lock() = Some(callback);
        Ok(())
    }
}

/// Playback position bookkeeping for one voice
struct Clock {
    base_ms: u64,
    frames_written: u64,
    duration_ms: Option<u64>,
}

impl Clock {
    fn position_ms(&self, output: &AudioOutput) -> u64 {
        let channels = output.channels().max(1) as u64;
        let queued = output.queued() as u64 / channels;
        let played = self.frames_written.saturating_sub(queued);
        let position = self.base_ms + played * 1000 / output.sample_rate().max(1) as u64;
        match self.duration_ms {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn restart_at(&mut self, position_ms: u64) {
        self.base_ms = position_ms;
        self.frames_written = 0;
    }
}

/// Seek the decoder and restart the clock where the decoder actually landed.
fn reposition(decoder: &mut TrackDecoder, clock: &mut Clock, position_ms: u64) -> Result<u64, String> {
    let actual = decoder.seek(position_ms)?;
    clock.restart_at(actual);
    Ok(actual)
}

fn run_voice(
    path: PathBuf,
    config: EngineConfig,
    inbox: Receiver<VoiceCommand>,
    shared: Arc<VoiceShared>,
    ready: oneshot::Sender<Result<(), LoadError>>,
) {
    let mut decoder = match TrackDecoder::open(&path) {
        Ok(decoder) => decoder,
        Err(e) => {
            let _ = ready.send(Err(LoadError::Decode(e)));
            return;
        }
    };
    let track_channels = decoder.channels();
    let mut output = match AudioOutput::open(decoder.sample_rate(), track_channels as u16, config.volume) {
        Ok(output) => output,
        Err(e) => {
            let _ = ready.send(Err(LoadError::Output(e)));
            return;
        }
    };
    let output_channels = output.channels() as usize;

    let mut clock = Clock {
        base_ms: 0,
        frames_written: 0,
        duration_ms: decoder.duration_ms(),
    };
    let mut playing = false;
    let mut finished = false;

    let status = |clock: &Clock, output: &AudioOutput, playing: bool, finished: bool| PlaybackStatus {
        position_ms: clock.position_ms(output),
        duration_ms: clock.duration_ms,
        is_playing: playing,
        is_loaded: true,
        did_just_finish: finished,
    };

    *shared.status.lock() = status(&clock, &output, false, false);
    if ready.send(Ok(())).is_err() {
        return;
    }

    let mut last_report = Instant::now();
    loop {
        let command = if playing {
            match inbox.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match inbox.recv_timeout(config.status_interval) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        if let Some(command) = command {
            match command {
                VoiceCommand::Play(ack) => {
                    if finished {
                        if let Err(e) = reposition(&mut decoder, &mut clock, 0) {
                            warn!(path = %path.display(), error = %e, "Failed to rewind finished track");
                            clock.restart_at(0);
                        }
                        finished = false;
                    }
                    playing = true;
                    shared.publish(status(&clock, &output, true, false));
                    let _ = ack.send(());
                }
                VoiceCommand::Pause(ack) => {
                    let position = clock.position_ms(&output);
                    output.clear();
                    // The decoder has run ahead of what was heard
                    if let Err(e) = reposition(&mut decoder, &mut clock, position) {
                        warn!(path = %path.display(), error = %e, "Failed to rewind on pause");
                        clock.restart_at(position);
                    }
                    playing = false;
                    shared.publish(status(&clock, &output, false, false));
                    let _ = ack.send(());
                }
                VoiceCommand::Seek(position_ms, ack) => {
                    output.clear();
                    let result = reposition(&mut decoder, &mut clock, position_ms);
                    if result.is_ok() {
                        finished = false;
                    }
                    shared.publish(status(&clock, &output, playing, false));
                    let _ = ack.send(result);
                }
                VoiceCommand::Stop => break,
            }
            last_report = Instant::now();
            continue;
        }

        match decoder.decode_next() {
            Ok(Some(samples)) => {
                let samples = remap_channels(samples, track_channels, output_channels);
                let written = output.write_blocking(&samples, WRITE_TIMEOUT);
                clock.frames_written += (written / output_channels.max(1)) as u64;
            }
            Ok(None) => {
                playing = false;
                finished = true;
                if let Some(duration) = clock.duration_ms {
                    clock.restart_at(duration);
                }
                shared.publish(status(&clock, &output, false, true));
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Playback stopped on decode error");
                playing = false;
                shared.publish(status(&clock, &output, false, false));
                continue;
            }
        }

        if last_report.elapsed() >= config.status_interval {
            shared.publish(status(&clock, &output, playing, false));
            last_report = Instant::now();
        }
    }

    debug!(path = %path.display(), "Playback thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_plain_and_file_uris() {
        assert_eq!(resolve_local_path("media/a.mp3").unwrap(), PathBuf::from("media/a.mp3"));
        assert_eq!(
            resolve_local_path("file:///data/Trail%20One/a.mp3").unwrap(),
            PathBuf::from("/data/Trail One/a.mp3")
        );
    }

    #[test]
    fn test_resolve_rejects_remote_uris() {
        let uri = "https://talkingtrailstorage.blob.core.windows.net/projects/Kenmare_ND/a.mp3";
        assert_eq!(resolve_local_path(uri), Err(LoadError::UnsupportedUri(uri.to_string())));
        assert!(matches!(resolve_local_path("  "), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn test_remap_same_layout_borrows() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        assert!(matches!(remap_channels(&samples, 2, 2), Cow::Borrowed(_)));
    }

    #[test]
    fn test_remap_mono_to_stereo() {
        let samples = [0.1, 0.5];
        assert_eq!(remap_channels(&samples, 1, 2).as_ref(), &[0.1, 0.1, 0.5, 0.5]);
    }

    #[test]
    fn test_remap_stereo_to_mono_averages() {
        let samples = [0.2, 0.4, -1.0, 1.0];
        let mono = remap_channels(&samples, 2, 1);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_acquire_missing_file() {
        let engine = LocalAudioEngine::default();
        let result = engine.acquire("/definitely/not/here.mp3").await;
        assert_eq!(result, Err(LoadError::NotFound("/definitely/not/here.mp3".to_string())));
        assert_eq!(engine.loaded_count(), 0);
    }

    #[tokio::test]
    async fn test_acquire_undecodable_file() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"this is not audio").unwrap();
        let uri = file.path().to_string_lossy().to_string();

        let engine = LocalAudioEngine::default();
        let result = engine.acquire(&uri).await;
        assert!(matches!(result, Err(LoadError::Decode(_))), "got {result:?}");
        assert_eq!(engine.loaded_count(), 0);
    }

    #[tokio::test]
    async fn test_operations_on_unknown_handle() {
        let engine = LocalAudioEngine::default();
        let handle = ResourceHandle::new(99);
        assert_eq!(engine.play(handle).await, Err(ProviderError::UnknownHandle(handle)));
        assert_eq!(engine.release(handle).await, Err(ProviderError::UnknownHandle(handle)));
        assert!(engine.status(handle).await.is_err());
    }

    const RAMP_RATE: u32 = 8_000;

    /// Mono 16-bit WAV where each sample holds its own timestamp in ms.
    fn ramp_wav(duration_ms: u32) -> tempfile::NamedTempFile {
        let frames = RAMP_RATE * duration_ms / 1000;
        let data_len = frames * 2;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&RAMP_RATE.to_le_bytes());
        bytes.extend_from_slice(&(RAMP_RATE * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for frame in 0..frames {
            let ms = (frame * 1000 / RAMP_RATE) as i16;
            bytes.extend_from_slice(&ms.to_le_bytes());
        }

        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    fn first_sample_ms(decoder: &mut TrackDecoder) -> u64 {
        let samples = decoder.decode_next().unwrap().expect("samples after seek");
        (samples[0] * 32768.0).round() as u64
    }

    #[test]
    fn test_reposition_discards_read_ahead() {
        let file = ramp_wav(2_000);
        let mut decoder = TrackDecoder::open(file.path()).unwrap();
        let mut clock = Clock {
            base_ms: 0,
            frames_written: 0,
            duration_ms: decoder.duration_ms(),
        };

        // Decode well past the point playback stopped at
        while first_sample_ms(&mut decoder) < 1_500 {}

        let actual = reposition(&mut decoder, &mut clock, 1_000).unwrap();
        assert!(actual <= 1_000);
        assert_eq!(clock.base_ms, actual);
        assert_eq!(clock.frames_written, 0);
        assert!(first_sample_ms(&mut decoder).abs_diff(actual) <= 1);
    }

    #[test]
    fn test_reposition_to_start() {
        let file = ramp_wav(1_000);
        let mut decoder = TrackDecoder::open(file.path()).unwrap();
        let mut clock = Clock {
            base_ms: 700,
            frames_written: 4_000,
            duration_ms: decoder.duration_ms(),
        };

        assert_eq!(reposition(&mut decoder, &mut clock, 0).unwrap(), 0);
        assert_eq!(clock.base_ms, 0);
        assert_eq!(first_sample_ms(&mut decoder), 0);
    }
}
