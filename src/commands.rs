// Command handlers used by UI consumers
use serde::Serialize;

use crate::audio::session::format_time;
use crate::audio::{SessionPhase, SessionSnapshot};
use crate::db::{DbOperations, DownloadedTrail, NewDownload};
use crate::state::AppState;
use crate::trail::{asset_url, local_asset_path, Project};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStateResponse {
    pub visible: bool,
    pub is_playing: bool,
    pub phase: SessionPhase,
    pub source_uri: Option<String>,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub position_label: String,
    pub duration_label: String,
    pub progress: f64,
}

impl From<&SessionSnapshot> for PlayerStateResponse {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            // The player bar is hidden while nothing is selected
            visible: snapshot.source_uri.is_some(),
            is_playing: snapshot.playing,
            phase: snapshot.phase,
            source_uri: snapshot.source_uri.clone(),
            position_ms: snapshot.position_ms,
            duration_ms: snapshot.duration_ms,
            position_label: format_time(snapshot.position_ms),
            duration_label: format_time(snapshot.duration_ms),
            progress: snapshot.progress(),
        }
    }
}

// ===== Playback Commands =====

pub async fn play_audio(uri: String, state: &AppState) -> Result<(), String> {
    state.session
        .play_audio(&uri)
        .await
        .map(|_| ())
        .map_err(|e| format!("Failed to play audio: {}", e))
}

pub async fn resume_playback(state: &AppState) -> Result<(), String> {
    state.session.play().await;
    Ok(())
}

pub async fn pause_playback(state: &AppState) -> Result<(), String> {
    state.session.pause().await;
    Ok(())
}

/// Seek to a fraction of the track, as reported by a progress slider
pub async fn seek_playback(fraction: f64, state: &AppState) -> Result<(), String> {
    let duration_ms = state.session.snapshot().duration_ms;
    let target = (fraction.clamp(0.0, 1.0) * duration_ms as f64).round() as i64;
    state.session.seek_to(target).await;
    Ok(())
}

pub async fn skip_forward(state: &AppState) -> Result<(), String> {
    state.session.forward().await;
    Ok(())
}

pub async fn skip_backward(state: &AppState) -> Result<(), String> {
    state.session.backward().await;
    Ok(())
}

pub async fn stop_playback(state: &AppState) -> Result<(), String> {
    state.session.stop().await;
    Ok(())
}

pub fn get_player_state(state: &AppState) -> Result<PlayerStateResponse, String> {
    Ok(PlayerStateResponse::from(&state.session.snapshot()))
}

/// Play the downloaded narration of an attraction. Returns the path that was
/// loaded. Fails without touching the session when no local copy exists.
pub async fn play_attraction(
    project: &Project,
    short_name: &str,
    attraction_key: &str,
    state: &AppState,
) -> Result<String, String> {
    let uri = narration_uri(project, short_name, attraction_key, state)?;
    play_audio(uri.clone(), state).await?;
    Ok(uri)
}

fn narration_uri(
    project: &Project,
    short_name: &str,
    attraction_key: &str,
    state: &AppState,
) -> Result<String, String> {
    let attraction = project.attraction(attraction_key).map_err(|e| e.to_string())?;
    let audio = attraction
        .audio
        .as_deref()
        .ok_or_else(|| format!("Attraction {} has no narration", attraction.name))?;

    let recorded = DbOperations::get_download(&state.db, short_name, &attraction.name)
        .map_err(|e| format!("Failed to look up download: {}", e))?
        .and_then(|d| d.local_audio);
    if let Some(local) = recorded {
        return Ok(local);
    }

    let local = local_asset_path(&state.media_dir(), short_name, audio);
    if local.is_file() {
        return Ok(local.to_string_lossy().to_string());
    }

    Err(format!(
        "Narration for {} is not downloaded ({})",
        attraction.name,
        asset_url(&state.settings.storage.base_url, short_name, audio)
    ))
}

// ===== Download Commands =====

/// Record an attraction whose media the caller has saved under the media directory.
pub fn record_download(
    project: &Project,
    short_name: &str,
    attraction_key: &str,
    state: &AppState,
) -> Result<DownloadedTrail, String> {
    let attraction = project.attraction(attraction_key).map_err(|e| e.to_string())?;
    let base_url = &state.settings.storage.base_url;

    let image = attraction
        .media_files()
        .first()
        .map(|file| asset_url(base_url, short_name, file));
    let local_audio = attraction
        .audio
        .as_deref()
        .map(|audio| local_asset_path(&state.media_dir(), short_name, audio))
        .filter(|path| path.is_file())
        .map(|path| path.to_string_lossy().to_string());

    let download = NewDownload {
        name: short_name.to_string(),
        talking_point: attraction.name.clone(),
        image,
        local_audio,
    };
    DbOperations::record_download(&state.db, &download)
        .map_err(|e| format!("Failed to record download: {}", e))
}

pub fn get_downloaded_trails(state: &AppState) -> Result<Vec<DownloadedTrail>, String> {
    DbOperations::get_downloaded_trails(&state.db)
        .map_err(|e| format!("Failed to get downloaded trails: {}", e))
}

pub fn remove_download(id: i64, state: &AppState) -> Result<bool, String> {
    DbOperations::remove_download(&state.db, id)
        .map_err(|e| format!("Failed to remove download: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::resolve_local_path;
    use crate::audio::fake::FakeProvider;
    use crate::audio::{AudioProvider, AudioSession, LoadError};
    use crate::db::DatabaseConnection;
    use crate::settings::AppSettings;
    use std::sync::Arc;

    const PROJECT: &str = r#"{
        "Name": "Kenmare ND",
        "Trails": { "Trail1": { "Attractions": {
            "TP1": {
                "Name": "Old Mill",
                "Lattitude": 48.67,
                "Longitude": -102.08,
                "Images": ["Images/mill.jpg"],
                "Audio": "Audio/mill.mp3"
            },
            "TP2": { "Name": "Depot", "Lattitude": 48.68, "Longitude": -102.07 }
        } } }
    }"#;

    fn state_with(fake: &Arc<FakeProvider>, app_dir: &std::path::Path) -> AppState {
        let provider: Arc<dyn AudioProvider> = fake.clone();
        AppState::new(
            AudioSession::new(provider),
            DatabaseConnection::open_in_memory().unwrap(),
            AppSettings::default(),
            app_dir.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_player_state_reflects_session() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProvider::new();
        fake.set_duration("a.mp3", 125_000);
        let state = state_with(&fake, dir.path());

        let idle = get_player_state(&state).unwrap();
        assert!(!idle.visible);
        assert_eq!(idle.position_label, "0:00");

        play_audio("a.mp3".to_string(), &state).await.unwrap();
        seek_playback(0.5, &state).await.unwrap();

        let playing = get_player_state(&state).unwrap();
        assert!(playing.visible);
        assert!(playing.is_playing);
        assert_eq!(playing.position_ms, 62_500);
        assert_eq!(playing.position_label, "1:02");
        assert_eq!(playing.duration_label, "2:05");

        stop_playback(&state).await.unwrap();
        assert!(!get_player_state(&state).unwrap().visible);
    }

    #[tokio::test]
    async fn test_play_audio_reports_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProvider::new();
        fake.fail("broken.mp3");
        let state = state_with(&fake, dir.path());

        let err = play_audio("broken.mp3".to_string(), &state).await.unwrap_err();
        assert!(err.starts_with("Failed to play audio"), "{err}");
        assert_eq!(get_player_state(&state).unwrap().phase, SessionPhase::Error);
    }

    #[tokio::test]
    async fn test_play_attraction_requires_download() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProvider::new();
        let state = state_with(&fake, dir.path());
        let project = Project::from_json(PROJECT).unwrap();

        let err = play_attraction(&project, "Kenmare ND", "TP1", &state).await.unwrap_err();
        assert!(err.contains("not downloaded"), "{err}");
        assert!(err.contains("/Kenmare_ND/Audio/mill.mp3"), "{err}");

        // The session is left alone, nothing was acquired
        assert_eq!(fake.acquired_total(), 0);
        assert_eq!(get_player_state(&state).unwrap().phase, SessionPhase::Idle);
    }

    #[test]
    fn test_bucket_urls_are_not_playable_locally() {
        let settings = AppSettings::default();
        let url = asset_url(&settings.storage.base_url, "Kenmare ND", "Audio/mill.mp3");
        assert!(matches!(
            resolve_local_path(&url),
            Err(LoadError::UnsupportedUri(_))
        ));
    }

    #[tokio::test]
    async fn test_play_attraction_prefers_downloaded_copy() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProvider::new();
        let state = state_with(&fake, dir.path());
        let project = Project::from_json(PROJECT).unwrap();

        let local = local_asset_path(&state.media_dir(), "Kenmare ND", "Audio/mill.mp3");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"mp3").unwrap();

        let record = record_download(&project, "Kenmare ND", "TP1", &state).unwrap();
        assert_eq!(record.talking_point, "Old Mill");
        assert_eq!(
            record.image.as_deref(),
            Some("https://talkingtrailstorage.blob.core.windows.net/projects/Kenmare_ND/Images/mill.jpg")
        );
        assert_eq!(record.local_audio.as_deref(), Some(&*local.to_string_lossy()));

        let uri = play_attraction(&project, "Kenmare ND", "TP1", &state).await.unwrap();
        assert_eq!(uri, local.to_string_lossy());
        assert_eq!(get_downloaded_trails(&state).unwrap().len(), 1);
        assert!(remove_download(record.id, &state).unwrap());
    }

    #[tokio::test]
    async fn test_play_attraction_without_narration() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProvider::new();
        let state = state_with(&fake, dir.path());
        let project = Project::from_json(PROJECT).unwrap();

        assert!(play_attraction(&project, "Kenmare ND", "TP2", &state).await.is_err());
        assert!(play_attraction(&project, "Kenmare ND", "TP9", &state).await.is_err());
        assert_eq!(fake.acquired_total(), 0);
    }
}
