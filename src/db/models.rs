// Data models
use serde::{Deserialize, Serialize};

/// A talking point saved for offline use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedTrail {
    pub id: i64,
    /// Project short name
    pub name: String,
    pub talking_point: String,
    /// First media file of the attraction, usually its cover image
    pub image: Option<String>,
    /// Local copy of the narration, playable offline
    pub local_audio: Option<String>,
    /// Unix timestamp (seconds)
    pub downloaded_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDownload {
    pub name: String,
    pub talking_point: String,
    pub image: Option<String>,
    pub local_audio: Option<String>,
}
