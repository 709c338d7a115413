use serde::{Serialize, Serializer};

/// A playable item as reported by the audio engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub url: String,
    /// Zero for live streams
    pub duration_ms: u64,
}

/// Lifecycle of a guild's playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Connecting,
    Playing,
    Paused,
    Stopped,
}

/// Complete playback state of one guild.
///
/// Published wholesale after every successful command; consumers replace
/// whatever they held before.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    #[serde(serialize_with = "id_as_string")]
    pub guild_id: u64,
    pub state: PlaybackState,
    pub is_playing: bool,
    pub is_paused: bool,
    pub current: Option<Track>,
    pub position_ms: u64,
    pub queue: Vec<Track>,
}

impl PlaybackSnapshot {
    pub fn idle(guild_id: u64) -> Self {
        Self {
            guild_id,
            state: PlaybackState::Idle,
            is_playing: false,
            is_paused: false,
            current: None,
            position_ms: 0,
            queue: Vec::new(),
        }
    }
}

// Snowflakes exceed the integer precision of JavaScript clients
fn id_as_string<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_string())
}

/// Human-readable track length: `Live`, `m:ss` or `h:mm:ss`.
pub fn format_duration(duration_ms: u64) -> String {
    if duration_ms == 0 {
        return "Live".to_string();
    }

    let total_seconds = duration_ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours >= 1 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
