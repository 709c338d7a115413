use crate::error::AppError;
use crate::playback::models::Track;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("URL pattern is valid")
});

/// Whether retrieving a session may connect the bot to a voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Connect to the member's channel if the bot is not already there
    Join,
    /// Only reuse an existing connection
    None,
}

/// Player status as observed on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    NotPlaying,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackQuery {
    Url(String),
    Search(String),
}

impl TrackQuery {
    /// Direct URLs are loaded as-is, anything else is searched.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if URL_PATTERN.is_match(raw) {
            TrackQuery::Url(raw.to_string())
        } else {
            TrackQuery::Search(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrackQuery::Url(s) | TrackQuery::Search(s) => s,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("member is not connected to a voice channel")]
    UserNotInVoiceChannel,

    #[error("bot is not connected to voice in this guild")]
    NotConnected,

    #[error("audio engine failure: {0}")]
    Failed(String),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UserNotInVoiceChannel => AppError::UserNotInVoice,
            EngineError::NotConnected => AppError::NothingPlaying,
            EngineError::Failed(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

/// Control surface of the remote audio engine.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    /// Get the guild's player, optionally connecting to `voice_channel`.
    async fn retrieve_session(
        &self,
        guild_id: u64,
        voice_channel: Option<u64>,
        policy: JoinPolicy,
    ) -> Result<Arc<dyn AudioPlayer>, EngineError>;

    async fn load_track(&self, query: &TrackQuery) -> Result<Option<Track>, EngineError>;
}

/// A queued player bound to one guild's voice connection.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Start `track`, or enqueue it behind the current one.
    async fn play(&self, track: Track) -> Result<(), EngineError>;
    async fn pause(&self) -> Result<(), EngineError>;
    async fn resume(&self) -> Result<(), EngineError>;
    /// Advance to the next queued track, or stop when the queue is empty.
    async fn skip(&self) -> Result<(), EngineError>;
    /// Stop playback and clear the queue.
    async fn stop(&self) -> Result<(), EngineError>;
    /// Leave the voice channel.
    async fn disconnect(&self) -> Result<(), EngineError>;

    fn status(&self) -> PlayerStatus;
    fn current_track(&self) -> Option<Track>;
    fn queue(&self) -> Vec<Track>;
    fn position(&self) -> Duration;
}
