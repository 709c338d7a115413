use crate::playback::engine::{
    AudioEngine, AudioPlayer, EngineError, JoinPolicy, PlayerStatus, TrackQuery,
};
use crate::playback::models::Track;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Audio engine that keeps every guild's player in process memory.
///
/// Direct URLs always resolve; searches only match titles registered with
/// [`InMemoryAudioEngine::add_track`].
#[derive(Default)]
pub struct InMemoryAudioEngine {
    players: Arc<DashMap<u64, Arc<InMemoryPlayer>>>,
    catalog: Mutex<Vec<Track>>,
}

impl InMemoryAudioEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: Track) {
        lock(&self.catalog).push(track);
    }

    /// Voice channel the bot currently occupies in `guild_id`
    pub fn connected_channel(&self, guild_id: u64) -> Option<u64> {
        self.players.get(&guild_id).map(|p| p.voice_channel)
    }
}

#[async_trait]
impl AudioEngine for InMemoryAudioEngine {
    async fn retrieve_session(
        &self,
        guild_id: u64,
        voice_channel: Option<u64>,
        policy: JoinPolicy,
    ) -> Result<Arc<dyn AudioPlayer>, EngineError> {
        if let Some(existing) = self.players.get(&guild_id) {
            let player: Arc<dyn AudioPlayer> = existing.clone();
            return Ok(player);
        }

        match policy {
            JoinPolicy::None => Err(EngineError::NotConnected),
            JoinPolicy::Join => {
                let channel = voice_channel.ok_or(EngineError::UserNotInVoiceChannel)?;
                tracing::debug!(guild_id, channel, "Joining voice channel");

                let player = Arc::new(InMemoryPlayer::new(
                    guild_id,
                    channel,
                    Arc::clone(&self.players),
                ));
                self.players.insert(guild_id, Arc::clone(&player));
                Ok(player)
            }
        }
    }

    async fn load_track(&self, query: &TrackQuery) -> Result<Option<Track>, EngineError> {
        match query {
            TrackQuery::Url(url) => {
                let known = lock(&self.catalog).iter().find(|t| &t.url == url).cloned();
                Ok(Some(known.unwrap_or_else(|| Track {
                    title: url.clone(),
                    url: url.clone(),
                    duration_ms: 0,
                })))
            }
            TrackQuery::Search(terms) => {
                let terms = terms.to_lowercase();
                Ok(lock(&self.catalog)
                    .iter()
                    .find(|t| t.title.to_lowercase().contains(&terms))
                    .cloned())
            }
        }
    }
}

#[derive(Debug, Default)]
struct PlayerInner {
    status: Option<PlayerStatus>,
    current: Option<Track>,
    queue: VecDeque<Track>,
    played: Duration,
    resumed_at: Option<Instant>,
}

impl PlayerInner {
    fn start(&mut self, track: Track) {
        self.current = Some(track);
        self.status = Some(PlayerStatus::Playing);
        self.played = Duration::ZERO;
        self.resumed_at = Some(Instant::now());
    }

    fn halt(&mut self) {
        self.current = None;
        self.status = None;
        self.played = Duration::ZERO;
        self.resumed_at = None;
    }
}

pub struct InMemoryPlayer {
    guild_id: u64,
    voice_channel: u64,
    inner: Mutex<PlayerInner>,
    registry: Arc<DashMap<u64, Arc<InMemoryPlayer>>>,
}

impl InMemoryPlayer {
    fn new(
        guild_id: u64,
        voice_channel: u64,
        registry: Arc<DashMap<u64, Arc<InMemoryPlayer>>>,
    ) -> Self {
        Self {
            guild_id,
            voice_channel,
            inner: Mutex::new(PlayerInner::default()),
            registry,
        }
    }
}

#[async_trait]
impl AudioPlayer for InMemoryPlayer {
    async fn play(&self, track: Track) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if inner.current.is_some() {
            inner.queue.push_back(track);
        } else {
            inner.start(track);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if inner.status == Some(PlayerStatus::Playing) {
            if let Some(resumed_at) = inner.resumed_at.take() {
                inner.played += resumed_at.elapsed();
            }
            inner.status = Some(PlayerStatus::Paused);
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        if inner.status == Some(PlayerStatus::Paused) {
            inner.resumed_at = Some(Instant::now());
            inner.status = Some(PlayerStatus::Playing);
        }
        Ok(())
    }

    async fn skip(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        match inner.queue.pop_front() {
            Some(next) => inner.start(next),
            None => inner.halt(),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), EngineError> {
        let mut inner = lock(&self.inner);
        inner.queue.clear();
        inner.halt();
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), EngineError> {
        self.stop().await?;
        self.registry.remove(&self.guild_id);
        tracing::debug!(guild_id = self.guild_id, "Left voice channel");
        Ok(())
    }

    fn status(&self) -> PlayerStatus {
        lock(&self.inner).status.unwrap_or(PlayerStatus::NotPlaying)
    }

    fn current_track(&self) -> Option<Track> {
        lock(&self.inner).current.clone()
    }

    fn queue(&self) -> Vec<Track> {
        lock(&self.inner).queue.iter().cloned().collect()
    }

    fn position(&self) -> Duration {
        let inner = lock(&self.inner);
        inner.played + inner.resumed_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

// Player state stays consistent even if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            url: format!("https://example.com/{}", title),
            duration_ms: 180_000,
        }
    }

    #[tokio::test]
    async fn test_join_requires_voice_channel() {
        let engine = InMemoryAudioEngine::new();

        let result = engine.retrieve_session(1, None, JoinPolicy::Join).await;
        assert!(matches!(result, Err(EngineError::UserNotInVoiceChannel)));

        let result = engine.retrieve_session(1, Some(7), JoinPolicy::None).await;
        assert!(matches!(result, Err(EngineError::NotConnected)));
        assert_eq!(engine.connected_channel(1), None);
    }

    #[tokio::test]
    async fn test_play_queues_behind_current_track() {
        let engine = InMemoryAudioEngine::new();
        let player = engine
            .retrieve_session(1, Some(7), JoinPolicy::Join)
            .await
            .unwrap();

        player.play(track("first")).await.unwrap();
        player.play(track("second")).await.unwrap();

        assert_eq!(player.status(), PlayerStatus::Playing);
        assert_eq!(player.current_track().unwrap().title, "first");
        assert_eq!(player.queue(), vec![track("second")]);

        player.skip().await.unwrap();
        assert_eq!(player.current_track().unwrap().title, "second");

        player.skip().await.unwrap();
        assert_eq!(player.status(), PlayerStatus::NotPlaying);
        assert!(player.current_track().is_none());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let engine = InMemoryAudioEngine::new();
        let player = engine
            .retrieve_session(1, Some(7), JoinPolicy::Join)
            .await
            .unwrap();
        player.play(track("first")).await.unwrap();

        player.pause().await.unwrap();
        assert_eq!(player.status(), PlayerStatus::Paused);
        let frozen = player.position();
        assert_eq!(player.position(), frozen);

        player.resume().await.unwrap();
        assert_eq!(player.status(), PlayerStatus::Playing);
    }

    #[tokio::test]
    async fn test_disconnect_releases_player() {
        let engine = InMemoryAudioEngine::new();
        let player = engine
            .retrieve_session(1, Some(7), JoinPolicy::Join)
            .await
            .unwrap();
        assert_eq!(engine.connected_channel(1), Some(7));

        player.disconnect().await.unwrap();

        assert_eq!(engine.connected_channel(1), None);
        let result = engine.retrieve_session(1, None, JoinPolicy::None).await;
        assert!(matches!(result, Err(EngineError::NotConnected)));
    }

    #[tokio::test]
    async fn test_load_track() {
        let engine = InMemoryAudioEngine::new();
        engine.add_track(track("Bohemian Rhapsody"));

        let found = engine
            .load_track(&TrackQuery::Search("bohemian".to_string()))
            .await
            .unwrap();
        assert_eq!(found.unwrap().title, "Bohemian Rhapsody");

        let missing = engine
            .load_track(&TrackQuery::Search("nothing like it".to_string()))
            .await
            .unwrap();
        assert!(missing.is_none());

        let direct = engine
            .load_track(&TrackQuery::Url("https://example.com/live".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(direct.url, "https://example.com/live");
        assert_eq!(direct.duration_ms, 0);
    }
}
