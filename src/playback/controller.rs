use crate::error::AppError;
use crate::playback::cache::{SnapshotCache, SnapshotHub};
use crate::playback::command::{CommandRequest, PlaybackCommand};
use crate::playback::engine::{
    AudioEngine, AudioPlayer, EngineError, JoinPolicy, PlayerStatus, TrackQuery,
};
use crate::playback::models::{PlaybackSnapshot, PlaybackState};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct GuildSession {
    state: PlaybackState,
}

/// Applies playback commands to per-guild sessions.
///
/// Commands for the same guild run one at a time; different guilds never
/// wait on each other. Every successful command replaces the guild's cached
/// snapshot and publishes it to subscribers.
#[derive(Clone)]
pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    sessions: Arc<DashMap<u64, Arc<Mutex<GuildSession>>>>,
    cache: Arc<SnapshotCache>,
    hub: Arc<SnapshotHub>,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        cache: Arc<SnapshotCache>,
        hub: Arc<SnapshotHub>,
    ) -> Self {
        Self {
            engine,
            sessions: Arc::new(DashMap::new()),
            cache,
            hub,
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn hub(&self) -> &SnapshotHub {
        &self.hub
    }

    pub async fn execute(&self, request: CommandRequest) -> Result<PlaybackSnapshot, AppError> {
        if let Err(err) = request.check_guild() {
            tracing::warn!(
                guild_id = request.guild_id,
                embedded_guild_id = ?request.embedded_guild_id,
                actor_id = request.actor_id,
                "Rejected control aimed at another guild"
            );
            return Err(err);
        }

        let guild_id = request.guild_id;
        let session = self.sessions.entry(guild_id).or_default().value().clone();

        // Dropping this future mid-command releases the guard
        let mut session = session.lock_owned().await;

        let snapshot = self.apply(&mut session, &request).await.inspect_err(|err| {
            tracing::debug!(
                guild_id,
                command = request.command.name(),
                error = %err,
                "Playback command failed"
            );
        })?;

        self.cache.set(snapshot.clone());
        let delivered = self.hub.publish(&snapshot);

        tracing::info!(
            guild_id,
            actor_id = request.actor_id,
            command = request.command.name(),
            state = ?session.state,
            subscribers = delivered,
            "Playback command applied"
        );

        Ok(snapshot)
    }

    async fn apply(
        &self,
        session: &mut GuildSession,
        request: &CommandRequest,
    ) -> Result<PlaybackSnapshot, AppError> {
        let guild_id = request.guild_id;

        match &request.command {
            PlaybackCommand::Play { query } => {
                let channel = request.actor_voice_channel.ok_or(AppError::UserNotInVoice)?;
                self.play(session, guild_id, channel, query).await
            }
            PlaybackCommand::Pause => {
                let player = self.connected(session, guild_id).await?;
                match session.state {
                    PlaybackState::Playing => player.pause().await?,
                    PlaybackState::Paused => {}
                    _ => return Err(AppError::NothingPlaying),
                }
                Ok(settle(session, guild_id, player.as_ref()))
            }
            PlaybackCommand::Resume => {
                let player = self.connected(session, guild_id).await?;
                match session.state {
                    PlaybackState::Paused => player.resume().await?,
                    PlaybackState::Playing => {}
                    _ => return Err(AppError::NothingPlaying),
                }
                Ok(settle(session, guild_id, player.as_ref()))
            }
            PlaybackCommand::Toggle => {
                let player = self.connected(session, guild_id).await?;
                match session.state {
                    PlaybackState::Playing => player.pause().await?,
                    PlaybackState::Paused => player.resume().await?,
                    _ => return Err(AppError::NothingPlaying),
                }
                Ok(settle(session, guild_id, player.as_ref()))
            }
            PlaybackCommand::Skip => {
                let player = self.connected(session, guild_id).await?;
                if player.current_track().is_none() {
                    return Err(AppError::NothingPlaying);
                }
                player.skip().await?;
                Ok(settle(session, guild_id, player.as_ref()))
            }
            PlaybackCommand::Stop => {
                let player = self.connected(session, guild_id).await?;
                if player.current_track().is_none() {
                    return Err(AppError::NothingPlaying);
                }
                release(session, guild_id, player.as_ref(), PlaybackState::Stopped).await
            }
            PlaybackCommand::Leave => {
                let player = self.connected(session, guild_id).await?;
                release(session, guild_id, player.as_ref(), PlaybackState::Idle).await
            }
        }
    }

    /// The guild's existing player, with the recorded state brought in line
    /// with what the engine reports.
    async fn connected(
        &self,
        session: &mut GuildSession,
        guild_id: u64,
    ) -> Result<Arc<dyn AudioPlayer>, AppError> {
        match self
            .engine
            .retrieve_session(guild_id, None, JoinPolicy::None)
            .await
        {
            Ok(player) => {
                // An interrupted command may have left the recorded state behind
                session.state = observed_state(player.status());
                Ok(player)
            }
            Err(EngineError::NotConnected) => {
                // Also where a released `Stopped` session settles into `Idle`
                session.state = PlaybackState::Idle;
                Err(AppError::NothingPlaying)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn play(
        &self,
        session: &mut GuildSession,
        guild_id: u64,
        channel: u64,
        query: &str,
    ) -> Result<PlaybackSnapshot, AppError> {
        let mut connecting = Connecting::begin(session);

        let player = self
            .engine
            .retrieve_session(guild_id, Some(channel), JoinPolicy::Join)
            .await?;
        connecting.fallback = observed_state(player.status());

        let query = TrackQuery::parse(query);
        let Some(track) = self.engine.load_track(&query).await? else {
            return Err(AppError::TrackNotFound(query.as_str().to_string()));
        };
        player.play(track).await?;

        drop(connecting);
        Ok(settle(session, guild_id, player.as_ref()))
    }
}

/// Marks a session `Connecting` while a play is in progress.
///
/// Dropping the guard writes `fallback` back to the session, including when
/// the command errors or its future is dropped.
struct Connecting<'a> {
    session: &'a mut GuildSession,
    fallback: PlaybackState,
}

impl<'a> Connecting<'a> {
    fn begin(session: &'a mut GuildSession) -> Self {
        let fallback = session.state;
        if matches!(fallback, PlaybackState::Idle | PlaybackState::Stopped) {
            session.state = PlaybackState::Connecting;
        }
        Self { session, fallback }
    }
}

impl Drop for Connecting<'_> {
    fn drop(&mut self) {
        self.session.state = self.fallback;
    }
}

fn observed_state(status: PlayerStatus) -> PlaybackState {
    match status {
        PlayerStatus::Playing => PlaybackState::Playing,
        PlayerStatus::Paused => PlaybackState::Paused,
        PlayerStatus::NotPlaying => PlaybackState::Idle,
    }
}

fn settle(session: &mut GuildSession, guild_id: u64, player: &dyn AudioPlayer) -> PlaybackSnapshot {
    session.state = observed_state(player.status());
    snapshot_of(guild_id, session.state, player)
}

/// Stops playback and leaves voice, ending in `end` (`Stopped` or `Idle`).
async fn release(
    session: &mut GuildSession,
    guild_id: u64,
    player: &dyn AudioPlayer,
    end: PlaybackState,
) -> Result<PlaybackSnapshot, AppError> {
    player.stop().await?;
    player.disconnect().await?;
    session.state = end;
    Ok(PlaybackSnapshot {
        state: end,
        ..PlaybackSnapshot::idle(guild_id)
    })
}

fn snapshot_of(guild_id: u64, state: PlaybackState, player: &dyn AudioPlayer) -> PlaybackSnapshot {
    let status = player.status();
    PlaybackSnapshot {
        guild_id,
        state,
        is_playing: status == PlayerStatus::Playing,
        is_paused: status == PlayerStatus::Paused,
        current: player.current_track(),
        position_ms: player.position().as_millis() as u64,
        queue: player.queue(),
    }
}
