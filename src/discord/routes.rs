use crate::discord::guilds::GuildResolver;
use crate::discord::models::{GuildSummary, VoiceChannelSummary};
use crate::error::AppError;
use crate::session::SessionStore;
use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;

/// Application state for Discord guild routes
#[derive(Clone)]
pub struct GuildState {
    pub resolver: GuildResolver,
    pub sessions: SessionStore,
}

pub fn routes(state: GuildState) -> Router {
    Router::new()
        .route("/api/discord/available-guilds", get(available_guilds))
        .route(
            "/api/discord/guilds/{guild_id}/voice-channels",
            get(voice_channels),
        )
        .with_state(state)
}

/// Guilds the logged-in user shares with the bot
///
/// # Endpoint
/// GET /api/discord/available-guilds
///
/// # Errors
/// - 401 without a session or when the Discord token cannot be refreshed
/// - 502 when Discord rejects a request
pub async fn available_guilds(
    State(state): State<GuildState>,
    jar: CookieJar,
) -> Result<Json<Vec<GuildSummary>>, AppError> {
    let session = state.sessions.current(&jar);
    let guilds = state.resolver.resolve_available(session.as_ref()).await?;
    Ok(Json(guilds))
}

/// Voice channels of a guild, for choosing where the bot plays
///
/// # Endpoint
/// GET /api/discord/guilds/{guild_id}/voice-channels
pub async fn voice_channels(
    State(state): State<GuildState>,
    jar: CookieJar,
    Path(guild_id): Path<String>,
) -> Result<Json<Vec<VoiceChannelSummary>>, AppError> {
    let session = state.sessions.require(&jar)?;

    if guild_id.parse::<u64>().is_err() {
        return Err(AppError::BadRequest(format!("Invalid guild id: {}", guild_id)));
    }

    tracing::debug!(
        owner_id = session.owner_id,
        guild_id = %guild_id,
        "Listing voice channels"
    );

    let channels = state.resolver.voice_channels(&guild_id).await?;
    Ok(Json(channels))
}
