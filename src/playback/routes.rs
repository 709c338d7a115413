use crate::error::AppError;
use crate::playback::command::{
    ButtonComponent, CommandRequest, PlaybackCommand, now_playing_controls,
};
use crate::playback::controller::PlaybackController;
use crate::playback::models::{PlaybackSnapshot, format_duration};
use crate::playback::verification::{
    SIGNATURE_HEADER, TIMESTAMP_HEADER, verify_interaction_signature,
};
use crate::session::SessionStore;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

/// Application state for playback routes
#[derive(Clone)]
pub struct MusicState {
    pub controller: PlaybackController,
    pub sessions: SessionStore,
    /// Shared with the gateway bridge to sign interaction bodies
    pub interactions_secret: String,
}

pub fn routes(state: MusicState) -> Router {
    Router::new()
        .route("/api/interactions", post(interactions))
        .route("/api/music/guilds/{guild_id}/state", get(guild_state))
        .route("/api/music/guilds/{guild_id}/events", get(guild_events))
        .with_state(state)
}

/// Interaction delivered by the gateway bridge.
///
/// Exactly one of `custom_id` (button) or `command` (slash) is set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub guild_id: Option<String>,
    pub actor_id: String,
    pub voice_channel_id: Option<String>,
    pub custom_id: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionReply {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PlaybackSnapshot>,
    /// Mention of the actor who queued the track
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ButtonComponent>,
}

impl InteractionReply {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            snapshot: None,
            requested_by: None,
            components: Vec::new(),
        }
    }
}

/// Slash command or button press
///
/// # Endpoint
/// POST /api/interactions
///
/// # Headers
/// - `X-Kestrelle-Request-Timestamp`: Unix seconds
/// - `X-Kestrelle-Signature`: `v0=` + hex HMAC-SHA256 of `v0:{timestamp}:{body}`
///
/// # Errors
/// - 401 when the signature is missing, stale or wrong
/// - 400 for a body that is not an interaction
///
/// Command failures are rendered into the reply for the actor instead of an
/// error status.
pub async fn interactions(
    State(state): State<MusicState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionReply>, AppError> {
    let timestamp = headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureMissing)?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureMissing)?;

    verify_interaction_signature(&state.interactions_secret, timestamp, &body, signature)?;

    let interaction: InteractionRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!("Failed to parse interaction: {:?}", e);
        AppError::BadRequest(format!("Invalid JSON: {}", e))
    })?;

    Ok(Json(reply_to(&state.controller, &interaction).await))
}

async fn reply_to(
    controller: &PlaybackController,
    interaction: &InteractionRequest,
) -> InteractionReply {
    let Some(guild_id) = interaction.guild_id.as_deref() else {
        return InteractionReply::failed("This command can only be used in a server.");
    };

    let request = match decode(guild_id, interaction) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "Rejected interaction");
            return InteractionReply::failed(failure_message(&err, interaction));
        }
    };

    let command = request.command.clone();
    let (guild_id, actor_id) = (request.guild_id, request.actor_id);
    match controller.execute(request).await {
        Ok(snapshot) => {
            let (requested_by, components) = match command {
                PlaybackCommand::Play { .. } => (
                    Some(format!("<@{}>", actor_id)),
                    now_playing_controls(guild_id),
                ),
                _ => (None, Vec::new()),
            };
            InteractionReply {
                ok: true,
                message: success_message(&command, &snapshot),
                snapshot: Some(snapshot),
                requested_by,
                components,
            }
        }
        Err(err) => {
            if matches!(err, AppError::Internal(_) | AppError::Database(_)) {
                tracing::error!(error = ?err, command = command.name(), "Playback command failed");
            }
            InteractionReply::failed(failure_message(&err, interaction))
        }
    }
}

/// Text shown to the actor; malformed slash input is not a button problem.
fn failure_message(err: &AppError, interaction: &InteractionRequest) -> String {
    match err {
        AppError::InvalidCommandPayload(_) if interaction.custom_id.is_none() => {
            "Invalid command.".to_string()
        }
        _ => err.user_message(),
    }
}

fn decode(guild_id: &str, interaction: &InteractionRequest) -> Result<CommandRequest, AppError> {
    let guild_id = parse_id(guild_id, "guildId")?;
    let actor_id = parse_id(&interaction.actor_id, "actorId")?;
    let voice = interaction
        .voice_channel_id
        .as_deref()
        .map(|id| parse_id(id, "voiceChannelId"))
        .transpose()?;

    match (&interaction.custom_id, &interaction.command) {
        (Some(custom_id), None) => CommandRequest::button(guild_id, actor_id, voice, custom_id),
        (None, Some(name)) => {
            let command = PlaybackCommand::from_slash(name, &interaction.args)?;
            Ok(CommandRequest::slash(guild_id, actor_id, voice, command))
        }
        _ => Err(AppError::InvalidCommandPayload(
            "expected exactly one of customId or command".to_string(),
        )),
    }
}

fn parse_id(value: &str, field: &str) -> Result<u64, AppError> {
    value
        .parse::<u64>()
        .map_err(|_| AppError::InvalidCommandPayload(format!("{} is not a snowflake", field)))
}

fn success_message(command: &PlaybackCommand, snapshot: &PlaybackSnapshot) -> String {
    match command {
        PlaybackCommand::Play { .. } => match (&snapshot.current, snapshot.queue.last()) {
            (_, Some(queued)) => format!(
                "Queued: {} ({})",
                queued.title,
                format_duration(queued.duration_ms)
            ),
            (Some(current), None) => format!(
                "Now playing: {} ({})",
                current.title,
                format_duration(current.duration_ms)
            ),
            (None, None) => "Queued.".to_string(),
        },
        PlaybackCommand::Pause => "Paused.".to_string(),
        PlaybackCommand::Resume => "Resumed.".to_string(),
        PlaybackCommand::Toggle if snapshot.is_paused => "Paused.".to_string(),
        PlaybackCommand::Toggle => "Resumed.".to_string(),
        PlaybackCommand::Skip => match &snapshot.current {
            Some(next) => format!("Skipped. Now playing: {}", next.title),
            None => "Skipped. Stopped playing because the queue is now empty.".to_string(),
        },
        PlaybackCommand::Stop => "Stopped playing.".to_string(),
        PlaybackCommand::Leave => "Disconnected.".to_string(),
    }
}

/// Last published snapshot of a guild
///
/// # Endpoint
/// GET /api/music/guilds/{guild_id}/state
///
/// # Errors
/// - 401 without a session
/// - 404 when nothing was published for the guild yet
pub async fn guild_state(
    State(state): State<MusicState>,
    jar: CookieJar,
    Path(guild_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>, AppError> {
    state.sessions.require(&jar)?;

    let guild_id = guild_id
        .parse::<u64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid guild id: {}", guild_id)))?;

    state
        .controller
        .cache()
        .get(guild_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No playback state for guild {}", guild_id)))
}

/// Live snapshots of a guild as server-sent events
///
/// # Endpoint
/// GET /api/music/guilds/{guild_id}/events
///
/// Joins the `guild:{id}` group; only snapshots published after joining
/// are sent.
pub async fn guild_events(
    State(state): State<MusicState>,
    jar: CookieJar,
    Path(guild_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let session = state.sessions.require(&jar)?;

    let guild_id = guild_id
        .parse::<u64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid guild id: {}", guild_id)))?;

    tracing::debug!(owner_id = session.owner_id, guild_id, "Subscriber joined");

    let rx = state.controller.hub().subscribe(guild_id);
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    let event = Event::default().event("snapshot").json_data(&snapshot);
                    return Some((event, rx));
                }
                // Snapshots are whole; the next one supersedes what was missed
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::cache::{SnapshotCache, SnapshotHub};
    use crate::playback::memory::InMemoryAudioEngine;
    use crate::playback::models::Track;
    use crate::playback::verification::sign_interaction;
    use crate::session::SESSION_COOKIE;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> MusicState {
        let engine = InMemoryAudioEngine::new();
        engine.add_track(Track {
            title: "Clair de Lune".to_string(),
            url: "https://example.com/clair".to_string(),
            duration_ms: 303_000,
        });
        MusicState {
            controller: PlaybackController::new(
                Arc::new(engine),
                Arc::new(SnapshotCache::new()),
                Arc::new(SnapshotHub::new()),
            ),
            sessions: SessionStore::new("test-secret").unwrap(),
            interactions_secret: "bridge-secret".to_string(),
        }
    }

    fn interaction(body: &str, timestamp: i64, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/interactions")
            .header(header::CONTENT_TYPE, "application/json")
            .header(TIMESTAMP_HEADER, timestamp.to_string());
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn signed(body: &Value) -> Request<Body> {
        let body = body.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature =
            sign_interaction("bridge-secret", &timestamp.to_string(), body.as_bytes()).unwrap();
        interaction(&body, timestamp, Some(signature))
    }

    async fn send(app: Router, body: Value) -> Value {
        let response = app.oneshot(signed(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_play_then_toggle_button() {
        let state = test_state();

        let reply = send(
            routes(state.clone()),
            json!({
                "guildId": "222",
                "actorId": "5",
                "voiceChannelId": "77",
                "command": "play",
                "args": ["clair"]
            }),
        )
        .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["message"], "Now playing: Clair de Lune (5:03)");
        assert_eq!(reply["snapshot"]["guildId"], "222");
        assert_eq!(reply["snapshot"]["state"], "playing");
        assert_eq!(reply["requestedBy"], "<@5>");
        let custom_ids: Vec<&str> = reply["components"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["customId"].as_str().unwrap())
            .collect();
        assert_eq!(custom_ids, ["np:toggle:222", "np:skip:222", "np:stop:222"]);

        let reply = send(
            routes(state),
            json!({ "guildId": "222", "actorId": "5", "customId": "np:toggle:222" }),
        )
        .await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["message"], "Paused.");
        assert_eq!(reply["snapshot"]["isPaused"], true);
        assert_eq!(reply["snapshot"]["state"], "paused");
        assert!(reply.get("components").is_none());
    }

    #[tokio::test]
    async fn test_failures_are_rendered_for_actor() {
        let state = test_state();

        let reply = send(
            routes(state.clone()),
            json!({ "actorId": "5", "command": "pause" }),
        )
        .await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["message"], "This command can only be used in a server.");

        let reply = send(
            routes(state.clone()),
            json!({ "guildId": "222", "actorId": "5", "customId": "np:toggle:111" }),
        )
        .await;
        assert_eq!(reply["message"], "This control is not for this server.");
        assert!(reply.get("snapshot").is_none());

        let reply = send(
            routes(state.clone()),
            json!({ "guildId": "222", "actorId": "5", "customId": "np:toggle" }),
        )
        .await;
        assert_eq!(reply["message"], "Invalid button payload.");

        let reply = send(
            routes(state.clone()),
            json!({ "guildId": "222", "actorId": "5", "command": "shuffle" }),
        )
        .await;
        assert_eq!(reply["message"], "Invalid command.");

        let reply = send(
            routes(state.clone()),
            json!({ "guildId": "222", "actorId": "5", "command": "skip", "args": ["now"] }),
        )
        .await;
        assert_eq!(reply["message"], "Invalid command.");

        let reply = send(
            routes(state),
            json!({ "guildId": "222", "actorId": "5", "command": "pause" }),
        )
        .await;
        assert_eq!(reply["message"], "Nothing is currently playing.");
    }

    #[tokio::test]
    async fn test_unverified_interactions_are_rejected() {
        let state = test_state();
        let play = json!({
            "guildId": "222",
            "actorId": "5",
            "voiceChannelId": "77",
            "command": "play",
            "args": ["clair"]
        })
        .to_string();
        let now = chrono::Utc::now().timestamp();

        // No signature header
        let response = routes(state.clone())
            .oneshot(interaction(&play, now, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Signed for a different body
        let signature = sign_interaction("bridge-secret", &now.to_string(), b"{}").unwrap();
        let response = routes(state.clone())
            .oneshot(interaction(&play, now, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Correctly signed but replayed after the window
        let stale = now - 600;
        let signature =
            sign_interaction("bridge-secret", &stale.to_string(), play.as_bytes()).unwrap();
        let response = routes(state.clone())
            .oneshot(interaction(&play, stale, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert!(state.controller.cache().get(222).is_none());
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let body = Value::String("not an interaction".to_string());

        let response = routes(test_state()).oneshot(signed(&body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_guild_state_requires_session() {
        let response = routes(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/music/guilds/222/state")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guild_state_returns_last_snapshot() {
        let state = test_state();
        let cookie = state.sessions.create(5, "listener");
        let get_state = |guild: &str| {
            Request::builder()
                .uri(format!("/api/music/guilds/{}/state", guild))
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, cookie))
                .body(Body::empty())
                .unwrap()
        };

        let response = routes(state.clone())
            .oneshot(get_state("222"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        send(
            routes(state.clone()),
            json!({
                "guildId": "222",
                "actorId": "5",
                "voiceChannelId": "77",
                "command": "play",
                "args": ["https://example.com/clair"]
            }),
        )
        .await;

        let response = routes(state).oneshot(get_state("222")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot["isPlaying"], true);
        assert_eq!(snapshot["current"]["title"], "Clair de Lune");
    }

    #[tokio::test]
    async fn test_guild_events_stream_later_snapshots() {
        use futures::StreamExt;

        let state = test_state();
        let cookie = state.sessions.create(5, "listener");

        let response = routes(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/music/guilds/222/events")
                    .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, cookie))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        state
            .controller
            .execute(CommandRequest::slash(
                222,
                5,
                Some(77),
                PlaybackCommand::Play {
                    query: "clair".to_string(),
                },
            ))
            .await
            .unwrap();

        let mut body = response.into_body().into_data_stream();
        let frame = body.next().await.unwrap().unwrap();
        let frame = String::from_utf8(frame.to_vec()).unwrap();

        assert!(frame.contains("event: snapshot"));
        assert!(frame.contains("\"guildId\":\"222\""));
        assert!(frame.contains("Clair de Lune"));
    }
}
