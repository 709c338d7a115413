use crate::auth::oauth::{
    SCOPES, StateStore, generate_state_token, sanitize_return_url, store_state, take_state,
};
use crate::auth::store::CredentialStore;
use crate::auth::token::TokenManager;
use crate::db::models::OAuthToken;
use crate::db::repository::upsert_discord_user;
use crate::discord::client::{DiscordClient, UserToken};
use crate::error::AppError;
use crate::session::{SESSION_COOKIE, SessionStore};
use axum::{
    Json, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthorizationCode, CsrfToken, Scope, TokenResponse};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Discord access tokens live for a week when `expires_in` is omitted.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 604_800;

/// Application state for authentication routes
#[derive(Clone)]
pub struct AuthState {
    pub oauth_client: BasicClient,
    pub state_store: StateStore,
    pub sessions: SessionStore,
    pub tokens: TokenManager,
    pub discord: DiscordClient,
    pub pool: Option<PgPool>,
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default, alias = "returnUrl")]
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

pub fn routes(state: AuthState) -> Router {
    Router::new()
        .route("/api/auth/discord/login", get(login))
        .route("/api/auth/discord/callback", get(callback))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .with_state(state)
}

/// Initiates the Discord OAuth flow
///
/// # Endpoint
/// GET /api/auth/discord/login?return_url=/dashboard
///
/// # Flow
/// 1. Generate a random state token
/// 2. Store it with the post-login return URL
/// 3. Redirect to Discord's authorize page with `identify guilds`
pub async fn login(
    State(state): State<AuthState>,
    Query(params): Query<LoginQuery>,
) -> Result<Redirect, AppError> {
    let return_url = sanitize_return_url(params.return_url.as_deref());
    let state_token = generate_state_token();
    store_state(&state.state_store, state_token.clone(), return_url.clone());

    let (auth_url, _csrf_token) = state
        .oauth_client
        .authorize_url(|| CsrfToken::new(state_token))
        .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .url();

    tracing::info!(return_url = %return_url, "Redirecting to Discord authorization");

    Ok(Redirect::to(auth_url.as_str()))
}

/// Completes the Discord OAuth flow
///
/// # Endpoint
/// GET /api/auth/discord/callback?code=<CODE>&state=<STATE>
///
/// # Flow
/// 1. Consume the state token
/// 2. Exchange the code for tokens
/// 3. Fetch the Discord user with the new access token
/// 4. Persist the user and their token, start a session
/// 5. Redirect to the stored return URL
pub async fn callback(
    State(state): State<AuthState>,
    jar: CookieJar,
    Query(params): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let pending = take_state(&state.state_store, &params.state)?;

    let token_result = state
        .oauth_client
        .exchange_code(AuthorizationCode::new(params.code))
        .request_async(async_http_client)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Authorization code exchange failed");
            AppError::BadRequest("Discord authorization failed".to_string())
        })?;

    let access_token = token_result.access_token().secret().to_string();
    let user = state
        .discord
        .get_current_user(&UserToken::new(access_token.clone()))
        .await?;

    let owner_id = user.id.parse::<u64>().map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Invalid Discord user id {}: {}", user.id, e))
    })?;

    let expires_in = token_result
        .expires_in()
        .map(|d| Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Duration::seconds(DEFAULT_EXPIRES_IN_SECONDS));

    let scope = token_result
        .scopes()
        .map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| SCOPES.join(" "));

    let token = OAuthToken {
        owner_id,
        access_token,
        refresh_token: token_result
            .refresh_token()
            .map(|t| t.secret().to_string())
            .unwrap_or_default(),
        scope,
        expires_at: Utc::now() + expires_in,
    };

    if let Some(pool) = &state.pool {
        upsert_discord_user(pool, owner_id, &user.username).await?;
    }
    state.tokens.store().upsert(&token).await?;

    let cookie_value = state.sessions.create(owner_id, &user.username);

    tracing::info!(
        owner_id = owner_id,
        username = %user.username,
        "Discord login completed"
    );

    Ok((
        jar.add(state.sessions.cookie(cookie_value)),
        Redirect::to(&pending.return_url),
    ))
}

/// Ends the current session
///
/// # Endpoint
/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AuthState>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.destroy(cookie.value());
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "ok": true })))
}

/// Reports who is logged in
///
/// # Endpoint
/// GET /api/auth/me
pub async fn me(State(state): State<AuthState>, jar: CookieJar) -> Json<MeResponse> {
    let response = match state.sessions.current(&jar) {
        Some(session) => MeResponse {
            authenticated: true,
            discord_user_id: Some(session.owner_id.to_string()),
            username: Some(session.username),
        },
        None => MeResponse {
            authenticated: false,
            discord_user_id: None,
            username: None,
        },
    };

    Json(response)
}
