use crate::config::Config;
use crate::error::AppError;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{AuthType, AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// How long a login attempt may take before its state is rejected.
pub const STATE_TTL_MINUTES: i64 = 10;

/// Scopes needed for `/users/@me` and `/users/@me/guilds`.
pub const SCOPES: [&str; 2] = ["identify", "guilds"];

/// Pending login attempt, keyed by its CSRF state token.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub return_url: String,
    pub created_at: DateTime<Utc>,
}

pub type StateStore = Arc<RwLock<HashMap<String, OAuthState>>>;

/// Build the OAuth2 client for Discord.
///
/// Client credentials travel in the form body, which is what Discord's token
/// endpoint expects for both code exchange and refresh.
pub fn build_oauth_client(config: &Config) -> anyhow::Result<BasicClient> {
    let client = BasicClient::new(
        ClientId::new(config.discord_client_id.clone()),
        Some(ClientSecret::new(config.discord_client_secret.clone())),
        AuthUrl::new(config.discord_authorize_url.clone())?,
        Some(TokenUrl::new(config.discord_token_url.clone())?),
    )
    .set_auth_type(AuthType::RequestBody)
    .set_redirect_uri(RedirectUrl::new(config.discord_redirect_uri.clone())?);

    Ok(client)
}

/// 32 random bytes, URL-safe base64.
pub fn generate_state_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn store_state(store: &StateStore, state_token: String, return_url: String) {
    let mut states = match store.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    // Drop abandoned attempts so the map stays bounded
    let cutoff = Utc::now() - Duration::minutes(STATE_TTL_MINUTES);
    states.retain(|_, s| s.created_at > cutoff);

    states.insert(
        state_token,
        OAuthState {
            return_url,
            created_at: Utc::now(),
        },
    );
}

/// Consume a state token. Each token is accepted at most once.
pub fn take_state(store: &StateStore, state_token: &str) -> Result<OAuthState, AppError> {
    let mut states = match store.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let state = states
        .remove(state_token)
        .ok_or(AppError::OAuthStateNotFound)?;

    if state.created_at <= Utc::now() - Duration::minutes(STATE_TTL_MINUTES) {
        return Err(AppError::OAuthStateExpired);
    }

    Ok(state)
}

/// Only same-origin relative paths are accepted as post-login targets.
pub fn sanitize_return_url(return_url: Option<&str>) -> String {
    match return_url.map(str::trim) {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url.to_string(),
        _ => "/".to_string(),
    }
}
