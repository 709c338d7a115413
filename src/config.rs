use crate::discord::client::BotToken;
use crate::error::AppError;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Falls back to an in-memory credential store when absent
    pub database_url: Option<String>,

    pub discord_client_id: String,
    pub discord_client_secret: String,
    pub discord_redirect_uri: String,

    // Checked at startup by `bot_token()`
    pub discord_bot_token: Option<String>,

    #[serde(default = "default_discord_api_base")]
    pub discord_api_base: String,

    #[serde(default = "default_discord_authorize_url")]
    pub discord_authorize_url: String,

    #[serde(default = "default_discord_token_url")]
    pub discord_token_url: String,

    pub session_secret: String,

    /// Shared with the gateway bridge that signs `/api/interactions` calls
    pub interactions_secret: String,

    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_rust_log")]
    pub rust_log: String,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_discord_authorize_url() -> String {
    "https://discord.com/oauth2/authorize".to_string()
}

fn default_discord_token_url() -> String {
    "https://discord.com/api/oauth2/token".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_rust_log() -> String {
    "info,kestrelle=debug".to_string()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Build a config from explicit key/value pairs (upper-case env names).
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// The service-account credential.
    ///
    /// A missing or blank token is a deployment error, so callers are expected
    /// to resolve this once at startup and abort on failure.
    pub fn bot_token(&self) -> Result<BotToken, AppError> {
        match self.discord_bot_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(BotToken::new(token)),
            _ => Err(AppError::BotMisconfigured),
        }
    }
}
