pub mod auth;
pub mod config;
pub mod db;
pub mod discord;
pub mod error;
pub mod playback;
pub mod routes;
pub mod session;
pub mod telemetry;

use crate::auth::oauth::build_oauth_client;
use crate::auth::routes::AuthState;
use crate::auth::store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
use crate::auth::token::TokenManager;
use crate::discord::client::{BotToken, DiscordClient};
use crate::discord::guilds::GuildResolver;
use crate::discord::routes::GuildState;
use crate::playback::cache::{SnapshotCache, SnapshotHub};
use crate::playback::controller::PlaybackController;
use crate::playback::engine::AudioEngine;
use crate::playback::memory::InMemoryAudioEngine;
use crate::playback::routes::MusicState;
use crate::session::SessionStore;
use axum::Router;
use axum::http::{HeaderValue, Method, header};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Everything the HTTP surface needs beyond configuration.
pub struct Services {
    pub bot_token: BotToken,
    pub credentials: Arc<dyn CredentialStore>,
    pub pool: Option<PgPool>,
    pub engine: Arc<dyn AudioEngine>,
}

pub fn app(config: &config::Config, services: Services) -> anyhow::Result<Router> {
    let oauth_client = build_oauth_client(config)?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("kestrelle/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let discord = DiscordClient::new(http, config.discord_api_base.clone());
    let sessions = SessionStore::new(&config.session_secret)?;
    let tokens = TokenManager::new(
        services.credentials,
        oauth_client.clone(),
        config.discord_redirect_uri.clone(),
    );

    let auth_state = AuthState {
        oauth_client,
        state_store: Arc::new(RwLock::new(HashMap::new())),
        sessions: sessions.clone(),
        tokens: tokens.clone(),
        discord: discord.clone(),
        pool: services.pool,
    };

    let guild_state = GuildState {
        resolver: GuildResolver::new(discord, tokens, services.bot_token),
        sessions: sessions.clone(),
    };

    let music_state = MusicState {
        controller: PlaybackController::new(
            services.engine,
            Arc::new(SnapshotCache::new()),
            Arc::new(SnapshotHub::new()),
        ),
        sessions,
        interactions_secret: config.interactions_secret.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&config.public_url)?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .merge(routes::routes())
        .merge(auth::routes::routes(auth_state))
        .merge(discord::routes::routes(guild_state))
        .merge(playback::routes::routes(music_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub async fn run(config: config::Config) -> anyhow::Result<()> {
    telemetry::init_tracing(&config.rust_log);

    // A missing bot token is fatal before anything binds
    let bot_token = config.bot_token()?;

    let (credentials, pool): (Arc<dyn CredentialStore>, Option<PgPool>) =
        match &config.database_url {
            Some(url) => {
                let pool = db::init_pool(url).await?;
                (Arc::new(PgCredentialStore::new(pool.clone())), Some(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, credentials are kept in memory only");
                (Arc::new(MemoryCredentialStore::new()), None)
            }
        };

    let app = app(
        &config,
        Services {
            bot_token,
            credentials,
            pool,
            engine: Arc::new(InMemoryAudioEngine::new()),
        },
    )?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
