use crate::discord::models::{DiscordChannel, DiscordGuild, DiscordUser, snowflake_cmp};
use crate::error::AppError;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;

/// Maximum page size accepted by `GET /users/@me/guilds`.
pub const GUILDS_PAGE_LIMIT: usize = 200;

const ICON_SIZE: u32 = 128;
const CDN_BASE: &str = "https://cdn.discordapp.com";

/// Credential attached to a single request.
pub trait Credential {
    fn authorization(&self) -> String;
}

/// A user's OAuth access token, sent as `Bearer`.
#[derive(Clone)]
pub struct UserToken(String);

/// The bot account token, sent as `Bot`.
#[derive(Clone)]
pub struct BotToken(String);

impl UserToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl BotToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl Credential for UserToken {
    fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl Credential for BotToken {
    fn authorization(&self) -> String {
        format!("Bot {}", self.0)
    }
}

impl std::fmt::Debug for UserToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UserToken(..)")
    }
}

impl std::fmt::Debug for BotToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BotToken(..)")
    }
}

/// Thin wrapper over the Discord REST API.
///
/// The `reqwest::Client` is injected so connection pooling stays with the
/// host. Every call takes its credential explicitly and no call is retried:
/// any non-2xx response surfaces as [`AppError::Api`].
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    page_limit: usize,
}

impl DiscordClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_limit: GUILDS_PAGE_LIMIT,
        }
    }

    /// Override the page size used for the bot guild listing.
    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit.max(1);
        self
    }

    /// `GET /users/@me`
    pub async fn get_current_user(&self, token: &UserToken) -> Result<DiscordUser, AppError> {
        self.get_json("users/@me", &[], token).await
    }

    /// All guilds the user belongs to, in a single call.
    ///
    /// Requires the `guilds` OAuth scope.
    pub async fn list_user_guilds(&self, token: &UserToken) -> Result<Vec<DiscordGuild>, AppError> {
        let guilds: Vec<DiscordGuild> = self
            .get_json(
                "users/@me/guilds",
                &[("with_counts", "true".to_string())],
                token,
            )
            .await?;

        tracing::debug!(guild_count = guilds.len(), "Fetched user guilds");

        Ok(guilds)
    }

    /// All guilds the bot belongs to, following `after` cursors.
    ///
    /// Stops at the first page shorter than the page limit. When the total is
    /// an exact multiple of the limit this costs one extra, empty request.
    pub async fn list_bot_guilds(&self, token: &BotToken) -> Result<Vec<DiscordGuild>, AppError> {
        let limit = self.page_limit;
        let mut guilds: Vec<DiscordGuild> = Vec::new();
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: Vec<DiscordGuild> = self.get_json("users/@me/guilds", &query, token).await?;
            pages += 1;
            let page_len = page.len();

            tracing::debug!(
                page = pages,
                page_len = page_len,
                after = ?after,
                "Fetched bot guild page"
            );

            let next_cursor = page.last().map(|g| g.id.clone());
            guilds.extend(page);

            if page_len < limit {
                break;
            }

            // A full page always has a last item
            let Some(next_cursor) = next_cursor else {
                break;
            };

            if let Some(previous) = &after {
                if snowflake_cmp(&next_cursor, previous) != Ordering::Greater {
                    tracing::error!(
                        previous = %previous,
                        next = %next_cursor,
                        "Guild pagination cursor did not advance"
                    );
                    return Err(AppError::Internal(anyhow::anyhow!(
                        "guild pagination cursor did not advance past {}",
                        previous
                    )));
                }
            }

            after = Some(next_cursor);
        }

        tracing::info!(
            guild_count = guilds.len(),
            pages = pages,
            "Fetched bot guilds"
        );

        Ok(guilds)
    }

    /// `GET /guilds/{guild_id}/channels` with the bot credential.
    pub async fn list_guild_channels(
        &self,
        token: &BotToken,
        guild_id: &str,
    ) -> Result<Vec<DiscordChannel>, AppError> {
        self.get_json(&format!("guilds/{}/channels", guild_id), &[], token)
            .await
    }

    async fn get_json<T, C>(
        &self,
        path: &str,
        query: &[(&str, String)],
        credential: &C,
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned,
        C: Credential,
    {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, credential.authorization())
            .query(query)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(path = path, "Failed to call Discord API: {:?}", e);
                AppError::Internal(anyhow::anyhow!("Failed to call {}: {}", path, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                path = path,
                status = status.as_u16(),
                "Discord API returned error"
            );
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(path = path, "Failed to parse Discord API response: {:?}", e);
            AppError::Internal(anyhow::anyhow!("Failed to parse {} response: {}", path, e))
        })
    }
}

/// CDN URL of a guild icon, or None when the guild has no icon.
pub fn guild_icon_url(guild_id: &str, icon_hash: Option<&str>) -> Option<String> {
    let hash = icon_hash.map(str::trim).filter(|h| !h.is_empty())?;
    Some(format!(
        "{}/icons/{}/{}.png?size={}",
        CDN_BASE, guild_id, hash, ICON_SIZE
    ))
}
