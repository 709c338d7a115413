use crate::auth::token::TokenManager;
use crate::discord::client::{BotToken, DiscordClient, UserToken, guild_icon_url};
use crate::discord::models::{
    CHANNEL_TYPE_GUILD_VOICE, DiscordChannel, DiscordGuild, GuildSummary, VoiceChannelSummary,
    name_then_id_cmp,
};
use crate::error::AppError;
use crate::session::Session;
use std::collections::HashSet;

/// Works out which guilds a dashboard user can control.
///
/// Only guilds the user and the bot both belong to are useful to the
/// dashboard, since the bot can only play where it is a member.
#[derive(Clone)]
pub struct GuildResolver {
    discord: DiscordClient,
    tokens: TokenManager,
    bot_token: BotToken,
}

impl GuildResolver {
    pub fn new(discord: DiscordClient, tokens: TokenManager, bot_token: BotToken) -> Self {
        Self {
            discord,
            tokens,
            bot_token,
        }
    }

    /// Guilds shared by the caller and the bot, sorted by name then id.
    ///
    /// # Errors
    /// - `Unauthenticated` when there is no session (no request is made)
    /// - token and API errors propagate unchanged
    pub async fn resolve_available(
        &self,
        session: Option<&Session>,
    ) -> Result<Vec<GuildSummary>, AppError> {
        let session = session.ok_or(AppError::Unauthenticated)?;

        let access_token = self.tokens.get_access_token(session.owner_id).await?;
        let user_token = UserToken::new(access_token);

        let (user_guilds, bot_guilds) = tokio::try_join!(
            self.discord.list_user_guilds(&user_token),
            self.discord.list_bot_guilds(&self.bot_token),
        )?;

        let bot_guild_ids: HashSet<String> = bot_guilds.into_iter().map(|g| g.id).collect();
        let available = intersect_guilds(user_guilds, &bot_guild_ids);

        tracing::info!(
            owner_id = session.owner_id,
            available = available.len(),
            bot_guilds = bot_guild_ids.len(),
            "Resolved available guilds"
        );

        Ok(available)
    }

    /// Voice channels of a guild, read with the bot credential.
    pub async fn voice_channels(
        &self,
        guild_id: &str,
    ) -> Result<Vec<VoiceChannelSummary>, AppError> {
        let channels = self
            .discord
            .list_guild_channels(&self.bot_token, guild_id)
            .await?;

        Ok(voice_channels_of(channels))
    }
}

/// Build summaries for the user guilds the bot is also in.
pub fn intersect_guilds(
    user_guilds: Vec<DiscordGuild>,
    bot_guild_ids: &HashSet<String>,
) -> Vec<GuildSummary> {
    let mut seen = HashSet::new();

    let mut shared: Vec<GuildSummary> = user_guilds
        .into_iter()
        .filter(|g| bot_guild_ids.contains(&g.id))
        .filter(|g| seen.insert(g.id.clone()))
        .map(|g| GuildSummary {
            icon_url: guild_icon_url(&g.id, g.icon.as_deref()),
            id: g.id,
            name: g.name,
            owner: g.owner,
        })
        .collect();

    shared.sort_by(|a, b| name_then_id_cmp(&a.name, &a.id, &b.name, &b.id));
    shared
}

fn voice_channels_of(channels: Vec<DiscordChannel>) -> Vec<VoiceChannelSummary> {
    let mut voice: Vec<VoiceChannelSummary> = channels
        .into_iter()
        .filter(|c| c.kind == CHANNEL_TYPE_GUILD_VOICE)
        .map(|c| VoiceChannelSummary {
            name: c.name.unwrap_or_default(),
            id: c.id,
        })
        .collect();

    voice.sort_by(|a, b| name_then_id_cmp(&a.name, &a.id, &b.name, &b.id));
    voice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{CredentialStore, MemoryCredentialStore};
    use crate::db::models::OAuthToken;
    use chrono::{Duration, Utc};
    use oauth2::basic::BasicClient;
    use oauth2::{AuthUrl, ClientId, TokenUrl};
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn guild(id: &str, name: &str, icon: Option<&str>) -> DiscordGuild {
        DiscordGuild {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.map(str::to_string),
            owner: false,
            permissions: None,
        }
    }

    fn ids(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_intersection_sorted_by_name_then_id() {
        let user = vec![
            guild("3", "zeta", None),
            guild("20", "Alpha", Some("abc")),
            guild("10", "alpha", None),
            guild("4", "Not shared", None),
        ];

        let result = intersect_guilds(user, &ids(&["3", "10", "20", "99"]));
        let order: Vec<_> = result.iter().map(|g| g.id.as_str()).collect();

        assert_eq!(order, vec!["10", "20", "3"]);
        assert_eq!(
            result[1].icon_url.as_deref(),
            Some("https://cdn.discordapp.com/icons/20/abc.png?size=128")
        );
    }

    #[test]
    fn test_intersection_independent_of_input_order() {
        let user = vec![
            guild("1", "Beta", None),
            guild("2", "alpha", None),
            guild("3", "Gamma", None),
            guild("4", "beta", None),
        ];
        let mut reversed = user.clone();
        reversed.reverse();

        let a = intersect_guilds(user, &ids(&["1", "2", "4"]));
        let b = intersect_guilds(reversed, &ids(&["4", "2", "1"]));

        assert_eq!(a, b);
        let order: Vec<_> = a.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(order, vec!["2", "1", "4"]);
    }

    #[test]
    fn test_intersection_empty_when_no_overlap() {
        let user = vec![guild("1", "One", None)];
        assert!(intersect_guilds(user, &ids(&["2"])).is_empty());
    }

    #[test]
    fn test_voice_channels_filtered_and_sorted() {
        let channels = vec![
            DiscordChannel {
                id: "1".to_string(),
                name: Some("text".to_string()),
                kind: 0,
            },
            DiscordChannel {
                id: "3".to_string(),
                name: Some("Lounge".to_string()),
                kind: 2,
            },
            DiscordChannel {
                id: "2".to_string(),
                name: Some("gaming".to_string()),
                kind: 2,
            },
        ];

        let voice = voice_channels_of(channels);
        let names: Vec<_> = voice.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["gaming", "Lounge"]);
    }

    async fn resolver(server: &MockServer) -> GuildResolver {
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .upsert(&OAuthToken {
                owner_id: 5,
                access_token: "user-token".to_string(),
                refresh_token: "refresh".to_string(),
                scope: "identify guilds".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            })
            .await
            .unwrap();

        let oauth_client = BasicClient::new(
            ClientId::new("client".to_string()),
            None,
            AuthUrl::new(format!("{}/authorize", server.uri())).unwrap(),
            Some(TokenUrl::new(format!("{}/token", server.uri())).unwrap()),
        );

        GuildResolver::new(
            DiscordClient::new(reqwest::Client::new(), server.uri()),
            TokenManager::new(store, oauth_client, "http://localhost/callback"),
            BotToken::new("bot-token"),
        )
    }

    fn session(owner_id: u64) -> Session {
        Session {
            owner_id,
            username: "kes".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_resolve_without_session_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let result = resolver(&server).await.resolve_available(None).await;
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_resolve_without_stored_token() {
        let server = MockServer::start().await;
        let result = resolver(&server)
            .await
            .resolve_available(Some(&session(6)))
            .await;

        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_resolve_intersects_user_and_bot_guilds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me/guilds"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "1", "name": "Music", "icon": "abc", "owner": true },
                { "id": "2", "name": "art club" },
                { "id": "3", "name": "No bot here" }
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/@me/guilds"))
            .and(header("authorization", "Bot bot-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "1", "name": "Music" },
                { "id": "2", "name": "art club" },
                { "id": "4", "name": "Elsewhere" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let guilds = resolver(&server)
            .await
            .resolve_available(Some(&session(5)))
            .await
            .unwrap();

        let order: Vec<_> = guilds.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(order, vec!["2", "1"]);
        assert!(guilds[1].owner);
        assert!(guilds[1].icon_url.as_deref().unwrap().contains("abc"));
    }

    #[tokio::test]
    async fn test_resolve_propagates_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/@me/guilds"))
            .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
            .mount(&server)
            .await;

        let result = resolver(&server)
            .await
            .resolve_available(Some(&session(5)))
            .await;

        assert!(matches!(result, Err(AppError::Api { status: 401, .. })));
    }
}
