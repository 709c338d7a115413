use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Discord user ids are snowflakes; they fit in a signed 64-bit column.
pub type OwnerId = u64;

/// Row of `discord_oauth_tokens`.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthTokenRow {
    pub discord_user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DiscordUserRow {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One OAuth credential per Discord user.
///
/// `Debug` is implemented by hand so the secrets never reach a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthToken {
    pub owner_id: OwnerId,
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthToken")
            .field("owner_id", &self.owner_id)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl From<OAuthTokenRow> for OAuthToken {
    fn from(row: OAuthTokenRow) -> Self {
        Self {
            owner_id: row.discord_user_id as u64,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            scope: row.scope,
            expires_at: row.expires_at,
        }
    }
}
