use crate::db::models::{DiscordUserRow, OAuthToken, OAuthTokenRow, OwnerId};
use sqlx::PgPool;

/// Get the OAuth token record for a Discord user.
///
/// # Returns
/// Optional token if the user has completed the OAuth flow, None otherwise
///
/// # Errors
/// Returns error if database query fails
pub async fn get_oauth_token(
    pool: &PgPool,
    owner_id: OwnerId,
) -> Result<Option<OAuthToken>, sqlx::Error> {
    let row = sqlx::query_as::<_, OAuthTokenRow>(
        r#"
        SELECT discord_user_id, access_token, refresh_token, scope, expires_at, updated_at
        FROM discord_oauth_tokens
        WHERE discord_user_id = $1
        "#,
    )
    .bind(owner_id as i64)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(OAuthToken::from))
}

/// Insert or replace the OAuth token record for a Discord user.
///
/// Uses ON CONFLICT so both the initial login and every refresh go through
/// the same statement. The stored expiry never moves backwards.
///
/// # Errors
/// Returns error if database operation fails
pub async fn upsert_oauth_token(pool: &PgPool, token: &OAuthToken) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO discord_oauth_tokens (
            discord_user_id,
            access_token,
            refresh_token,
            scope,
            expires_at
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (discord_user_id)
        DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = EXCLUDED.refresh_token,
            scope = EXCLUDED.scope,
            expires_at = GREATEST(discord_oauth_tokens.expires_at, EXCLUDED.expires_at),
            updated_at = NOW()
        "#,
    )
    .bind(token.owner_id as i64)
    .bind(&token.access_token)
    .bind(&token.refresh_token)
    .bind(&token.scope)
    .bind(token.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert or update a Discord user seen during login.
pub async fn upsert_discord_user(
    pool: &PgPool,
    id: OwnerId,
    username: &str,
) -> Result<DiscordUserRow, sqlx::Error> {
    sqlx::query_as::<_, DiscordUserRow>(
        r#"
        INSERT INTO discord_users (id, username)
        VALUES ($1, $2)
        ON CONFLICT (id)
        DO UPDATE SET
            username = EXCLUDED.username,
            updated_at = NOW()
        RETURNING id, username, created_at, updated_at
        "#,
    )
    .bind(id as i64)
    .bind(username)
    .fetch_one(pool)
    .await
}
