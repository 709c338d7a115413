use crate::db::models::{OAuthToken, OwnerId};
use crate::db::repository::{get_oauth_token, upsert_oauth_token};
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;

/// Keyed persistence for OAuth credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, owner_id: OwnerId) -> Result<Option<OAuthToken>, AppError>;

    /// Insert or replace the record for `token.owner_id`.
    ///
    /// Implementations keep the stored expiry monotonically non-decreasing.
    async fn upsert(&self, token: &OAuthToken) -> Result<(), AppError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find(&self, owner_id: OwnerId) -> Result<Option<OAuthToken>, AppError> {
        get_oauth_token(&self.pool, owner_id)
            .await
            .map_err(AppError::Database)
    }

    async fn upsert(&self, token: &OAuthToken) -> Result<(), AppError> {
        upsert_oauth_token(&self.pool, token)
            .await
            .map_err(AppError::Database)
    }
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: DashMap<OwnerId, OAuthToken>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find(&self, owner_id: OwnerId) -> Result<Option<OAuthToken>, AppError> {
        Ok(self.tokens.get(&owner_id).map(|t| t.value().clone()))
    }

    async fn upsert(&self, token: &OAuthToken) -> Result<(), AppError> {
        self.tokens
            .entry(token.owner_id)
            .and_modify(|existing| {
                let expires_at = existing.expires_at.max(token.expires_at);
                *existing = token.clone();
                existing.expires_at = expires_at;
            })
            .or_insert_with(|| token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(owner_id: OwnerId, access: &str, expires_in: Duration) -> OAuthToken {
        OAuthToken {
            owner_id,
            access_token: access.to_string(),
            refresh_token: "refresh".to_string(),
            scope: "identify guilds".to_string(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[tokio::test]
    async fn test_memory_store_not_found() {
        let store = MemoryCredentialStore::new();
        assert!(store.find(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_upsert_replaces() {
        let store = MemoryCredentialStore::new();
        store.upsert(&token(1, "old", Duration::hours(1))).await.unwrap();
        store.upsert(&token(1, "new", Duration::hours(2))).await.unwrap();

        let stored = store.find(1).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "new");
    }

    #[tokio::test]
    async fn test_memory_store_expiry_never_decreases() {
        let store = MemoryCredentialStore::new();
        let later = token(1, "a", Duration::hours(2));
        store.upsert(&later).await.unwrap();
        store.upsert(&token(1, "b", Duration::hours(1))).await.unwrap();

        let stored = store.find(1).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "b");
        assert_eq!(stored.expires_at, later.expires_at);
    }
}
