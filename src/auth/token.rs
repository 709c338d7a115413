use crate::auth::store::CredentialStore;
use crate::db::models::{OAuthToken, OwnerId};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{RefreshToken, TokenResponse};
use std::sync::Arc;

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_LOOKAHEAD_SECONDS: i64 = 60;

/// Failure of a shared refresh, cloneable so every waiter gets a copy.
#[derive(Debug, Clone)]
enum RefreshFailure {
    Unauthenticated,
    Provider(String),
    Store(String),
}

impl From<RefreshFailure> for AppError {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::Unauthenticated => AppError::Unauthenticated,
            RefreshFailure::Provider(msg) => AppError::AuthRefreshFailed(msg),
            RefreshFailure::Store(msg) => AppError::Internal(anyhow::anyhow!(
                "Credential store failed during refresh: {}",
                msg
            )),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshFailure>>>;

/// Hands out valid Discord access tokens, refreshing them when needed.
///
/// At most one refresh runs per owner id. Discord rotates the refresh token on
/// use, so a second concurrent refresh would present a dead token and could
/// leave the stored credential out of sync with the provider. Concurrent
/// callers therefore join the in-flight refresh and share its outcome.
///
/// The refresh itself runs on a spawned task: a caller that goes away does
/// not abort a refresh whose rotated token still has to be persisted.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    oauth_client: BasicClient,
    redirect_uri: String,
    lookahead: Duration,
    inflight: DashMap<OwnerId, SharedRefresh>,
}

impl TokenManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        oauth_client: BasicClient,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                oauth_client,
                redirect_uri: redirect_uri.into(),
                lookahead: Duration::seconds(REFRESH_LOOKAHEAD_SECONDS),
                inflight: DashMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    /// Return a currently valid access token for `owner_id`.
    ///
    /// # Errors
    /// - `Unauthenticated` if no token is stored for the owner
    /// - `AuthRefreshFailed` if the provider rejected the refresh or returned
    ///   a malformed body
    pub async fn get_access_token(&self, owner_id: OwnerId) -> Result<String, AppError> {
        let token = self.inner.store.find(owner_id).await?.ok_or_else(|| {
            tracing::debug!(owner_id = owner_id, "No stored Discord token");
            AppError::Unauthenticated
        })?;

        if !needs_refresh(&token, Utc::now(), self.inner.lookahead) {
            tracing::debug!(
                owner_id = owner_id,
                expires_at = %token.expires_at,
                "Access token still valid, using existing token"
            );
            return Ok(token.access_token);
        }

        tracing::info!(
            owner_id = owner_id,
            expires_at = %token.expires_at,
            "Access token expired or expiring soon, refreshing"
        );

        self.refresh(owner_id).await.map_err(AppError::from)
    }

    fn refresh(&self, owner_id: OwnerId) -> SharedRefresh {
        match self.inner.inflight.entry(owner_id) {
            Entry::Occupied(entry) => {
                tracing::debug!(owner_id = owner_id, "Joining in-flight token refresh");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let inner = Arc::clone(&self.inner);
                let handle = tokio::spawn(async move {
                    let result = inner.refresh_stored(owner_id).await;
                    inner.inflight.remove(&owner_id);
                    result
                });

                let weak = Arc::downgrade(&self.inner);
                let shared = async move {
                    handle.await.unwrap_or_else(|e| {
                        // The task never reached its own cleanup
                        if let Some(inner) = weak.upgrade() {
                            inner.inflight.remove(&owner_id);
                        }
                        Err(RefreshFailure::Provider(format!(
                            "refresh task aborted: {}",
                            e
                        )))
                    })
                }
                .boxed()
                .shared();

                entry.insert(shared.clone());
                shared
            }
        }
    }
}

impl Inner {
    async fn refresh_stored(&self, owner_id: OwnerId) -> Result<String, RefreshFailure> {
        // Re-read: a refresh that finished between the caller's check and
        // this flight has already rotated the credential.
        let token = self
            .store
            .find(owner_id)
            .await
            .map_err(|e| RefreshFailure::Store(e.to_string()))?
            .ok_or(RefreshFailure::Unauthenticated)?;

        let now = Utc::now();
        if !needs_refresh(&token, now, self.lookahead) {
            return Ok(token.access_token);
        }

        let response = self
            .oauth_client
            .exchange_refresh_token(&RefreshToken::new(token.refresh_token.clone()))
            .add_extra_param("redirect_uri", self.redirect_uri.clone())
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                tracing::error!(
                    owner_id = owner_id,
                    error = %e,
                    "Token refresh request failed"
                );
                RefreshFailure::Provider(format!("Failed to refresh access token: {}", e))
            })?;

        let expires_in = response.expires_in().ok_or_else(|| {
            tracing::error!(owner_id = owner_id, "No expires_in in token refresh response");
            RefreshFailure::Provider("No expiry time in token refresh response".to_string())
        })?;

        let scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });

        let refreshed = apply_refresh(
            &token,
            response.access_token().secret().to_string(),
            response.refresh_token().map(|t| t.secret().to_string()),
            scope,
            Duration::seconds(expires_in.as_secs() as i64),
            now,
        );

        tracing::debug!(
            owner_id = owner_id,
            expires_at = %refreshed.expires_at,
            refresh_token_rotated = response.refresh_token().is_some(),
            "Received new tokens from Discord"
        );

        self.store.upsert(&refreshed).await.map_err(|e| {
            tracing::error!(owner_id = owner_id, error = %e, "Failed to store refreshed token");
            RefreshFailure::Store(e.to_string())
        })?;

        tracing::info!(owner_id = owner_id, "Successfully refreshed and stored access token");

        Ok(refreshed.access_token)
    }
}

fn needs_refresh(token: &OAuthToken, now: DateTime<Utc>, lookahead: Duration) -> bool {
    token.expires_at <= now + lookahead
}

/// Fold a refresh response into the stored record.
///
/// A missing refresh token or scope keeps the previous value, and the expiry
/// never moves backwards.
fn apply_refresh(
    current: &OAuthToken,
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<String>,
    expires_in: Duration,
    now: DateTime<Utc>,
) -> OAuthToken {
    OAuthToken {
        owner_id: current.owner_id,
        access_token,
        refresh_token: refresh_token.unwrap_or_else(|| current.refresh_token.clone()),
        scope: scope.unwrap_or_else(|| current.scope.clone()),
        expires_at: (now + expires_in).max(current.expires_at),
    }
}
