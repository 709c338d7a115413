use crate::db::models::OwnerId;
use crate::error::AppError;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "kestrelle_session";

/// Lifetime of a dashboard session, also sent as the cookie's Max-Age
pub const SESSION_TTL_DAYS: i64 = 7;

/// Identity of a logged-in dashboard user.
#[derive(Debug, Clone)]
pub struct Session {
    pub owner_id: OwnerId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Dashboard sessions, keyed by an opaque id.
///
/// The cookie carries `{id}.{hex(hmac_sha256(secret, id))}` so a forged or
/// truncated value never reaches the map.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    keyed_mac: HmacSha256,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        let keyed_mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session secret: {}", e))?;

        Ok(Self {
            sessions: Arc::new(DashMap::new()),
            keyed_mac,
            ttl: Duration::days(SESSION_TTL_DAYS),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Start a session and return the signed cookie value.
    pub fn create(&self, owner_id: OwnerId, username: &str) -> String {
        let cutoff = Utc::now() - self.ttl;
        self.sessions.retain(|_, s| s.created_at > cutoff);

        let id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            id.clone(),
            Session {
                owner_id,
                username: username.to_string(),
                created_at: Utc::now(),
            },
        );

        tracing::info!(owner_id = owner_id, "Session started");

        format!("{}.{}", id, self.sign(&id))
    }

    /// The live session behind a cookie value. Expired sessions are removed.
    pub fn resolve(&self, cookie_value: &str) -> Option<Session> {
        let id = self.verify(cookie_value)?;
        let session = self.sessions.get(id).map(|s| s.value().clone())?;

        if session.created_at <= Utc::now() - self.ttl {
            self.sessions.remove(id);
            tracing::debug!(owner_id = session.owner_id, "Session expired");
            return None;
        }

        Some(session)
    }

    pub fn destroy(&self, cookie_value: &str) {
        if let Some(id) = self.verify(cookie_value) {
            if let Some((_, session)) = self.sessions.remove(id) {
                tracing::info!(owner_id = session.owner_id, "Session ended");
            }
        }
    }

    pub fn current(&self, jar: &CookieJar) -> Option<Session> {
        jar.get(SESSION_COOKIE).and_then(|c| self.resolve(c.value()))
    }

    /// The caller's session, or `Unauthenticated` without touching the network.
    pub fn require(&self, jar: &CookieJar) -> Result<Session, AppError> {
        self.current(jar).ok_or(AppError::Unauthenticated)
    }

    pub fn cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    fn sign(&self, id: &str) -> String {
        hex::encode(self.mac(id).finalize().into_bytes())
    }

    fn verify<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (id, signature) = cookie_value.split_once('.')?;
        let expected = hex::decode(signature).ok()?;
        self.mac(id).verify_slice(&expected).ok()?;
        Some(id)
    }

    fn mac(&self, id: &str) -> HmacSha256 {
        let mut mac = self.keyed_mac.clone();
        mac.update(id.as_bytes());
        mac
    }
}
