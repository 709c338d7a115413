use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application-specific errors with HTTP status code mappings
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Access token refresh failed: {0}")]
    AuthRefreshFailed(String),

    #[error("Discord API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("User is not connected to a voice channel")]
    UserNotInVoice,

    #[error("Nothing is currently playing")]
    NothingPlaying,

    #[error("Control does not belong to this guild")]
    WrongGuild,

    #[error("Invalid command payload: {0}")]
    InvalidCommandPayload(String),

    #[error("Discord bot token is missing from configuration")]
    BotMisconfigured,

    #[error("No track found for query: {0}")]
    TrackNotFound(String),

    #[error("Missing interaction signature headers")]
    SignatureMissing,

    #[error("Invalid interaction signature: {0}")]
    SignatureInvalid(String),

    #[error("Interaction signature expired: {0}")]
    SignatureExpired(String),

    #[error("OAuth state not found")]
    OAuthStateNotFound,

    #[error("OAuth state expired")]
    OAuthStateExpired,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Reply text for the member who triggered a playback command.
    pub fn user_message(&self) -> String {
        match self {
            AppError::UserNotInVoice => "You are not connected to a voice channel.".to_string(),
            AppError::NothingPlaying => "Nothing is currently playing.".to_string(),
            AppError::WrongGuild => "This control is not for this server.".to_string(),
            AppError::InvalidCommandPayload(_) => "Invalid button payload.".to_string(),
            AppError::TrackNotFound(_) => "No results.".to_string(),
            _ => "Command failed.".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Unauthenticated => {
                tracing::debug!("Request without a valid session");
                (StatusCode::UNAUTHORIZED, "Not authenticated".to_string())
            }
            AppError::AuthRefreshFailed(msg) => {
                tracing::warn!("Access token refresh failed: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    "Discord session expired, please log in again".to_string(),
                )
            }
            AppError::Api { status, body } => {
                tracing::error!(status = status, body = %body, "Discord API error");
                (StatusCode::BAD_GATEWAY, "Discord API error".to_string())
            }
            AppError::UserNotInVoice
            | AppError::NothingPlaying
            | AppError::TrackNotFound(_) => {
                tracing::info!("Playback command rejected: {}", self);
                let status = match &self {
                    AppError::TrackNotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::CONFLICT,
                };
                (status, self.user_message())
            }
            AppError::WrongGuild => {
                tracing::warn!("Guild mismatch on playback control");
                (StatusCode::FORBIDDEN, self.user_message())
            }
            AppError::InvalidCommandPayload(msg) => {
                tracing::warn!("Invalid command payload: {}", msg);
                (StatusCode::BAD_REQUEST, self.user_message())
            }
            AppError::SignatureMissing => {
                tracing::warn!("Interaction without signature headers");
                (StatusCode::UNAUTHORIZED, "Missing signature".to_string())
            }
            AppError::SignatureInvalid(msg) => {
                tracing::warn!("Invalid interaction signature: {}", msg);
                (StatusCode::UNAUTHORIZED, "Invalid signature".to_string())
            }
            AppError::SignatureExpired(msg) => {
                tracing::warn!("Expired interaction signature: {}", msg);
                (StatusCode::UNAUTHORIZED, "Signature expired".to_string())
            }
            AppError::BotMisconfigured => {
                tracing::error!("Discord bot token is missing");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::OAuthStateNotFound => {
                tracing::warn!("OAuth state not found");
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid or expired OAuth state".to_string(),
                )
            }
            AppError::OAuthStateExpired => {
                tracing::warn!("OAuth state expired");
                (
                    StatusCode::BAD_REQUEST,
                    "OAuth state expired, please try again".to_string(),
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::NotFound(msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, msg.clone())
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                AppError::AuthRefreshFailed("x".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AppError::Api {
                    status: 500,
                    body: "boom".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (AppError::NothingPlaying, StatusCode::CONFLICT),
            (AppError::WrongGuild, StatusCode::FORBIDDEN),
            (AppError::SignatureMissing, StatusCode::UNAUTHORIZED),
            (
                AppError::SignatureExpired("old".to_string()),
                StatusCode::UNAUTHORIZED,
            ),
            (AppError::NotFound("guild".to_string()), StatusCode::NOT_FOUND),
            (
                AppError::InvalidCommandPayload("np:x".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            AppError::WrongGuild.user_message(),
            "This control is not for this server."
        );
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).user_message(),
            "Command failed."
        );
    }
}
