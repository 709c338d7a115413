use axum::{Json, Router, routing::get};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

pub fn routes() -> Router {
    Router::new().route("/api/status", get(status))
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "utcNow": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }))
}
