// src/handlers/status.rs
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

fn configured(flag: bool) -> &'static str {
    if flag {
        "configured"
    } else {
        "not_configured"
    }
}

// API Status endpoint
async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let providers = &state.providers;

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "claude_storyboard": configured(providers.claude),
            "fal_media": configured(providers.fal),
            "gemini_image": configured(providers.gemini),
        },
        "image_provider": providers.image_provider,
        "active_sessions": state.sessions.len().await,
        "endpoints": {
            "status": "/api/status",
            "session": "/api/sessions/:session_id",
            "session_run": "/api/sessions/:session_id/run",
            "storyboard": "/api/generate-storyboard",
            "moment_image": "/api/generate-moment-image",
            "video": "/api/generate-video",
            "upload": "/api/upload-image",
            "assets": "/assets/:filename"
        }
    }))
}
