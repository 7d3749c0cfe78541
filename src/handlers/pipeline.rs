// src/handlers/pipeline.rs
//! Session-scoped run endpoints: start, inspect, step back, per-scene edits, video.

use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{delete, patch, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{read_file_field, MAX_UPLOAD_BYTES};
use crate::error::PipelineError;
use crate::models::{RunSnapshot, Scene, SceneField, Style};
use crate::AppState;

pub fn pipeline_routes() -> Router {
    Router::new()
        .route("/api/sessions/:session_id", delete(close_session))
        .route("/api/sessions/:session_id/run", post(start_run).get(get_run))
        .route("/api/sessions/:session_id/run/back", post(go_back))
        .route("/api/sessions/:session_id/scenes/:index", patch(edit_scene))
        .route("/api/sessions/:session_id/scenes/:index/regenerate", post(regenerate_scene))
        .route("/api/sessions/:session_id/scenes/:index/rewrite", post(rewrite_scene))
        .route(
            "/api/sessions/:session_id/scenes/:index/image",
            post(replace_scene_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/sessions/:session_id/video", post(generate_video))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub reference_image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditSceneRequest {
    pub field: SceneField,
    pub value: String,
}

/// POST /api/sessions/:session_id/run
async fn start_run(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<Json<RunSnapshot>, PipelineError> {
    let style = request
        .style
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<Style>)
        .transpose()?;
    let orchestrator = state.sessions.get_or_create(&session_id).await?;
    let snapshot = orchestrator
        .start_run(&request.prompt, style, request.reference_image_url)
        .await?;
    Ok(Json(snapshot))
}

/// GET /api/sessions/:session_id/run
async fn get_run(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(orchestrator.snapshot().await))
}

/// DELETE /api/sessions/:session_id
async fn close_session(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, PipelineError> {
    state.sessions.remove(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/:session_id/run/back
async fn go_back(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(orchestrator.go_back().await))
}

/// POST /api/sessions/:session_id/scenes/:index/regenerate
async fn regenerate_scene(
    Path((session_id, index)): Path<(String, usize)>,
    Extension(state): Extension<Arc<AppState>>,
    request: Option<Json<RegenerateRequest>>,
) -> Result<Json<Scene>, PipelineError> {
    let custom_prompt = request.and_then(|Json(r)| r.custom_prompt);
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(orchestrator.regenerate_scene(index, custom_prompt).await?))
}

/// POST /api/sessions/:session_id/scenes/:index/rewrite
async fn rewrite_scene(
    Path((session_id, index)): Path<(String, usize)>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Scene>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(orchestrator.rewrite_scene(index).await?))
}

/// PATCH /api/sessions/:session_id/scenes/:index
async fn edit_scene(
    Path((session_id, index)): Path<(String, usize)>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<EditSceneRequest>,
) -> Result<Json<Scene>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(
        orchestrator
            .edit_scene_text(index, request.field, request.value)
            .await?,
    ))
}

/// POST /api/sessions/:session_id/scenes/:index/image (multipart `file`)
async fn replace_scene_image(
    Path((session_id, index)): Path<(String, usize)>,
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Scene>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    let upload = read_file_field(multipart).await?;
    Ok(Json(
        orchestrator
            .replace_scene_image(index, upload.data, &upload.file_name)
            .await?,
    ))
}

/// POST /api/sessions/:session_id/video
async fn generate_video(
    Path(session_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RunSnapshot>, PipelineError> {
    let orchestrator = state.sessions.get(&session_id).await?;
    Ok(Json(orchestrator.generate_video().await?))
}
