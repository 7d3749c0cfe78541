// src/handlers/mod.rs
pub mod assets;
pub mod generation;
pub mod pipeline;
pub mod status;

use axum::extract::multipart::Multipart;
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::AppState;

/// Upload size limit for multipart image endpoints.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Full application router with logging, CORS and shared state.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(pipeline::pipeline_routes())
        .merge(generation::generation_routes())
        .merge(assets::asset_routes())
        .merge(status::status_routes())
        .layer(axum::middleware::from_fn(crate::middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

/// File pulled out of a multipart body.
pub struct UploadedFile {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Reads the `file` field of a multipart form.
pub async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| PipelineError::Validation(format!("Failed to read upload: {}", e)))?;
        if data.is_empty() {
            return Err(PipelineError::Validation("No file provided".to_string()));
        }
        return Ok(UploadedFile {
            file_name,
            data: data.to_vec(),
        });
    }
    Err(PipelineError::Validation("No file provided".to_string()))
}
