// src/handlers/assets.rs
use axum::{
    body::Body,
    extract::{Extension, Path},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::error::PipelineError;
use crate::storage::{content_type_for, resolve_asset_path};
use crate::AppState;

pub fn asset_routes() -> Router {
    Router::new().route("/assets/:filename", get(serve_asset))
}

/// Streams a stored image or video back to the browser.
async fn serve_asset(
    Path(filename): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Response, PipelineError> {
    let file_path = resolve_asset_path(&state.asset_dir, &filename)?;

    let file = match tokio::fs::File::open(&file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::NotFound(format!("Asset '{}' not found", filename)));
        }
        Err(e) => return Err(e.into()),
    };

    let stream = ReaderStream::new(file);
    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&file_path)),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
