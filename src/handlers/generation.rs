// src/handlers/generation.rs
//! Stateless endpoints that call one collaborator directly, outside any session.

use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension},
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{read_file_field, MAX_UPLOAD_BYTES};
use crate::error::PipelineError;
use crate::generators::{
    ImageSource, KeyframeOutput, KeyframeRequest, ReferenceImage, ReferenceRole, VideoMoment,
    VideoRequest, VideoStoryboard,
};
use crate::models::{Storyboard, Style, SCENE_COUNT};
use crate::AppState;

pub fn generation_routes() -> Router {
    Router::new()
        .route("/api/generate-storyboard", post(generate_storyboard))
        .route("/api/generate-moment-image", post(generate_moment_image))
        .route("/api/generate-video", post(generate_video))
        .route(
            "/api/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

fn parse_style(raw: Option<&str>) -> Result<Style, PipelineError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => style.parse(),
        None => Ok(Style::Cinematic),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardRequest {
    #[serde(default)]
    pub prompt: String,
    pub style: Option<String>,
    pub reference_image_url: Option<String>,
}

/// POST /api/generate-storyboard
async fn generate_storyboard(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StoryboardRequest>,
) -> Result<Json<Storyboard>, PipelineError> {
    if request.prompt.trim().is_empty() {
        return Err(PipelineError::Validation("Prompt is required".to_string()));
    }
    let style = parse_style(request.style.as_deref())?;
    let storyboard = state
        .collaborators
        .storyboard
        .generate(&request.prompt, style, request.reference_image_url.as_deref())
        .await?;
    Ok(Json(storyboard))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentImageRequest {
    #[serde(default)]
    pub description: String,
    /// Prior keyframe; takes precedence over `reference_image_url`.
    pub seed_image_url: Option<String>,
    /// Brand or product shot.
    pub reference_image_url: Option<String>,
    #[serde(default)]
    pub product_description: String,
    pub product_identity: Option<String>,
    pub style: Option<String>,
    pub seed: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentImageResponse {
    pub image_url: String,
    pub prompt: String,
}

impl From<KeyframeOutput> for MomentImageResponse {
    fn from(output: KeyframeOutput) -> Self {
        Self {
            image_url: output.image_url,
            prompt: output.resolved_prompt,
        }
    }
}

fn pick_reference(
    seed_image_url: Option<&str>,
    reference_image_url: Option<&str>,
) -> Result<Option<ReferenceImage>, PipelineError> {
    fn non_blank(url: Option<&str>) -> Option<&str> {
        url.map(str::trim).filter(|u| !u.is_empty())
    }
    let picked = match (non_blank(seed_image_url), non_blank(reference_image_url)) {
        (Some(seed), _) => Some((seed, ReferenceRole::SceneConsistency)),
        (None, Some(reference)) => Some((reference, ReferenceRole::IdentityConsistency)),
        (None, None) => None,
    };
    picked
        .map(|(url, role)| Ok(ReferenceImage { source: ImageSource::parse(url)?, role }))
        .transpose()
}

/// POST /api/generate-moment-image
async fn generate_moment_image(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<MomentImageRequest>,
) -> Result<Json<MomentImageResponse>, PipelineError> {
    if request.description.trim().is_empty() {
        return Err(PipelineError::Validation("Description is required".to_string()));
    }
    let reference = pick_reference(
        request.seed_image_url.as_deref(),
        request.reference_image_url.as_deref(),
    )?;

    let output = state
        .collaborators
        .keyframes
        .generate(KeyframeRequest {
            description: request.description,
            reference,
            product_description: request.product_description,
            product_identity: request.product_identity,
            style: parse_style(request.style.as_deref())?,
            seed: request.seed.filter(|s| !s.trim().is_empty()),
        })
        .await?;
    Ok(Json(output.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMomentBody {
    #[serde(default)]
    pub timing: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub camera_movement: String,
    #[serde(default)]
    pub audio: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStoryboardBody {
    #[serde(default)]
    pub audio_strategy: String,
    pub music_style: Option<String>,
    #[serde(default)]
    pub product_identity: String,
    #[serde(default)]
    pub moments: Vec<VideoMomentBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGenerationRequest {
    pub storyboard: Option<VideoStoryboardBody>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub product_description: String,
    pub style: Option<String>,
}

impl VideoGenerationRequest {
    fn into_video_request(self) -> Result<VideoRequest, PipelineError> {
        let storyboard = self
            .storyboard
            .ok_or_else(|| PipelineError::Validation("Storyboard and images are required".to_string()))?;
        if self.images.is_empty() {
            return Err(PipelineError::Validation("Storyboard and images are required".to_string()));
        }
        let image_count = self.images.len();
        let image_urls: [String; SCENE_COUNT] = self.images.try_into().map_err(|_| {
            PipelineError::Validation(format!("Expected 3 images but received {}", image_count))
        })?;

        let moment_count = storyboard.moments.len();
        let moments: [VideoMomentBody; SCENE_COUNT] = storyboard.moments.try_into().map_err(|_| {
            PipelineError::Validation(format!("Expected 3 moments but received {}", moment_count))
        })?;

        Ok(VideoRequest {
            image_urls,
            storyboard: VideoStoryboard {
                audio_strategy: storyboard.audio_strategy,
                music_style: storyboard.music_style,
                product_identity: storyboard.product_identity,
                moments: moments.map(|m| VideoMoment {
                    text: if m.summary.trim().is_empty() { m.description } else { m.summary },
                    timing: m.timing,
                    title: m.title,
                    camera_movement: m.camera_movement,
                    audio: m.audio,
                }),
            },
            product_description: self.product_description,
            style: parse_style(self.style.as_deref())?,
        })
    }
}

/// POST /api/generate-video
async fn generate_video(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<VideoGenerationRequest>,
) -> Result<Json<Value>, PipelineError> {
    let video_request = request.into_video_request()?;
    let style = video_request.style;
    let deadline = state.settings.video_deadline;

    let output = tokio::time::timeout(deadline, state.collaborators.video.generate(video_request))
        .await
        .map_err(|_| {
            PipelineError::Timeout(format!(
                "Video generation did not finish within {}s",
                deadline.as_secs()
            ))
        })??;

    Ok(Json(json!({
        "videoUrl": output.video_url,
        "prompt": output.prompt,
        "metadata": {
            "duration": "8s",
            "resolution": "720p",
            "aspectRatio": "16:9",
            "style": style,
            "scenesCount": SCENE_COUNT,
        }
    })))
}

/// POST /api/upload-image (multipart `file`)
async fn upload_image(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, PipelineError> {
    let upload = read_file_field(multipart).await?;
    let image_url = state
        .collaborators
        .assets
        .put(upload.data, &upload.file_name, "jpg")
        .await?;
    Ok(Json(json!({ "imageUrl": image_url })))
}
