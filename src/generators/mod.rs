// src/generators/mod.rs
//! Narrow interfaces to the generative providers and the asset store.
//! The orchestrator only ever talks to these traits.

pub mod keyframe;
pub mod storyboard;
pub mod video;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{Storyboard, Style, SCENE_COUNT};

pub use keyframe::{FalKeyframeGenerator, GeminiKeyframeGenerator, ReferenceStrengths};
pub use storyboard::ClaudeStoryboardGenerator;
pub use video::FalVideoSynthesizer;

#[async_trait]
pub trait StoryboardGenerator: Send + Sync {
    /// Writes a 3-scene storyboard. `reference_image_url` only enriches the prompt text.
    async fn generate(
        &self,
        prompt: &str,
        style: Style,
        reference_image_url: Option<&str>,
    ) -> Result<Storyboard, PipelineError>;
}

#[async_trait]
pub trait KeyframeGenerator: Send + Sync {
    async fn generate(&self, request: KeyframeRequest) -> Result<KeyframeOutput, PipelineError>;
}

#[async_trait]
pub trait VideoSynthesizer: Send + Sync {
    async fn generate(&self, request: VideoRequest) -> Result<VideoOutput, PipelineError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Persists `data` and returns a URL that serves it.
    /// `default_extension` is used when `suggested_name` has no usable extension.
    async fn put(
        &self,
        data: Vec<u8>,
        suggested_name: &str,
        default_extension: &str,
    ) -> Result<String, PipelineError>;
}

lazy_static! {
    static ref DATA_URL: Regex =
        Regex::new(r"^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(?:;[\w=-]+)*;base64,(?P<data>.*)$").unwrap();
}

/// Image passed to a provider, either by URL or inline.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Inline { data: Vec<u8>, mime_type: String },
}

impl ImageSource {
    /// `data:` URLs are decoded in place, anything else is kept as a URL.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let raw = raw.trim();
        if !raw.starts_with("data:") {
            return Ok(ImageSource::Url(raw.to_string()));
        }

        let captures = DATA_URL
            .captures(raw)
            .ok_or_else(|| PipelineError::Validation("Malformed data URL for reference image".into()))?;
        let mime_type = captures
            .name("mime")
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let data = STANDARD
            .decode(captures.name("data").map(|m| m.as_str()).unwrap_or_default())
            .map_err(|e| PipelineError::Validation(format!("Reference image is not valid base64: {}", e)))?;

        Ok(ImageSource::Inline { data, mime_type })
    }

    /// Form accepted by providers that take URL strings (data URIs included).
    pub fn to_url(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Inline { data, mime_type } => {
                format!("data:{};base64,{}", mime_type, STANDARD.encode(data))
            }
        }
    }
}

/// How strongly a reference image should constrain the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    /// The previous keyframe in the chain. Leaves room for new composition.
    SceneConsistency,
    /// A brand or product shot. Preserved closely.
    IdentityConsistency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceImage {
    pub source: ImageSource,
    pub role: ReferenceRole,
}

impl ReferenceImage {
    pub fn scene(url: impl Into<String>) -> Self {
        Self {
            source: ImageSource::Url(url.into()),
            role: ReferenceRole::SceneConsistency,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeRequest {
    pub description: String,
    pub reference: Option<ReferenceImage>,
    pub product_description: String,
    pub product_identity: Option<String>,
    pub style: Style,
    pub seed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeOutput {
    pub image_url: String,
    /// Exact prompt text sent to the provider.
    pub resolved_prompt: String,
}

/// Per-scene text the video model sees. Prompts and transient state are left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMoment {
    pub timing: String,
    pub title: String,
    pub text: String,
    pub camera_movement: String,
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStoryboard {
    pub audio_strategy: String,
    pub music_style: Option<String>,
    pub product_identity: String,
    pub moments: [VideoMoment; SCENE_COUNT],
}

impl From<&Storyboard> for VideoStoryboard {
    fn from(board: &Storyboard) -> Self {
        Self {
            audio_strategy: board.audio_strategy.clone(),
            music_style: board.music_style.clone(),
            product_identity: board.product_identity.clone(),
            moments: board.scenes.each_ref().map(|scene| VideoMoment {
                timing: scene.timing.clone(),
                title: scene.title.clone(),
                text: scene.video_text().to_string(),
                camera_movement: scene.camera_movement.clone(),
                audio: scene.audio.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    /// Keyframe URLs in scene order.
    pub image_urls: [String; SCENE_COUNT],
    pub storyboard: VideoStoryboard,
    pub product_description: String,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutput {
    pub video_url: String,
    pub prompt: String,
}
