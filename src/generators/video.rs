// src/generators/video.rs
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{VideoOutput, VideoRequest, VideoSynthesizer};
use crate::error::PipelineError;
use crate::fal_client::FalClient;

const FAL_VIDEO_MODEL: &str = "fal-ai/veo3.1/reference-to-video";

pub const NEGATIVE_PROMPT: &str =
    "blurry, low quality, distorted, warped, deformed, bad anatomy, watermark, signature";

type UrlExtractor = fn(&Value) -> Option<&str>;

fn at_pointer<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer)?.as_str()
}

fn video_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/video/url")
}

fn data_video_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/data/video/url")
}

fn data_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/data/url")
}

fn top_level_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/url")
}

fn output_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/output/url")
}

fn output_video_url(v: &Value) -> Option<&str> {
    at_pointer(v, "/output/video/url")
}

fn bare_string(v: &Value) -> Option<&str> {
    v.as_str()
}

/// Places a video URL has been seen in provider responses, most specific first.
const URL_EXTRACTORS: [(&str, UrlExtractor); 7] = [
    ("video.url", video_url),
    ("data.video.url", data_video_url),
    ("data.url", data_url),
    ("url", top_level_url),
    ("output.url", output_url),
    ("output.video.url", output_video_url),
    ("<string>", bare_string),
];

pub fn extract_video_url(result: &Value) -> Result<String, PipelineError> {
    for (path, extractor) in URL_EXTRACTORS.iter() {
        if let Some(url) = extractor(result).map(str::trim).filter(|url| !url.is_empty()) {
            tracing::debug!("Video URL found at {}", path);
            return Ok(url.to_string());
        }
    }

    tracing::error!("No video URL in provider response: {}", result);
    Err(PipelineError::Extraction(
        "No video URL found in the video provider response".to_string(),
    ))
}

pub fn build_video_prompt(request: &VideoRequest) -> String {
    let board = &request.storyboard;
    let scenes = board
        .moments
        .iter()
        .map(|moment| {
            format!(
                "{}: {}\n{}\nCamera: {}",
                moment.timing, moment.title, moment.text, moment.camera_movement
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Create an 8-second {style} commercial for {product}.\n\n\
         SCENES:\n{scenes}\n\n\
         Audio: {audio}\n\
         Music: {music}\n\n\
         Style: {style}, cinematic, professional quality\n\
         Duration: 8 seconds\n\
         Smooth transitions between scenes",
        style = request.style,
        product = request.product_description.trim(),
        scenes = scenes,
        audio = board.audio_strategy,
        music = board.music_style.as_deref().unwrap_or("none"),
    )
}

/// Video through fal.ai's Veo 3.1 reference-to-video model.
#[derive(Debug, Clone)]
pub struct FalVideoSynthesizer {
    fal: FalClient,
}

impl FalVideoSynthesizer {
    pub fn new(fal: FalClient) -> Self {
        Self { fal }
    }

    pub fn build_payload(request: &VideoRequest, prompt: &str) -> Value {
        json!({
            "image_urls": request.image_urls,
            "prompt": prompt,
            "negative_prompt": NEGATIVE_PROMPT,
            "duration": "8s",
            "resolution": "720p",
            "aspect_ratio": "16:9",
            "generate_audio": true,
        })
    }
}

#[async_trait]
impl VideoSynthesizer for FalVideoSynthesizer {
    async fn generate(&self, request: VideoRequest) -> Result<VideoOutput, PipelineError> {
        if request.image_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(PipelineError::Validation(
                "All 3 keyframe images are required to create the video".to_string(),
            ));
        }
        self.fal.require_key()?;

        let prompt = build_video_prompt(&request);
        let payload = Self::build_payload(&request, &prompt);

        tracing::info!("🎥 Starting video generation with Veo 3.1 (~2 minutes)");

        let result = self.fal.subscribe(FAL_VIDEO_MODEL, &payload).await?;
        let video_url = extract_video_url(&result)?;

        tracing::info!("✅ Video ready: {}", video_url);
        Ok(VideoOutput { video_url, prompt })
    }
}
