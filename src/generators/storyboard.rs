// src/generators/storyboard.rs
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::StoryboardGenerator;
use crate::claude_client::ClaudeClient;
use crate::error::PipelineError;
use crate::models::{Scene, SceneRole, Storyboard, Style, SCENE_COUNT};

/// Storyboard writer backed by Claude.
#[derive(Debug, Clone)]
pub struct ClaudeStoryboardGenerator {
    client: ClaudeClient,
}

impl ClaudeStoryboardGenerator {
    pub fn new(client: ClaudeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoryboardGenerator for ClaudeStoryboardGenerator {
    async fn generate(
        &self,
        prompt: &str,
        style: Style,
        reference_image_url: Option<&str>,
    ) -> Result<Storyboard, PipelineError> {
        if prompt.trim().is_empty() {
            return Err(PipelineError::Validation("Prompt is required".to_string()));
        }

        let request = build_prompt(prompt, style, reference_image_url);
        let text = self.client.generate_text(&request).await?;
        let storyboard = parse_storyboard(&text)?;

        tracing::info!(
            "🎬 Storyboard ready for '{}' ({} style)",
            truncate(prompt, 60),
            style
        );
        Ok(storyboard)
    }
}

pub fn build_prompt(prompt: &str, style: Style, reference_image_url: Option<&str>) -> String {
    let reference_line = reference_image_url
        .filter(|url| !url.trim().is_empty())
        .map(|url| format!("Reference Image: {}\n", url))
        .unwrap_or_default();

    let scene_list: String = SceneRole::ALL
        .iter()
        .map(|role| format!("- {} {}\n", role.timing(), role.title()))
        .collect();

    format!(
        r#"Create a storyboard for an 8-second video ad.

Product: {prompt}
Visual Style: {style}
{reference_line}
{personality}

Create 3 scenes for an 8-second ad:
{scene_list}
For each scene, provide:
- SHORT SUMMARY (1 sentence)
- DETAILED DESCRIPTION (be creative and vivid)
- CAMERA MOVEMENT
- AUDIO (dialogue, SFX, music)
- PRODUCT_IDENTITY (consistent product description)

Return ONLY valid JSON:
{{
  "productIdentity": "Product description",
  "audioStrategy": "Audio approach",
  "musicStyle": "Music style" or null,
  "voiceoverScript": "Script" or null,
  "moments": [
    {{
      "timing": "[00:00-00:03]",
      "title": "Opening Hook",
      "summary": "Brief summary",
      "description": "Detailed creative description",
      "cameraMovement": "Camera movement",
      "audio": "Audio description",
      "productIdentity": "Product description"
    }},
    {{
      "timing": "[00:03-00:06]",
      "title": "Product Showcase",
      "summary": "Brief summary",
      "description": "Detailed creative description",
      "cameraMovement": "Camera movement",
      "audio": "Audio description",
      "productIdentity": "Product description"
    }},
    {{
      "timing": "[00:06-00:08]",
      "title": "Closing Message",
      "summary": "Brief summary",
      "description": "Detailed creative description with clear ending",
      "cameraMovement": "Camera movement",
      "audio": "Audio description",
      "productIdentity": "Product description"
    }}
  ]
}}"#,
        prompt = prompt.trim(),
        style = style,
        reference_line = reference_line,
        personality = style.personality(),
        scene_list = scene_list,
    )
}

/// Wire shape the text model is asked to produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStoryboard {
    #[serde(default)]
    product_identity: Option<String>,
    #[serde(default)]
    audio_strategy: Option<String>,
    #[serde(default)]
    music_style: Option<String>,
    #[serde(default)]
    voiceover_script: Option<String>,
    #[serde(default)]
    moments: Vec<RawMoment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoment {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    camera_movement: String,
    #[serde(default)]
    audio: String,
    #[serde(default)]
    product_identity: Option<String>,
}

/// Parses a model reply into a storyboard with canonical titles and timings.
pub fn parse_storyboard(text: &str) -> Result<Storyboard, PipelineError> {
    let value = extract_json(text)?;
    let raw: RawStoryboard = serde_json::from_value(value)
        .map_err(|e| PipelineError::Parse(format!("Storyboard JSON has an unexpected shape: {}", e)))?;

    let moments: [RawMoment; SCENE_COUNT] = raw.moments.try_into().map_err(|moments: Vec<RawMoment>| {
        PipelineError::Parse(format!(
            "Storyboard must contain exactly {} moments, got {}",
            SCENE_COUNT,
            moments.len()
        ))
    })?;

    let mut index = 0;
    let scenes = moments.map(|moment| {
        let role = SceneRole::ALL[index];
        index += 1;
        Scene {
            summary: moment.summary.trim().to_string(),
            description: moment.description.trim().to_string(),
            camera_movement: moment.camera_movement.trim().to_string(),
            audio: moment.audio.trim().to_string(),
            product_identity: non_blank(moment.product_identity),
            ..Scene::blank(role)
        }
    });

    Ok(Storyboard {
        product_identity: non_blank(raw.product_identity).unwrap_or_default(),
        audio_strategy: non_blank(raw.audio_strategy).unwrap_or_default(),
        music_style: non_blank(raw.music_style),
        voiceover_script: non_blank(raw.voiceover_script),
        scenes,
    })
}

/// Whole reply as JSON first, then the first balanced top-level `{...}` block.
pub fn extract_json(text: &str) -> Result<Value, PipelineError> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    let block = first_object_block(text)
        .ok_or_else(|| PipelineError::Parse("No JSON found in AI response".to_string()))?;

    tracing::debug!("Extracted JSON block of {} bytes from model reply", block.len());

    serde_json::from_str(block)
        .map_err(|e| PipelineError::Parse(format!("Failed to parse storyboard JSON: {}", e)))
}

/// Finds the first balanced `{...}` span, ignoring braces inside string literals.
fn first_object_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
