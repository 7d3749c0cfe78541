// src/models/storyboard.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Every storyboard has exactly this many scenes.
pub const SCENE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    Luxury,
    Minimal,
    Retro,
    Cinematic,
    FastCut,
    Lifestyle,
    DirectToCamera,
}

impl Style {
    pub const ALL: [Style; 7] = [
        Style::Luxury,
        Style::Minimal,
        Style::Retro,
        Style::Cinematic,
        Style::FastCut,
        Style::Lifestyle,
        Style::DirectToCamera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Luxury => "luxury",
            Style::Minimal => "minimal",
            Style::Retro => "retro",
            Style::Cinematic => "cinematic",
            Style::FastCut => "fast-cut",
            Style::Lifestyle => "lifestyle",
            Style::DirectToCamera => "direct-to-camera",
        }
    }

    /// Art direction paragraph for the storyboard prompt.
    /// Styles without their own paragraph borrow the cinematic one.
    pub fn personality(&self) -> &'static str {
        match self {
            Style::Luxury => "Luxury aesthetic: Premium, elegant, sophisticated. High-end materials, perfect lighting, smooth camera movements.",
            Style::Minimal => "Minimal aesthetic: Clean, simple, zen-like. Soft lighting, deliberate movements, negative space.",
            Style::Retro => "1960s Retro aesthetic: Warm vintage colors, film grain, nostalgic feel, period-appropriate elements.",
            Style::FastCut => "Fast-cut aesthetic: Rapid editing, multiple angles, explosive energy, vibrant colors, TikTok/Reels style.",
            Style::Lifestyle => "Lifestyle aesthetic: Authentic, relatable, natural lighting, real people in real moments.",
            Style::Cinematic | Style::DirectToCamera => "Cinematic aesthetic: Epic, dramatic, film-like. High contrast, anamorphic lens flares, emotional storytelling.",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Style::ALL
            .iter()
            .copied()
            .find(|style| style.as_str() == wanted)
            .ok_or_else(|| PipelineError::Validation(format!("Unknown style '{}'", s.trim())))
    }
}

/// The three fixed narrative beats, in temporal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneRole {
    OpeningHook,
    ProductShowcase,
    ClosingMessage,
}

impl SceneRole {
    pub const ALL: [SceneRole; SCENE_COUNT] = [
        SceneRole::OpeningHook,
        SceneRole::ProductShowcase,
        SceneRole::ClosingMessage,
    ];

    pub fn at(index: usize) -> Option<SceneRole> {
        Self::ALL.get(index).copied()
    }

    pub fn title(&self) -> &'static str {
        match self {
            SceneRole::OpeningHook => "Opening Hook",
            SceneRole::ProductShowcase => "Product Showcase",
            SceneRole::ClosingMessage => "Closing Message",
        }
    }

    pub fn timing(&self) -> &'static str {
        match self {
            SceneRole::OpeningHook => "[00:00-00:03]",
            SceneRole::ProductShowcase => "[00:03-00:06]",
            SceneRole::ClosingMessage => "[00:06-00:08]",
        }
    }
}

/// Lifecycle of one scene's keyframe. Only `Ready` carries an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SceneStatus {
    Empty,
    Generating,
    Ready { image_url: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub role: SceneRole,
    pub timing: String,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub camera_movement: String,
    pub audio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    /// Prompt text actually sent to the image provider for the current image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_prompt: Option<String>,
    pub status: SceneStatus,
}

impl Scene {
    pub fn blank(role: SceneRole) -> Self {
        Self {
            role,
            timing: role.timing().to_string(),
            title: role.title().to_string(),
            summary: String::new(),
            description: String::new(),
            camera_movement: String::new(),
            audio: String::new(),
            product_identity: None,
            custom_prompt: None,
            full_prompt: None,
            status: SceneStatus::Empty,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.status {
            SceneStatus::Ready { image_url } => Some(image_url),
            _ => None,
        }
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.status, SceneStatus::Generating)
    }

    /// Text a keyframe is generated from: the custom prompt when set, else the description.
    pub fn prompt_source(&self) -> &str {
        match self.custom_prompt.as_deref() {
            Some(custom) if !custom.trim().is_empty() => custom,
            _ => &self.description,
        }
    }

    /// Text sent to the video model for this beat.
    pub fn video_text(&self) -> &str {
        if self.summary.trim().is_empty() {
            &self.description
        } else {
            &self.summary
        }
    }

    /// Copies the generated text fields of `other`, leaving image state alone.
    pub fn replace_text(&mut self, other: &Scene) {
        self.summary = other.summary.clone();
        self.description = other.description.clone();
        self.camera_movement = other.camera_movement.clone();
        self.audio = other.audio.clone();
        self.product_identity = other.product_identity.clone();
    }
}

/// Text fields a caller may edit in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneField {
    Summary,
    Description,
    CustomPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub product_identity: String,
    pub audio_strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voiceover_script: Option<String>,
    pub scenes: [Scene; SCENE_COUNT],
}

impl Storyboard {
    /// Placeholder shown while the text model is still writing.
    pub fn skeleton() -> Self {
        Self {
            product_identity: String::new(),
            audio_strategy: String::new(),
            music_style: None,
            voiceover_script: None,
            scenes: SceneRole::ALL.map(Scene::blank),
        }
    }

    /// Run-level identity wins over the per-scene override.
    pub fn identity_for(&self, index: usize) -> Option<String> {
        if !self.product_identity.trim().is_empty() {
            return Some(self.product_identity.clone());
        }
        self.scenes
            .get(index)
            .and_then(|scene| scene.product_identity.clone())
            .filter(|identity| !identity.trim().is_empty())
    }

    /// All three image URLs in scene order, or `None` if any scene is not ready.
    pub fn ready_images(&self) -> Option<[String; SCENE_COUNT]> {
        let [a, b, c] = &self.scenes;
        Some([
            a.image_url()?.to_string(),
            b.image_url()?.to_string(),
            c.image_url()?.to_string(),
        ])
    }
}

pub fn validate_scene_index(index: usize) -> Result<(), PipelineError> {
    if index < SCENE_COUNT {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "Scene index {} is out of range (0-{})",
            index,
            SCENE_COUNT - 1
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parsing() {
        assert_eq!("cinematic".parse::<Style>().unwrap(), Style::Cinematic);
        assert_eq!(" Fast-Cut ".parse::<Style>().unwrap(), Style::FastCut);
        assert!("vaporwave".parse::<Style>().is_err());
        assert!("".parse::<Style>().is_err());
    }

    #[test]
    fn test_style_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Style::DirectToCamera).unwrap();
        assert_eq!(json, "\"direct-to-camera\"");
    }

    #[test]
    fn test_direct_to_camera_borrows_cinematic_personality() {
        assert_eq!(Style::DirectToCamera.personality(), Style::Cinematic.personality());
        assert_ne!(Style::Luxury.personality(), Style::Cinematic.personality());
    }

    #[test]
    fn test_skeleton_has_canonical_scenes() {
        let board = Storyboard::skeleton();
        assert_eq!(board.scenes[0].title, "Opening Hook");
        assert_eq!(board.scenes[1].timing, "[00:03-00:06]");
        assert_eq!(board.scenes[2].role, SceneRole::ClosingMessage);
        assert!(board.scenes.iter().all(|s| s.status == SceneStatus::Empty));
        assert!(board.ready_images().is_none());
    }

    #[test]
    fn test_prompt_source_prefers_custom_prompt() {
        let mut scene = Scene::blank(SceneRole::OpeningHook);
        scene.description = "a car on a road".into();
        assert_eq!(scene.prompt_source(), "a car on a road");

        scene.custom_prompt = Some("   ".into());
        assert_eq!(scene.prompt_source(), "a car on a road");

        scene.custom_prompt = Some("a car in the rain".into());
        assert_eq!(scene.prompt_source(), "a car in the rain");
    }

    #[test]
    fn test_video_text_falls_back_to_description() {
        let mut scene = Scene::blank(SceneRole::ClosingMessage);
        scene.description = "logo reveal".into();
        assert_eq!(scene.video_text(), "logo reveal");
        scene.summary = "brand sign-off".into();
        assert_eq!(scene.video_text(), "brand sign-off");
    }

    #[test]
    fn test_identity_precedence() {
        let mut board = Storyboard::skeleton();
        board.scenes[1].product_identity = Some("red coupe".into());
        assert_eq!(board.identity_for(0), None);
        assert_eq!(board.identity_for(1).as_deref(), Some("red coupe"));

        board.product_identity = "crimson sports car".into();
        assert_eq!(board.identity_for(1).as_deref(), Some("crimson sports car"));
    }

    #[test]
    fn test_scene_status_serializes_with_state_tag() {
        let status = SceneStatus::Ready { image_url: "https://x/1.png".into() };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "ready");
        assert_eq!(value["image_url"], "https://x/1.png");
    }

    #[test]
    fn test_validate_scene_index() {
        assert!(validate_scene_index(2).is_ok());
        assert!(validate_scene_index(3).is_err());
    }
}
