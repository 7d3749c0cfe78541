// src/config.rs
//! Runtime configuration read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::generators::keyframe::ReferenceStrengths;
use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProvider {
    Fal,
    Gemini,
}

impl ImageProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageProvider::Fal => "fal",
            ImageProvider::Gemini => "gemini",
        }
    }
}

impl FromStr for ImageProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fal" => Ok(ImageProvider::Fal),
            "gemini" => Ok(ImageProvider::Gemini),
            other => Err(format!("unknown image provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub public_base_url: String,
    pub asset_dir: PathBuf,
    pub fal_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub image_provider: ImageProvider,
    pub settling_delay: Duration,
    pub video_timeout: Duration,
    pub reference_strengths: ReferenceStrengths,
    pub session_ttl_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            asset_dir: PathBuf::from("assets"),
            fal_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            image_provider: ImageProvider::Fal,
            settling_delay: Duration::from_millis(1000),
            video_timeout: Duration::from_secs(180),
            reference_strengths: ReferenceStrengths::default(),
            session_ttl_hours: 24,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let public_base_url = non_empty("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_base_url);

        Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_base_url,
            asset_dir: non_empty("ASSET_DIR").map(PathBuf::from).unwrap_or(defaults.asset_dir),
            fal_key: non_empty("FAL_KEY"),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            image_provider: parse_or("IMAGE_PROVIDER", non_empty("IMAGE_PROVIDER"), defaults.image_provider),
            settling_delay: Duration::from_millis(parse_or(
                "SETTLING_DELAY_MS",
                non_empty("SETTLING_DELAY_MS"),
                defaults.settling_delay.as_millis() as u64,
            )),
            video_timeout: Duration::from_secs(parse_or(
                "VIDEO_TIMEOUT_SECS",
                non_empty("VIDEO_TIMEOUT_SECS"),
                defaults.video_timeout.as_secs(),
            )),
            reference_strengths: ReferenceStrengths {
                scene: parse_strength(
                    "SCENE_REFERENCE_STRENGTH",
                    non_empty("SCENE_REFERENCE_STRENGTH"),
                    defaults.reference_strengths.scene,
                ),
                identity: parse_strength(
                    "IDENTITY_REFERENCE_STRENGTH",
                    non_empty("IDENTITY_REFERENCE_STRENGTH"),
                    defaults.reference_strengths.identity,
                ),
            },
            session_ttl_hours: parse_or("SESSION_TTL_HOURS", non_empty("SESSION_TTL_HOURS"), defaults.session_ttl_hours),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            settling_delay: self.settling_delay,
            video_deadline: self.video_timeout,
        }
    }

    /// Logs which providers can be reached. Missing keys only fail at call time.
    pub fn log_summary(&self) {
        let mark = |key: &Option<String>| if key.is_some() { "✅" } else { "❌" };
        tracing::info!(
            "Configuration - Claude: {}, fal.ai: {}, Gemini: {}, image provider: {}",
            mark(&self.anthropic_api_key),
            mark(&self.fal_key),
            mark(&self.gemini_api_key),
            self.image_provider.as_str()
        );
        if self.anthropic_api_key.is_none() {
            tracing::warn!("ANTHROPIC_API_KEY not found. Storyboard generation will fail until it is set.");
        }
        if self.fal_key.is_none() {
            tracing::warn!("FAL_KEY not found. Video generation will fail until it is set.");
        }
        if self.image_provider == ImageProvider::Gemini && self.gemini_api_key.is_none() {
            tracing::warn!("IMAGE_PROVIDER=gemini but GEMINI_API_KEY not found. Keyframes will fail.");
        }
        tracing::info!(
            "Assets stored in {} and served from {}/assets",
            self.asset_dir.display(),
            self.public_base_url
        );
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Invalid value for {}: '{}', using default", key, value);
                default
            }
        },
        None => default,
    }
}

fn parse_strength(key: &str, raw: Option<String>, default: f64) -> f64 {
    let value = parse_or(key, raw, default);
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        tracing::warn!("{} must be between 0 and 1, got {}; using default", key, value);
        default
    }
}
