// src/generators/keyframe.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{AssetStore, ImageSource, KeyframeGenerator, KeyframeOutput, KeyframeRequest, ReferenceRole};
use crate::error::PipelineError;
use crate::fal_client::FalClient;
use crate::gemini_client::{GeminiClient, InlineData};

const FAL_IMAGE_MODEL: &str = "fal-ai/nano-banana";

/// How far the provider may drift from a reference image, per role.
/// Lower keeps the output closer to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStrengths {
    pub scene: f64,
    pub identity: f64,
}

impl Default for ReferenceStrengths {
    fn default() -> Self {
        Self {
            scene: 0.5,
            identity: 0.35,
        }
    }
}

impl ReferenceStrengths {
    pub fn for_role(&self, role: ReferenceRole) -> f64 {
        match role {
            ReferenceRole::SceneConsistency => self.scene,
            ReferenceRole::IdentityConsistency => self.identity,
        }
    }
}

/// Prompt text for one keyframe. The reference-preserving preamble is added only when a reference exists.
pub fn build_prompt(request: &KeyframeRequest) -> String {
    let mut body = format!(
        "{}\n\nStyle: {}\nProduct: {}",
        request.description.trim(),
        request.style,
        request.product_description.trim()
    );
    if let Some(identity) = request.product_identity.as_deref().filter(|s| !s.trim().is_empty()) {
        body.push_str(&format!("\nProduct Identity: {}", identity.trim()));
    }
    if let Some(seed) = request.seed.as_deref() {
        body.push_str(&format!("\nSeed: {}", seed));
    }
    body.push_str("\n\nCreate a stunning, creative image.");

    match request.reference {
        Some(_) => format!(
            "Use this image as a visual reference for brand consistency (colors, style, lighting, composition). \
             Generate a new image that maintains the same visual identity:\n\n{}",
            body
        ),
        None => body,
    }
}

/// Maps an opaque seed string onto the integer seed the image API expects (FNV-1a).
pub fn numeric_seed(seed: &str) -> u32 {
    seed.bytes().fold(0x811c9dc5u32, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(0x01000193)
    })
}

fn validate(request: &KeyframeRequest) -> Result<(), PipelineError> {
    if request.description.trim().is_empty() {
        return Err(PipelineError::Validation(
            "Scene description is required to generate an image".to_string(),
        ));
    }
    Ok(())
}

/// Keyframes through fal.ai's nano-banana model.
#[derive(Debug, Clone)]
pub struct FalKeyframeGenerator {
    fal: FalClient,
    strengths: ReferenceStrengths,
}

impl FalKeyframeGenerator {
    pub fn new(fal: FalClient, strengths: ReferenceStrengths) -> Self {
        Self { fal, strengths }
    }

    pub fn build_input(&self, request: &KeyframeRequest, prompt: &str) -> Value {
        let mut input = json!({
            "prompt": prompt,
            "num_images": 1,
            "image_size": "landscape_16_9",
            "num_inference_steps": 4,
        });
        if let Some(seed) = request.seed.as_deref() {
            input["seed"] = json!(numeric_seed(seed));
        }
        if let Some(reference) = &request.reference {
            input["image_url"] = json!(reference.source.to_url());
            input["strength"] = json!(self.strengths.for_role(reference.role));
        }
        input
    }
}

#[async_trait]
impl KeyframeGenerator for FalKeyframeGenerator {
    async fn generate(&self, request: KeyframeRequest) -> Result<KeyframeOutput, PipelineError> {
        validate(&request)?;
        self.fal.require_key()?;

        let prompt = build_prompt(&request);
        let input = self.build_input(&request, &prompt);

        tracing::info!(
            "🖼️ Generating keyframe via fal.ai (reference: {})",
            request.reference.as_ref().map(|r| format!("{:?}", r.role)).unwrap_or_else(|| "none".into())
        );

        let result = self.fal.subscribe(FAL_IMAGE_MODEL, &input).await?;
        let image_url = result["images"]
            .as_array()
            .and_then(|images| images.first())
            .and_then(|image| image["url"].as_str())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| PipelineError::Generation("No images generated".to_string()))?;

        Ok(KeyframeOutput {
            image_url: image_url.to_string(),
            resolved_prompt: prompt,
        })
    }
}

/// Keyframes through Gemini's image model. Output bytes land in the asset store.
#[derive(Clone)]
pub struct GeminiKeyframeGenerator {
    gemini: GeminiClient,
    store: Arc<dyn AssetStore>,
}

impl GeminiKeyframeGenerator {
    pub fn new(gemini: GeminiClient, store: Arc<dyn AssetStore>) -> Self {
        Self { gemini, store }
    }

    async fn inline_reference(&self, source: &ImageSource) -> Result<InlineData, PipelineError> {
        match source {
            ImageSource::Inline { data, mime_type } => Ok(InlineData::from_bytes(data, mime_type)),
            ImageSource::Url(url) => self.gemini.fetch_image(url).await,
        }
    }
}

#[async_trait]
impl KeyframeGenerator for GeminiKeyframeGenerator {
    async fn generate(&self, request: KeyframeRequest) -> Result<KeyframeOutput, PipelineError> {
        validate(&request)?;
        self.gemini.require_key()?;

        let prompt = build_prompt(&request);
        let reference = match &request.reference {
            Some(reference) => Some(self.inline_reference(&reference.source).await?),
            None => None,
        };

        tracing::info!(
            "🖼️ Generating keyframe via Gemini (reference: {})",
            if reference.is_some() { "inline" } else { "none" }
        );

        let image = self.gemini.generate_image(&prompt, reference).await?;
        let extension = image
            .mime_type
            .strip_prefix("image/")
            .map(|ext| if ext == "jpeg" { "jpg" } else { ext })
            .unwrap_or("png")
            .to_string();
        let image_url = self.store.put(image.bytes, "ad-image", &extension).await?;

        Ok(KeyframeOutput {
            image_url,
            resolved_prompt: prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::ReferenceImage;
    use crate::models::Style;
    use assert_matches::assert_matches;

    fn request() -> KeyframeRequest {
        KeyframeRequest {
            description: "A red car bursts out of a neon tunnel".into(),
            reference: None,
            product_description: "A red sports car".into(),
            product_identity: Some("Crimson two-door coupe".into()),
            style: Style::Cinematic,
            seed: None,
        }
    }

    #[test]
    fn test_no_reference_prompt_shape() {
        let prompt = build_prompt(&request());
        assert!(prompt.starts_with("A red car bursts out of a neon tunnel\n\nStyle: cinematic\nProduct: A red sports car"));
        assert!(prompt.contains("\nProduct Identity: Crimson two-door coupe"));
        assert!(!prompt.contains("Seed:"));
        assert!(prompt.ends_with("Create a stunning, creative image."));
        assert!(!prompt.contains("visual reference"));
    }

    #[test]
    fn test_reference_prompt_shape() {
        let mut req = request();
        req.reference = Some(ReferenceImage::scene("https://img/0.png"));
        req.seed = Some("brand-consistency-1700000000000".into());
        let prompt = build_prompt(&req);
        assert!(prompt.starts_with("Use this image as a visual reference for brand consistency"));
        assert!(prompt.contains("Seed: brand-consistency-1700000000000"));
        assert!(prompt.contains("A red car bursts out of a neon tunnel"));
    }

    #[test]
    fn test_fal_input_uses_role_strength() {
        let generator = FalKeyframeGenerator::new(FalClient::new(Some("k".into())), ReferenceStrengths::default());

        let plain = generator.build_input(&request(), "p");
        assert_eq!(plain["num_images"], 1);
        assert_eq!(plain["image_size"], "landscape_16_9");
        assert!(plain.get("image_url").is_none());
        assert!(plain.get("seed").is_none());

        let mut chained = request();
        chained.reference = Some(ReferenceImage::scene("https://img/0.png"));
        chained.seed = Some("brand-consistency-1".into());
        let input = generator.build_input(&chained, "p");
        assert_eq!(input["image_url"], "https://img/0.png");
        assert_eq!(input["strength"], 0.5);
        assert_eq!(input["seed"], numeric_seed("brand-consistency-1"));

        chained.reference = Some(ReferenceImage {
            source: ImageSource::Url("https://brand/logo.png".into()),
            role: ReferenceRole::IdentityConsistency,
        });
        assert_eq!(generator.build_input(&chained, "p")["strength"], 0.35);
    }

    #[test]
    fn test_numeric_seed_is_stable() {
        assert_eq!(numeric_seed("brand-consistency-42"), numeric_seed("brand-consistency-42"));
        assert_ne!(numeric_seed("brand-consistency-42"), numeric_seed("brand-consistency-43"));
    }

    #[tokio::test]
    async fn test_fal_without_key_is_configuration_error() {
        let generator = FalKeyframeGenerator::new(
            FalClient::new(None).with_base_url("http://127.0.0.1:9"),
            ReferenceStrengths::default(),
        );
        assert_matches!(generator.generate(request()).await, Err(PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_description_is_validation_error() {
        let generator = FalKeyframeGenerator::new(FalClient::new(Some("k".into())), ReferenceStrengths::default());
        let mut req = request();
        req.description = "  ".into();
        assert_matches!(generator.generate(req).await, Err(PipelineError::Validation(_)));
    }
}
