use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    image_model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

impl InlineData {
    pub fn from_bytes(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: BASE64_STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    pub response_modalities: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

/// Decoded image returned by the model, plus any text it produced alongside.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image-preview".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_key(&self) -> Result<&str, PipelineError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration("GEMINI_API_KEY is not configured".to_string()))
    }

    /// Text-and-image generation. The reference, when present, goes first as an inline part.
    pub async fn generate_image(
        &self,
        prompt: &str,
        reference: Option<InlineData>,
    ) -> Result<GeneratedImage, PipelineError> {
        let api_key = self.require_key()?;

        let mut parts = Vec::with_capacity(2);
        if let Some(inline_data) = reference {
            parts.push(Part::InlineData { inline_data });
        }
        parts.push(Part::Text { text: prompt.to_string() });

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts,
                role: Some("user".to_string()),
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.image_model, api_key
        );

        tracing::debug!("Gemini image request: {} chars of prompt", prompt.len());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(120))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            tracing::error!("Gemini API error ({}): {}", status, response_text);
            return Err(PipelineError::Generation(format!(
                "Gemini API error ({}): {}",
                status, response_text
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&response_text).map_err(|e| {
            PipelineError::Generation(format!("Failed to parse Gemini response: {}", e))
        })?;

        extract_image(parsed)
    }

    /// Downloads a remote image so it can be sent inline.
    pub async fn fetch_image(&self, url: &str) -> Result<InlineData, PipelineError> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Generation(format!(
                "Failed to download reference image ({}): {}",
                response.status(),
                url
            )));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| "image/png".to_string());
        let bytes = response.bytes().await?;

        Ok(InlineData::from_bytes(&bytes, &mime_type))
    }
}

/// First `image/*` inline part of the first candidate wins.
fn extract_image(response: GenerateContentResponse) -> Result<GeneratedImage, PipelineError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Generation("Gemini returned no candidates".to_string()))?;

    let finish_reason = candidate.finish_reason.clone();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = None;
    for part in parts {
        match part {
            Part::InlineData { inline_data } if inline_data.mime_type.starts_with("image/") => {
                let bytes = BASE64_STANDARD.decode(&inline_data.data).map_err(|e| {
                    PipelineError::Generation(format!("Failed to decode base64 image: {}", e))
                })?;
                return Ok(GeneratedImage {
                    bytes,
                    mime_type: inline_data.mime_type,
                    text,
                });
            }
            Part::Text { text: t } if text.is_none() => text = Some(t),
            _ => {}
        }
    }

    let reason = finish_reason.unwrap_or_else(|| "unknown".to_string());
    Err(PipelineError::Generation(format!(
        "No image was generated (finish reason: {})",
        reason
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_extracts_first_image_part() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Here is your image"},
                    {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                ]},
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let image = extract_image(parsed).unwrap();
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.text.as_deref(), Some("Here is your image"));
    }

    #[test]
    fn test_text_only_response_is_generation_error() {
        let raw = r#"{"candidates": [{"content": {"parts": [{"text": "I can't draw that"}]}, "finishReason": "SAFETY"}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let err = extract_image(parsed).unwrap_err();
        assert_matches!(&err, PipelineError::Generation(msg) if msg.contains("SAFETY"));
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData { inline_data: InlineData::from_bytes(b"hello", "image/jpeg") },
                    Part::Text { text: "draw".into() },
                ],
                role: Some("user".into()),
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".into(), "IMAGE".into()],
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(value["contents"][0]["parts"][1]["text"], "draw");
        assert_eq!(value["generationConfig"]["responseModalities"][1], "IMAGE");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = GeminiClient::new(None).with_base_url("http://127.0.0.1:9");
        let result = client.generate_image("a car", None).await;
        assert_matches!(result, Err(PipelineError::Configuration(_)));
    }
}
