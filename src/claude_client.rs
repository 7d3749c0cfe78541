use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaudeRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaudeResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ResponseContent>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl ClaudeClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: "claude-sonnet-4-5".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn require_key(&self) -> Result<&str, PipelineError> {
        self.api_key.as_deref().ok_or_else(|| {
            PipelineError::Configuration("ANTHROPIC_API_KEY is not configured".to_string())
        })
    }

    /// Single-turn completion. One attempt only; failures surface to the caller.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, PipelineError> {
        let api_key = self.require_key()?;

        let request = ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            system: None,
            temperature: Some(0.7),
        };

        tracing::debug!("Claude API Request: {} chars of prompt", prompt.len());

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .timeout(Duration::from_secs(120)) // 2-minute timeout per request
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        tracing::debug!("Claude API Response (status {}): {}", status, response_text);

        if !status.is_success() {
            tracing::error!("Claude API error ({}): {}", status, response_text);
            return Err(PipelineError::Generation(format!(
                "Claude API error ({}): {}",
                status, response_text
            )));
        }

        let parsed: ClaudeResponse = serde_json::from_str(&response_text).map_err(|e| {
            PipelineError::Generation(format!("Failed to parse Claude response: {}", e))
        })?;

        tracing::info!(
            "📝 Claude responded ({} in / {} out tokens)",
            parsed.usage.input_tokens,
            parsed.usage.output_tokens
        );

        parsed
            .content
            .into_iter()
            .find_map(|content| match content {
                ResponseContent::Text { text } => Some(text),
                ResponseContent::Other => None,
            })
            .ok_or_else(|| PipelineError::Generation("No text content in Claude response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = ClaudeClient::new(None).with_base_url("http://127.0.0.1:9");
        let result = client.generate_text("hello").await;
        assert_matches!(result, Err(PipelineError::Configuration(_)));
    }

    #[test]
    fn test_response_ignores_unknown_blocks() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "content": [{"type": "thinking", "thinking": "..."}, {"type": "text", "text": "{}"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 2}
        }"#;
        let parsed: ClaudeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_matches!(&parsed.content[1], ResponseContent::Text { text } if text == "{}");
    }
}
