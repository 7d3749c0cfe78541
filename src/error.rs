// src/error.rs
//! Error taxonomy shared by the pipeline stages and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad or missing caller input. Never reaches a provider.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Provider credentials are missing. Detected before any network call.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    /// Caller-imposed deadline exceeded.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// A stage was invoked before its dependencies were satisfied.
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    /// Machine-readable error kind used in response bodies and run snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Configuration(_) => "configuration_error",
            PipelineError::Generation(_) => "generation_error",
            PipelineError::Parse(_) => "parse_error",
            PipelineError::Extraction(_) => "extraction_error",
            PipelineError::Timeout(_) => "timeout_error",
            PipelineError::Precondition(_) => "precondition_error",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::NotFound(_) => "not_found",
        }
    }

    /// Human-readable detail without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            PipelineError::Validation(msg)
            | PipelineError::Configuration(msg)
            | PipelineError::Generation(msg)
            | PipelineError::Parse(msg)
            | PipelineError::Extraction(msg)
            | PipelineError::Timeout(msg)
            | PipelineError::Precondition(msg)
            | PipelineError::Storage(msg)
            | PipelineError::NotFound(msg) => msg,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Precondition(_) => StatusCode::CONFLICT,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Advisory hints attached to server-side failures. Not meant for parsing.
    fn troubleshooting(&self) -> Option<Value> {
        match self {
            PipelineError::Configuration(_) => Some(json!({
                "credentials": "Set FAL_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY in the environment",
                "image_provider": "IMAGE_PROVIDER selects which image backend needs credentials",
            })),
            PipelineError::Generation(_) => Some(json!({
                "credits": "Verify the provider account is valid and has sufficient credits",
                "prompt": "Check if the prompt is too long or contains rejected content",
                "image_url": "Verify any reference image URL is publicly reachable",
            })),
            PipelineError::Parse(_) | PipelineError::Extraction(_) => Some(json!({
                "check_logs": "The provider answered in an unexpected shape; the raw response is logged at debug level",
            })),
            PipelineError::Timeout(_) => Some(json!({
                "timeout": "Video generation usually takes about 2 minutes; provider queues can add more",
                "retry": "Nothing was retried automatically; request the stage again when ready",
            })),
            PipelineError::Storage(_) => Some(json!({
                "asset_dir": "Ensure ASSET_DIR exists and is writable",
            })),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Generation(format!("Provider request failed: {}", err))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "request rejected");
        }

        let mut body = json!({
            "error": self.kind(),
            "details": self.detail(),
        });
        if let Some(hints) = self.troubleshooting() {
            body["troubleshooting"] = hints;
        }

        (status, Json(body)).into_response()
    }
}

/// Serializable record of a failure kept on the run for callers to inspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<&PipelineError> for ErrorInfo {
    fn from(err: &PipelineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.detail().to_string(),
            occurred_at: Utc::now(),
        }
    }
}
