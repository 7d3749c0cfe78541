// lib.rs - Ad generation pipeline: storyboard, chained keyframes, video
pub mod claude_client;
pub mod config;
pub mod error;
pub mod fal_client;
pub mod gemini_client;
pub mod generators;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod storage;

use std::path::PathBuf;

pub use error::PipelineError;
pub use pipeline::{Collaborators, Orchestrator, PipelineSettings, SessionRegistry};

/// Which providers have credentials. Reported by `/api/status`.
#[derive(Debug, Clone, Default)]
pub struct ProviderStatus {
    pub claude: bool,
    pub fal: bool,
    pub gemini: bool,
    pub image_provider: String,
}

// AppState holds the session registry, the collaborators for the stateless endpoints, and the asset directory
pub struct AppState {
    pub sessions: pipeline::SharedSessionRegistry,
    pub collaborators: Collaborators,
    pub settings: PipelineSettings,
    pub asset_dir: PathBuf,
    pub providers: ProviderStatus,
}
