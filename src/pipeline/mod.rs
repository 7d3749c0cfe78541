// src/pipeline/mod.rs
pub mod chain;
pub mod orchestrator;
pub mod progress;
pub mod sessions;

pub use orchestrator::{Collaborators, Orchestrator, PipelineSettings};
pub use progress::{ProgressCurve, ProgressTracker};
pub use sessions::{SessionRegistry, SharedSessionRegistry};
