// src/models/run.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::storyboard::{Storyboard, Style};
use crate::error::{ErrorInfo, PipelineError};

/// Where the run sits in `input -> storyboard -> video`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Input,
    Storyboard,
    Video,
}

/// Work currently in flight for the run, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Idle,
    WritingStoryboard,
    GeneratingKeyframes,
    RenderingVideo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub prompt: String,
    pub style: Option<Style>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_image_url: Option<String>,
    pub stage: Stage,
    pub activity: Activity,
    pub storyboard: Option<Storyboard>,
    pub consistency_seed: Option<String>,
    pub seed_image_url: Option<String>,
    pub video_url: Option<String>,
    pub last_error: Option<ErrorInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// A session with nothing submitted yet.
    pub fn idle() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            prompt: String::new(),
            style: None,
            reference_image_url: None,
            stage: Stage::Input,
            activity: Activity::Idle,
            storyboard: None,
            consistency_seed: None,
            seed_image_url: None,
            video_url: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh run at the storyboard stage with an empty skeleton.
    pub fn start(prompt: &str, style: Style, reference_image_url: Option<String>) -> Self {
        Self {
            prompt: prompt.to_string(),
            style: Some(style),
            reference_image_url,
            stage: Stage::Storyboard,
            activity: Activity::WritingStoryboard,
            storyboard: Some(Storyboard::skeleton()),
            ..Self::idle()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record_error(&mut self, err: &PipelineError) {
        self.last_error = Some(ErrorInfo::from(err));
        self.touch();
    }
}

/// Read-only view handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(flatten)]
    pub run: Run,
    /// Advisory completion estimate for the active stage, 0-100.
    pub progress: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::storyboard::SceneStatus;

    #[test]
    fn test_start_builds_skeleton() {
        let run = Run::start("A red sports car", Style::Cinematic, None);
        assert_eq!(run.stage, Stage::Storyboard);
        assert_eq!(run.activity, Activity::WritingStoryboard);
        let board = run.storyboard.expect("skeleton");
        assert!(board.scenes.iter().all(|s| s.status == SceneStatus::Empty));
        assert!(run.consistency_seed.is_none());
    }

    #[test]
    fn test_snapshot_flattens_run() {
        let snapshot = RunSnapshot { run: Run::idle(), progress: 0 };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["stage"], "input");
        assert_eq!(value["activity"], "idle");
        assert_eq!(value["progress"], 0);
    }
}
