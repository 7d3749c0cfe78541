//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use ad_studio::error::PipelineError;
use ad_studio::generators::{
    AssetStore, KeyframeGenerator, KeyframeOutput, KeyframeRequest, StoryboardGenerator,
    VideoOutput, VideoRequest, VideoSynthesizer,
};
use ad_studio::handlers::app_router;
use ad_studio::models::{SceneRole, SceneStatus, Storyboard, Style};
use ad_studio::pipeline::{Collaborators, Orchestrator, PipelineSettings, SessionRegistry};
use ad_studio::{AppState, ProviderStatus};

/// Storyboard whose scene `i` is described as `"{tag} scene {i}"`.
pub fn sample_storyboard(tag: &str) -> Storyboard {
    let mut board = Storyboard::skeleton();
    board.product_identity = "glossy red two-door coupe, chrome wheels".to_string();
    board.audio_strategy = "engine roar under a pulsing synth bed".to_string();
    board.music_style = Some("synthwave".to_string());
    for (i, scene) in board.scenes.iter_mut().enumerate() {
        scene.summary = format!("{} summary {}", tag, i);
        scene.description = format!("{} scene {}", tag, i);
        scene.camera_movement = "slow dolly in".to_string();
        scene.audio = "engine rev".to_string();
        assert_eq!(scene.role, SceneRole::at(i).unwrap());
    }
    board
}

/// Replays storyboards in order, repeating the last one. `None` fails with a parse error.
pub struct ScriptedStoryboard {
    script: Mutex<Vec<Option<Storyboard>>>,
    calls: AtomicUsize,
}

impl ScriptedStoryboard {
    pub fn new(script: Vec<Option<Storyboard>>) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryboardGenerator for ScriptedStoryboard {
    async fn generate(
        &self,
        _prompt: &str,
        _style: Style,
        _reference_image_url: Option<&str>,
    ) -> Result<Storyboard, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().cloned().flatten()
            }
        };
        next.ok_or_else(|| PipelineError::Parse("Expected exactly 3 moments, got 2".to_string()))
    }
}

/// Records every request; returns `https://img.test/k{n}.png` for the n-th call.
#[derive(Default)]
pub struct RecordingKeyframes {
    requests: Mutex<Vec<KeyframeRequest>>,
    failing: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl RecordingKeyframes {
    pub fn fail_on(&self, description: &str) {
        self.failing.lock().unwrap().insert(description.to_string());
    }

    /// Blocks subsequent calls (after they are recorded) until `release`.
    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn requests(&self) -> Vec<KeyframeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl KeyframeGenerator for RecordingKeyframes {
    async fn generate(&self, request: KeyframeRequest) -> Result<KeyframeOutput, PipelineError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing.lock().unwrap().contains(&request.description) {
            return Err(PipelineError::Generation("Image API error: 500".to_string()));
        }
        Ok(KeyframeOutput {
            image_url: format!("https://img.test/k{}.png", n),
            resolved_prompt: format!("{}\n\nStyle: {}", request.description, request.style),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoBehavior {
    Succeed,
    NoUrl,
    Hang,
}

pub struct FakeVideo {
    behavior: Mutex<VideoBehavior>,
    requests: Mutex<Vec<VideoRequest>>,
}

impl FakeVideo {
    pub fn new(behavior: VideoBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, behavior: VideoBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn requests(&self) -> Vec<VideoRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoSynthesizer for FakeVideo {
    async fn generate(&self, request: VideoRequest) -> Result<VideoOutput, PipelineError> {
        self.requests.lock().unwrap().push(request);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            VideoBehavior::Succeed => Ok(VideoOutput {
                video_url: "https://video.test/ad.mp4".to_string(),
                prompt: "Create an 8-second cinematic commercial".to_string(),
            }),
            VideoBehavior::NoUrl => Err(PipelineError::Extraction(
                "No video URL found in response".to_string(),
            )),
            VideoBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(PipelineError::Generation("unreachable".to_string()))
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryAssets {
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemoryAssets {
    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for MemoryAssets {
    async fn put(
        &self,
        data: Vec<u8>,
        suggested_name: &str,
        _default_extension: &str,
    ) -> Result<String, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::Validation("No file provided".to_string()));
        }
        let mut stored = self.stored.lock().unwrap();
        let url = format!("https://assets.test/{}-{}", stored.len(), suggested_name);
        stored.push((url.clone(), data));
        Ok(url)
    }
}

pub struct Harness {
    pub storyboard: Arc<ScriptedStoryboard>,
    pub keyframes: Arc<RecordingKeyframes>,
    pub video: Arc<FakeVideo>,
    pub assets: Arc<MemoryAssets>,
    pub settings: PipelineSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storyboards(vec![Some(sample_storyboard("car"))])
    }

    pub fn with_storyboards(script: Vec<Option<Storyboard>>) -> Self {
        Self {
            storyboard: Arc::new(ScriptedStoryboard::new(script)),
            keyframes: Arc::new(RecordingKeyframes::default()),
            video: Arc::new(FakeVideo::new(VideoBehavior::Succeed)),
            assets: Arc::new(MemoryAssets::default()),
            settings: PipelineSettings {
                settling_delay: Duration::ZERO,
                video_deadline: Duration::from_secs(5),
            },
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            storyboard: self.storyboard.clone(),
            keyframes: self.keyframes.clone(),
            video: self.video.clone(),
            assets: self.assets.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.collaborators(), self.settings.clone())
    }

    pub fn app_state(&self, asset_dir: PathBuf) -> Arc<AppState> {
        Arc::new(AppState {
            sessions: Arc::new(SessionRegistry::new(self.collaborators(), self.settings.clone())),
            collaborators: self.collaborators(),
            settings: self.settings.clone(),
            asset_dir,
            providers: ProviderStatus {
                claude: true,
                fal: true,
                gemini: false,
                image_provider: "fal".to_string(),
            },
        })
    }
}

/// Orchestrator with a finished, fully illustrated storyboard.
pub async fn ready_run(harness: &Harness) -> Orchestrator {
    let orchestrator = harness.orchestrator();
    orchestrator
        .start_run("A red sports car", Some(Style::Cinematic), None)
        .await
        .unwrap();
    orchestrator.settle().await;
    orchestrator
}

pub async fn scene_statuses(orchestrator: &Orchestrator) -> Vec<SceneStatus> {
    let snapshot = orchestrator.snapshot().await;
    snapshot
        .run
        .storyboard
        .map(|board| board.scenes.iter().map(|s| s.status.clone()).collect())
        .unwrap_or_default()
}

pub fn build_test_app(state: Arc<AppState>) -> Router {
    app_router(state)
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status");
}
