// src/pipeline/orchestrator.rs
//! Owns one run end to end: storyboard, the chained keyframes, then the video.
//!
//! State lives behind a single `RwLock`. Writers take it only to read inputs or
//! record outcomes; it is never held while a provider call is awaited.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::chain;
use super::progress::{ProgressCurve, ProgressTracker};
use crate::error::PipelineError;
use crate::generators::{
    AssetStore, KeyframeGenerator, KeyframeRequest, ReferenceImage, StoryboardGenerator,
    VideoRequest, VideoStoryboard, VideoSynthesizer,
};
use crate::models::{
    validate_scene_index, Activity, Run, RunSnapshot, Scene, SceneField, SceneStatus, Stage,
    Storyboard, Style, SCENE_COUNT,
};

/// The four collaborators a run depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub storyboard: Arc<dyn StoryboardGenerator>,
    pub keyframes: Arc<dyn KeyframeGenerator>,
    pub video: Arc<dyn VideoSynthesizer>,
    pub assets: Arc<dyn AssetStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Pause between consecutive keyframe calls in the chain.
    pub settling_delay: Duration,
    /// Caller-side deadline for the whole video call.
    pub video_deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            settling_delay: Duration::from_secs(1),
            video_deadline: Duration::from_secs(180),
        }
    }
}

struct RunState {
    run: Run,
    progress: ProgressTracker,
    /// Identifies the video call whose result may still be recorded.
    video_attempt: Option<Uuid>,
}

struct Inner {
    collaborators: Collaborators,
    settings: PipelineSettings,
    state: RwLock<RunState>,
    background: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                collaborators,
                settings,
                state: RwLock::new(RunState {
                    run: Run::idle(),
                    progress: ProgressTracker::new(),
                    video_attempt: None,
                }),
                background: Mutex::new(None),
            }),
        }
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let state = self.inner.state.read().await;
        RunSnapshot {
            run: state.run.clone(),
            progress: state.progress.percent(),
        }
    }

    /// Starts a fresh run and kicks off storyboard generation in the background.
    /// Any previous run is discarded along with its in-flight work.
    pub async fn start_run(
        &self,
        prompt: &str,
        style: Option<Style>,
        reference_image_url: Option<String>,
    ) -> Result<RunSnapshot, PipelineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(PipelineError::Validation("Prompt is required".to_string()));
        }
        let style = style.ok_or_else(|| {
            PipelineError::Validation("A visual style must be selected".to_string())
        })?;
        let reference_image_url = reference_image_url.filter(|url| !url.trim().is_empty());

        let mut background = self.inner.background.lock().await;
        if let Some(previous) = background.take() {
            previous.abort();
        }

        let run = Run::start(prompt, style, reference_image_url);
        let run_id = run.id;
        {
            let mut state = self.inner.state.write().await;
            state.run = run;
            state.progress.start(ProgressCurve::Storyboard);
        }

        tracing::info!("🚀 Run {} started ({} style)", run_id, style);

        let this = self.clone();
        *background = Some(tokio::spawn(async move {
            this.drive_storyboard(run_id).await;
        }));
        drop(background);

        Ok(self.snapshot().await)
    }

    /// Waits for the current background work (storyboard and keyframe chain) to finish.
    pub async fn settle(&self) {
        let handle = self.inner.background.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!("Background pipeline task panicked: {}", e);
                }
            }
        }
    }

    async fn drive_storyboard(&self, run_id: Uuid) {
        let inputs = {
            let state = self.inner.state.read().await;
            if state.run.id != run_id {
                return;
            }
            state
                .run
                .style
                .map(|style| (state.run.prompt.clone(), style, state.run.reference_image_url.clone()))
        };
        let Some((prompt, style, reference)) = inputs else {
            return;
        };

        let result = self
            .inner
            .collaborators
            .storyboard
            .generate(&prompt, style, reference.as_deref())
            .await;

        if self.on_storyboard_ready(run_id, result).await {
            self.run_keyframe_chain(run_id).await;
        }
    }

    /// Applies the storyboard outcome. Returns whether the keyframe chain should start.
    pub async fn on_storyboard_ready(
        &self,
        run_id: Uuid,
        result: Result<Storyboard, PipelineError>,
    ) -> bool {
        let mut guard = self.inner.state.write().await;
        let RunState { run, progress, .. } = &mut *guard;
        if run.id != run_id {
            tracing::debug!("Discarding storyboard for replaced run {}", run_id);
            return false;
        }

        match result {
            Ok(storyboard) => {
                run.storyboard = Some(storyboard);
                run.activity = Activity::GeneratingKeyframes;
                run.touch();
                tracing::info!("📋 Storyboard ready for run {}, generating keyframes", run_id);
                true
            }
            Err(err) => {
                tracing::error!("❌ Storyboard generation failed for run {}: {}", run_id, err);
                run.stage = Stage::Input;
                run.activity = Activity::Idle;
                run.storyboard = None;
                run.record_error(&err);
                progress.finish(false);
                false
            }
        }
    }

    /// Generates the three keyframes in order, each referencing the one before.
    /// Stops at the first failure; earlier scenes keep their images.
    pub async fn run_keyframe_chain(&self, run_id: Uuid) {
        let mut completed = true;

        for index in 0..SCENE_COUNT {
            if let Err(err) = self.generate_scene(run_id, index, None).await {
                tracing::warn!("⛓️ Keyframe chain stopped at scene {}: {}", index + 1, err);
                completed = false;
                break;
            }

            if chain::anchors_run(index) {
                let mut state = self.inner.state.write().await;
                if state.run.id != run_id {
                    return;
                }
                let seed = chain::mint_seed();
                tracing::debug!("Run {} consistency seed {}", run_id, seed);
                state.run.consistency_seed = Some(seed);
            }

            if index + 1 < SCENE_COUNT {
                tokio::time::sleep(self.inner.settings.settling_delay).await;
            }
        }

        let mut guard = self.inner.state.write().await;
        let RunState { run, progress, .. } = &mut *guard;
        if run.id != run_id {
            return;
        }
        if run.activity == Activity::GeneratingKeyframes {
            run.activity = Activity::Idle;
        }
        progress.finish(completed);
        run.touch();

        if completed {
            tracing::info!("✅ All keyframes ready for run {}", run_id);
        }
    }

    /// Re-runs one scene's keyframe. Reference selection reads live state at call time.
    pub async fn regenerate_scene(
        &self,
        index: usize,
        override_prompt: Option<String>,
    ) -> Result<Scene, PipelineError> {
        validate_scene_index(index)?;
        let run_id = self.inner.state.read().await.run.id;
        let override_prompt = override_prompt.filter(|p| !p.trim().is_empty());
        self.generate_scene(run_id, index, override_prompt).await
    }

    /// Stores caller-supplied bytes as the scene's image.
    pub async fn replace_scene_image(
        &self,
        index: usize,
        data: Vec<u8>,
        file_name: &str,
    ) -> Result<Scene, PipelineError> {
        validate_scene_index(index)?;
        if data.is_empty() {
            return Err(PipelineError::Validation("No file provided".to_string()));
        }

        let run_id = {
            let mut state = self.inner.state.write().await;
            let run = &mut state.run;
            let storyboard = editable_storyboard(run)?;
            let scene = &mut storyboard.scenes[index];
            if scene.is_generating() {
                return Err(already_generating(index));
            }
            scene.status = SceneStatus::Generating;
            run.id
        };

        let this = self.clone();
        let file_name = file_name.to_string();
        self.detached(async move {
            let result = this.inner.collaborators.assets.put(data, &file_name, "jpg").await;
            this.record_scene_outcome(run_id, index, result.map(|url| (url, None))).await
        })
        .await
    }

    /// Local text edit. No provider call and no status change.
    pub async fn edit_scene_text(
        &self,
        index: usize,
        field: SceneField,
        value: String,
    ) -> Result<Scene, PipelineError> {
        validate_scene_index(index)?;
        let mut state = self.inner.state.write().await;
        let run = &mut state.run;
        let storyboard = editable_storyboard(run)?;
        let scene = &mut storyboard.scenes[index];
        match field {
            SceneField::Summary => scene.summary = value,
            SceneField::Description => scene.description = value,
            SceneField::CustomPrompt => {
                scene.custom_prompt = Some(value).filter(|v| !v.trim().is_empty());
            }
        }
        let scene = scene.clone();
        run.touch();
        Ok(scene)
    }

    /// Asks the text model again and swaps in fresh text for one scene, keeping its image.
    pub async fn rewrite_scene(&self, index: usize) -> Result<Scene, PipelineError> {
        validate_scene_index(index)?;
        let (run_id, prompt, style, reference) = {
            let mut state = self.inner.state.write().await;
            let run = &mut state.run;
            editable_storyboard(run)?;
            let style = run
                .style
                .ok_or_else(|| PipelineError::Precondition("Run has no style".to_string()))?;
            (run.id, run.prompt.clone(), style, run.reference_image_url.clone())
        };

        let fresh = self
            .inner
            .collaborators
            .storyboard
            .generate(&prompt, style, reference.as_deref())
            .await?;

        let mut state = self.inner.state.write().await;
        let run = &mut state.run;
        if run.id != run_id {
            return Err(replaced());
        }
        let storyboard = editable_storyboard(run)?;
        let scene = &mut storyboard.scenes[index];
        scene.replace_text(&fresh.scenes[index]);
        let scene = scene.clone();
        run.touch();
        tracing::info!("✍️ Scene {} rewritten", index + 1);
        Ok(scene)
    }

    /// Renders the video from the three ready keyframes under the configured deadline.
    pub async fn generate_video(&self) -> Result<RunSnapshot, PipelineError> {
        let (run_id, attempt, request) = {
            let mut guard = self.inner.state.write().await;
            let RunState { run, progress, video_attempt } = &mut *guard;

            if run.activity == Activity::RenderingVideo {
                return Err(PipelineError::Precondition("Video is already being generated".to_string()));
            }
            if run.stage != Stage::Storyboard {
                return Err(PipelineError::Precondition(
                    "A storyboard is required before creating the video".to_string(),
                ));
            }
            let storyboard = run.storyboard.as_ref().ok_or_else(|| {
                PipelineError::Precondition("A storyboard is required before creating the video".to_string())
            })?;
            let image_urls = storyboard.ready_images().ok_or_else(|| {
                PipelineError::Precondition(
                    "All 3 keyframes must be generated before creating the video".to_string(),
                )
            })?;
            let style = run
                .style
                .ok_or_else(|| PipelineError::Precondition("Run has no style".to_string()))?;

            let request = VideoRequest {
                image_urls,
                storyboard: VideoStoryboard::from(storyboard),
                product_description: run.prompt.clone(),
                style,
            };

            run.stage = Stage::Video;
            run.activity = Activity::RenderingVideo;
            run.video_url = None;
            run.touch();
            progress.start(ProgressCurve::Video);
            let attempt = Uuid::new_v4();
            *video_attempt = Some(attempt);
            (run.id, attempt, request)
        };

        tracing::info!("🎥 Run {} rendering video", run_id);

        let this = self.clone();
        self.detached(async move { this.render_video(run_id, attempt, request).await })
            .await?;

        Ok(self.snapshot().await)
    }

    /// Calls the video provider under the deadline and records the outcome on the run.
    async fn render_video(
        &self,
        run_id: Uuid,
        attempt: Uuid,
        request: VideoRequest,
    ) -> Result<(), PipelineError> {
        let deadline = self.inner.settings.video_deadline;
        let outcome = match tokio::time::timeout(deadline, self.inner.collaborators.video.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(format!(
                "Video generation did not finish within {}s",
                deadline.as_secs()
            ))),
        };

        {
            let mut guard = self.inner.state.write().await;
            let RunState { run, progress, video_attempt } = &mut *guard;
            if run.id != run_id || *video_attempt != Some(attempt) {
                tracing::debug!("Discarding video result for run {} after it moved on", run_id);
                return Err(PipelineError::Precondition(
                    "Video generation was cancelled".to_string(),
                ));
            }

            *video_attempt = None;
            run.activity = Activity::Idle;
            match outcome {
                Ok(output) => {
                    tracing::info!("🎬 Run {} complete", run_id);
                    run.video_url = Some(output.video_url);
                    run.last_error = None;
                    run.touch();
                    progress.finish(true);
                }
                Err(err) => {
                    tracing::error!("❌ Video generation failed for run {}: {}", run_id, err);
                    run.stage = Stage::Storyboard;
                    run.record_error(&err);
                    progress.finish(false);
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Steps back one stage: video to storyboard, storyboard to input.
    pub async fn go_back(&self) -> RunSnapshot {
        let mut background = self.inner.background.lock().await;
        {
            let mut guard = self.inner.state.write().await;
            let RunState { run, progress, video_attempt } = &mut *guard;
            *video_attempt = None;
            match run.stage {
                Stage::Video => {
                    run.stage = Stage::Storyboard;
                    run.activity = Activity::Idle;
                    run.video_url = None;
                    run.touch();
                    progress.reset();
                }
                Stage::Storyboard => {
                    if let Some(handle) = background.take() {
                        handle.abort();
                    }
                    *run = Run::idle();
                    progress.reset();
                }
                Stage::Input => {}
            }
        }
        drop(background);
        self.snapshot().await
    }

    /// Shared by the chain and manual regeneration: marks the scene generating,
    /// calls the provider without holding the lock, then records the outcome.
    async fn generate_scene(
        &self,
        run_id: Uuid,
        index: usize,
        override_prompt: Option<String>,
    ) -> Result<Scene, PipelineError> {
        let request = {
            let mut state = self.inner.state.write().await;
            let run = &mut state.run;
            if run.id != run_id {
                return Err(replaced());
            }
            let style = run
                .style
                .ok_or_else(|| PipelineError::Precondition("Run has no style".to_string()))?;
            let seed = run.consistency_seed.clone();
            let product_description = run.prompt.clone();
            let seed_image_url = run.seed_image_url.clone();

            let storyboard = editable_storyboard(run)?;
            let reference = chain::resolve_reference(storyboard, seed_image_url.as_deref(), index);
            let product_identity = storyboard.identity_for(index);

            let scene = &mut storyboard.scenes[index];
            if scene.is_generating() {
                return Err(already_generating(index));
            }
            if let Some(prompt) = override_prompt {
                scene.custom_prompt = Some(prompt);
            }
            scene.status = SceneStatus::Generating;

            KeyframeRequest {
                description: scene.prompt_source().to_string(),
                reference: reference.map(ReferenceImage::scene),
                product_description,
                product_identity,
                style,
                seed,
            }
        };

        tracing::info!(
            "🖼️ Generating scene {} ({})",
            index + 1,
            if request.reference.is_some() { "with reference" } else { "no reference" }
        );

        let this = self.clone();
        self.detached(async move {
            let result = this.inner.collaborators.keyframes.generate(request).await;
            let result = result.map(|output| (output.image_url, Some(output.resolved_prompt)));
            this.record_scene_outcome(run_id, index, result).await
        })
        .await
    }

    /// Settles a scene that was marked generating: `Ready` with the new image
    /// (and the prompt that produced it, if any) or `Failed` with the message.
    async fn record_scene_outcome(
        &self,
        run_id: Uuid,
        index: usize,
        result: Result<(String, Option<String>), PipelineError>,
    ) -> Result<Scene, PipelineError> {
        let mut state = self.inner.state.write().await;
        let run = &mut state.run;
        let scene = settled_scene(run, run_id, index)?;
        match result {
            Ok((image_url, full_prompt)) => {
                scene.status = SceneStatus::Ready { image_url: image_url.clone() };
                scene.full_prompt = full_prompt;
                let scene = scene.clone();
                if chain::anchors_run(index) {
                    run.seed_image_url = Some(image_url);
                }
                run.touch();
                tracing::info!("✅ Scene {} ready", index + 1);
                Ok(scene)
            }
            Err(err) => {
                tracing::error!("❌ Scene {} failed: {}", index + 1, err);
                scene.status = SceneStatus::Failed { message: err.detail().to_string() };
                run.touch();
                Err(err)
            }
        }
    }

    /// Runs `work` on its own task and waits for it. Dropping the caller (a client
    /// hanging up) leaves the task running, so the state it marked busy still settles.
    async fn detached<T, F>(&self, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(work).await.map_err(|e| {
            tracing::error!("Pipeline step task failed: {}", e);
            PipelineError::Generation(format!("Pipeline step did not complete: {}", e))
        })?
    }
}

/// Storyboard of a run whose scenes may be changed right now.
fn editable_storyboard(run: &mut Run) -> Result<&mut Storyboard, PipelineError> {
    if run.stage != Stage::Storyboard {
        return Err(PipelineError::Precondition(
            "Scenes can only be changed while the storyboard is open".to_string(),
        ));
    }
    if run.activity == Activity::WritingStoryboard {
        return Err(PipelineError::Precondition(
            "The storyboard is still being written".to_string(),
        ));
    }
    run.storyboard
        .as_mut()
        .ok_or_else(|| PipelineError::Precondition("No storyboard yet".to_string()))
}

/// Scene slot to record an outcome into, if the run it was started for is still current.
fn settled_scene(run: &mut Run, run_id: Uuid, index: usize) -> Result<&mut Scene, PipelineError> {
    if run.id != run_id {
        return Err(replaced());
    }
    run.storyboard
        .as_mut()
        .map(|storyboard| &mut storyboard.scenes[index])
        .ok_or_else(replaced)
}

fn replaced() -> PipelineError {
    PipelineError::Precondition("The run was replaced before this step finished".to_string())
}

fn already_generating(index: usize) -> PipelineError {
    PipelineError::Precondition(format!("Scene {} is already generating", index + 1))
}
