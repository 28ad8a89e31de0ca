//! Story workflow: outline, per-scene generation, export.
//!
//! The [`Orchestrator`] is the only writer of the scene collection. It drives
//! a [`StoryBackend`] for generation and a [`MediaBackend`] for stitching, and
//! tracks whether the credential is currently trusted through [`AuthState`].

use std::path::{Path, PathBuf};

use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::export::{write_movie, write_scene_clip, write_scene_image};
use crate::gemini::{AuthState, CredentialError, CredentialProvider};
use crate::generation::{GenerationError, StoryBackend};
use crate::media::{ArtStyle, AspectRatio, ImageResource, VideoResource};
use crate::scene::{Scene, SceneError, SceneId};
use crate::stitch::{stitch_with_canvas, CanvasSize, MediaBackend, StitchError, StitchSettings};

/// Banner shown when the backend rejects the credential.
pub const REAUTH_MESSAGE: &str = "API key invalid or expired. Please select a project again.";

/// Banner shown when an outline request fails without a message.
const OUTLINE_FAILED_MESSAGE: &str = "Failed to generate story. Please try again.";

/// Where the user is in the workflow. Only moves forward until `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AppStep {
    Input,
    Review,
    Production,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Please enter a story topic")]
    EmptyTopic,

    #[error("Unknown scene: {0}")]
    UnknownScene(SceneId),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("{}", REAUTH_MESSAGE)]
    Deauthorized,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("No videos selected for export")]
    NothingToExport,

    #[error("Failed to combine videos: {0}")]
    Stitch(#[from] StitchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-scene results of a batch generation.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub completed: Vec<SceneId>,
    pub failed: Vec<(SceneId, String)>,
    /// Set if any call in the batch had its credential rejected.
    pub deauthorized: bool,
}

impl BatchOutcome {
    pub fn started(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    fn record(&mut self, id: SceneId, result: Result<(), AppError>) {
        match result {
            Ok(()) => self.completed.push(id),
            Err(AppError::Deauthorized) => {
                self.deauthorized = true;
                self.failed.push((id, REAUTH_MESSAGE.to_string()));
            }
            Err(e) => self.failed.push((id, e.to_string())),
        }
    }
}

/// Export progress as a whole percentage: clip `index` of `total` is starting.
pub fn progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = ((index + 1) as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}

pub struct Orchestrator<B, C, M> {
    backend: B,
    credentials: C,
    media: M,
    auth: AuthState,
    settings: StitchSettings,
    step: AppStep,
    topic: String,
    title: String,
    scenes: Vec<Scene>,
    style: ArtStyle,
    aspect_ratio: AspectRatio,
    error: Option<String>,
    next_id: u64,
}

impl<B, C, M> Orchestrator<B, C, M>
where
    B: StoryBackend,
    C: CredentialProvider,
    M: MediaBackend,
{
    pub fn new(backend: B, credentials: C, media: M) -> Self {
        let auth = AuthState::from_provider(&credentials);
        Self {
            backend,
            credentials,
            media,
            auth,
            settings: StitchSettings::default(),
            step: AppStep::Input,
            topic: String::new(),
            title: String::new(),
            scenes: Vec::new(),
            style: ArtStyle::default(),
            aspect_ratio: AspectRatio::default(),
            error: None,
            next_id: 1,
        }
    }

    pub fn with_stitch_settings(mut self, settings: StitchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn step(&self) -> AppStep {
        self.step
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id() == id)
    }

    pub fn style(&self) -> ArtStyle {
        self.style
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// The global error banner, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    /// Selected scenes that have a clip.
    pub fn selected_count(&self) -> usize {
        self.scenes.iter().filter(|s| s.is_exportable()).count()
    }

    fn scene_mut(&mut self, id: SceneId) -> Result<&mut Scene, AppError> {
        find_scene(&mut self.scenes, id)
    }

    /// Request an outline and replace the scene collection with it.
    pub async fn generate_story(&mut self, topic: &str) -> Result<(), AppError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AppError::EmptyTopic);
        }
        self.error = None;

        match self.backend.generate_outline(topic).await {
            Ok(outline) => {
                self.topic = topic.to_string();
                self.title = outline.title;
                self.scenes = outline
                    .scenes
                    .into_iter()
                    .map(|s| {
                        let id = SceneId(self.next_id);
                        self.next_id += 1;
                        Scene::new(id, s.story_text, s.visual_prompt)
                    })
                    .collect();
                self.step = AppStep::Review;
                log::info!("Story \"{}\" ready with {} scenes", self.title, self.scenes.len());
                Ok(())
            }
            Err(e) => {
                if e.is_credential_rejected() {
                    deauthorize(&self.auth, &mut self.error);
                } else {
                    let message = e.to_string();
                    self.error = Some(if message.is_empty() {
                        OUTLINE_FAILED_MESSAGE.to_string()
                    } else {
                        message
                    });
                }
                Err(AppError::Generation(e))
            }
        }
    }

    pub fn update_scene(
        &mut self,
        id: SceneId,
        story_text: impl Into<String>,
        visual_prompt: impl Into<String>,
    ) -> Result<(), AppError> {
        let scene = self.scene_mut(id)?;
        scene.story_text = story_text.into();
        scene.visual_prompt = visual_prompt.into();
        Ok(())
    }

    /// Flip export selection. Returns the new value.
    pub fn toggle_selected(&mut self, id: SceneId) -> Result<bool, AppError> {
        let scene = self.scene_mut(id)?;
        scene.selected = !scene.selected;
        Ok(scene.selected)
    }

    pub fn set_style(&mut self, style: ArtStyle) {
        self.style = style;
    }

    /// Change the global selector. Ratios already pinned on scenes stay.
    pub fn set_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Discard the story and go back to topic input.
    pub fn reset(&mut self) {
        self.step = AppStep::Input;
        self.topic.clear();
        self.title.clear();
        self.scenes.clear();
        self.error = None;
    }

    /// Generate (or re-roll) one scene's illustration.
    pub async fn generate_image(&mut self, id: SceneId) -> Result<(), AppError> {
        let selector = self.aspect_ratio;
        let scene = self.scene_mut(id)?;
        scene.begin_image()?;
        let prompt = scene.visual_prompt.clone();
        let ratio = scene.effective_ratio(selector);

        let result = self
            .backend
            .generate_illustration(&prompt, self.style, ratio)
            .await;
        apply_image(&mut self.scenes, &self.auth, &mut self.error, id, ratio, result)
    }

    /// Start every scene without an image and wait for all of them.
    pub async fn generate_all_images(&mut self) -> BatchOutcome {
        self.step = self.step.max(AppStep::Production);
        let selector = self.aspect_ratio;
        let style = self.style;

        let mut jobs = Vec::new();
        for scene in &mut self.scenes {
            if scene.image().is_some() || scene.is_busy() {
                continue;
            }
            if scene.begin_image().is_ok() {
                jobs.push((
                    scene.id(),
                    scene.visual_prompt.clone(),
                    scene.effective_ratio(selector),
                ));
            }
        }
        log::info!("Generating {} illustrations", jobs.len());

        let backend = &self.backend;
        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|(id, prompt, ratio)| async move {
                let result = backend.generate_illustration(&prompt, style, ratio).await;
                (id, ratio, result)
            })
            .collect();

        let mut outcome = BatchOutcome::default();
        while let Some((id, ratio, result)) = pending.next().await {
            let applied = apply_image(&mut self.scenes, &self.auth, &mut self.error, id, ratio, result);
            outcome.record(id, applied);
        }
        outcome
    }

    /// Animate one scene's illustration.
    pub async fn generate_video(&mut self, id: SceneId) -> Result<(), AppError> {
        if !self.auth.is_authorized() {
            self.error = Some(REAUTH_MESSAGE.to_string());
            return Err(AppError::Deauthorized);
        }

        let selector = self.aspect_ratio;
        let (image, prompt, ratio) = start_video(self.scene_mut(id)?, selector)?;
        let result = self.backend.generate_clip(&image, &prompt, ratio).await;
        apply_video(&mut self.scenes, &self.auth, &mut self.error, id, result)
    }

    /// Animate every scene that has an image but no clip.
    pub async fn generate_all_videos(&mut self) -> Result<BatchOutcome, AppError> {
        if !self.auth.is_authorized() {
            self.error = Some(REAUTH_MESSAGE.to_string());
            return Err(AppError::Deauthorized);
        }
        self.step = self.step.max(AppStep::Production);
        let selector = self.aspect_ratio;

        let mut jobs = Vec::new();
        for scene in &mut self.scenes {
            if scene.image().is_none() || scene.clip().is_some() || scene.is_busy() {
                continue;
            }
            let id = scene.id();
            if let Ok((image, prompt, ratio)) = start_video(scene, selector) {
                jobs.push((id, image, prompt, ratio));
            }
        }
        log::info!("Generating {} clips", jobs.len());

        let backend = &self.backend;
        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|(id, image, prompt, ratio)| async move {
                (id, backend.generate_clip(&image, &prompt, ratio).await)
            })
            .collect();

        let mut outcome = BatchOutcome::default();
        while let Some((id, result)) = pending.next().await {
            let applied = apply_video(&mut self.scenes, &self.auth, &mut self.error, id, result);
            outcome.record(id, applied);
        }
        Ok(outcome)
    }

    /// Run the credential selection flow and trust the result.
    pub fn select_credential(&mut self) -> Result<(), AppError> {
        self.credentials.select_credential()?;
        self.auth.grant();
        if self.error.as_deref() == Some(REAUTH_MESSAGE) {
            self.error = None;
        }
        Ok(())
    }

    /// Stitch the selected clips and write the movie into `out_dir`.
    ///
    /// `on_progress` receives a percentage before each clip starts.
    pub async fn export_movie<F>(&mut self, out_dir: &Path, mut on_progress: F) -> Result<PathBuf, AppError>
    where
        F: FnMut(u8),
    {
        let exportable: Vec<&Scene> = self.scenes.iter().filter(|s| s.is_exportable()).collect();
        let Some(first) = exportable.first() else {
            return Err(AppError::NothingToExport);
        };
        let ratio = first.aspect_ratio().unwrap_or(self.aspect_ratio);
        let clips: Vec<VideoResource> = exportable
            .iter()
            .filter_map(|s| s.clip().cloned())
            .collect();

        log::info!("Exporting {} clips at {}", clips.len(), ratio);
        let result = stitch_with_canvas(
            &self.media,
            &clips,
            CanvasSize::for_ratio(ratio),
            &self.settings,
            |index, total| on_progress(progress_percent(index, total)),
        )
        .await;

        let movie = match result {
            Ok(movie) => movie,
            Err(e) => {
                let err = AppError::Stitch(e);
                self.error = Some(err.to_string());
                return Err(err);
            }
        };
        if movie.is_empty() {
            log::warn!("Stitched movie is empty");
        }

        match write_movie(out_dir, &self.title, &movie) {
            Ok(path) => Ok(path),
            Err(e) => {
                self.error = Some(format!("Failed to combine videos: {}", e));
                Err(AppError::Io(e))
            }
        }
    }

    /// Write every scene's image and clip into `out_dir`.
    pub fn download_scene_assets(&self, out_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        let mut written = Vec::new();
        for (index, scene) in self.scenes.iter().enumerate() {
            let position = index + 1;
            if let Some(image) = scene.image() {
                written.push(write_scene_image(out_dir, position, image)?);
            }
            if let Some(clip) = scene.clip() {
                written.push(write_scene_clip(out_dir, position, clip)?);
            }
        }
        Ok(written)
    }
}

fn find_scene(scenes: &mut [Scene], id: SceneId) -> Result<&mut Scene, AppError> {
    scenes
        .iter_mut()
        .find(|s| s.id() == id)
        .ok_or(AppError::UnknownScene(id))
}

fn deauthorize(auth: &AuthState, banner: &mut Option<String>) {
    auth.revoke();
    *banner = Some(REAUTH_MESSAGE.to_string());
}

fn start_video(
    scene: &mut Scene,
    selector: AspectRatio,
) -> Result<(ImageResource, String, AspectRatio), AppError> {
    scene.begin_video()?;
    let image = scene
        .image()
        .cloned()
        .ok_or(SceneError::MissingImage(scene.id()))?;
    Ok((image, scene.visual_prompt.clone(), scene.effective_ratio(selector)))
}

fn apply_image(
    scenes: &mut [Scene],
    auth: &AuthState,
    banner: &mut Option<String>,
    id: SceneId,
    ratio: AspectRatio,
    result: Result<ImageResource, GenerationError>,
) -> Result<(), AppError> {
    let scene = find_scene(scenes, id)?;
    match result {
        Ok(image) => {
            scene.complete_image(image, ratio)?;
            Ok(())
        }
        Err(e) if e.is_credential_rejected() => {
            scene.revert_image()?;
            deauthorize(auth, banner);
            Err(AppError::Deauthorized)
        }
        Err(e) => {
            log::warn!("Illustration for {} failed: {}", id, e);
            scene.fail_image(format!("Image failed: {}", e))?;
            Err(AppError::Generation(e))
        }
    }
}

fn apply_video(
    scenes: &mut [Scene],
    auth: &AuthState,
    banner: &mut Option<String>,
    id: SceneId,
    result: Result<VideoResource, GenerationError>,
) -> Result<(), AppError> {
    let scene = find_scene(scenes, id)?;
    match result {
        Ok(clip) => {
            scene.complete_video(clip)?;
            Ok(())
        }
        Err(e) if e.is_credential_rejected() => {
            scene.revert_video()?;
            deauthorize(auth, banner);
            Err(AppError::Deauthorized)
        }
        Err(e) => {
            log::warn!("Clip for {} failed: {}", id, e);
            scene.fail_video(format!("Video failed: {}", e))?;
            Err(AppError::Generation(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_rounds() {
        assert_eq!(progress_percent(0, 4), 25);
        assert_eq!(progress_percent(3, 4), 100);
        assert_eq!(progress_percent(0, 3), 33);
        assert_eq!(progress_percent(1, 3), 67);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn test_batch_outcome_records_deauthorization() {
        let mut outcome = BatchOutcome::default();
        outcome.record(SceneId(1), Ok(()));
        outcome.record(SceneId(2), Err(AppError::Deauthorized));
        outcome.record(SceneId(3), Err(AppError::UnknownScene(SceneId(3))));
        assert_eq!(outcome.started(), 3);
        assert!(outcome.deauthorized);
        assert_eq!(outcome.failed[0].1, REAUTH_MESSAGE);
    }

    #[test]
    fn test_app_error_messages() {
        assert_eq!(AppError::Deauthorized.to_string(), REAUTH_MESSAGE);
        assert_eq!(
            AppError::Stitch(StitchError::EmptyInput).to_string(),
            "Failed to combine videos: No videos to stitch"
        );
    }
}
