//! Scene entity and its generation state machine.
//!
//! The media a scene holds depends on where it is in its lifecycle, so the
//! state is a tagged enum rather than a record of optional fields: a scene
//! that is generating a clip always carries the image it animates.

use std::fmt;

use crate::media::{AspectRatio, ImageResource, VideoResource};

/// Session-unique scene identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(pub u64);

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Flat status view of a [`SceneState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStatus {
    Pending,
    GeneratingImage,
    ImageReady,
    GeneratingVideo,
    VideoReady,
    Error,
}

impl SceneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStatus::Pending => "pending",
            SceneStatus::GeneratingImage => "generating-image",
            SceneStatus::ImageReady => "image-ready",
            SceneStatus::GeneratingVideo => "generating-video",
            SceneStatus::VideoReady => "video-ready",
            SceneStatus::Error => "error",
        }
    }
}

impl fmt::Display for SceneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SceneState {
    Pending,
    GeneratingImage {
        /// Image to fall back to if a re-roll fails.
        previous: Option<ImageResource>,
    },
    ImageReady {
        image: ImageResource,
    },
    GeneratingVideo {
        image: ImageResource,
    },
    VideoReady {
        image: ImageResource,
        clip: VideoResource,
    },
    Error {
        message: String,
        image: Option<ImageResource>,
    },
}

/// Rejected scene transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("{0} is already generating")]
    Busy(SceneId),

    #[error("{0} has no illustration to animate")]
    MissingImage(SceneId),

    #[error("{id} cannot {action} while {status}")]
    InvalidTransition {
        id: SceneId,
        action: &'static str,
        status: SceneStatus,
    },
}

/// One page of the story.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    id: SceneId,
    pub story_text: String,
    pub visual_prompt: String,
    aspect_ratio: Option<AspectRatio>,
    pub selected: bool,
    state: SceneState,
}

impl Scene {
    /// Create a pending, selected scene.
    pub fn new(id: SceneId, story_text: impl Into<String>, visual_prompt: impl Into<String>) -> Self {
        Self {
            id,
            story_text: story_text.into(),
            visual_prompt: visual_prompt.into(),
            aspect_ratio: None,
            selected: true,
            state: SceneState::Pending,
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    /// Ratio the scene's visuals were generated with, once an image exists.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.aspect_ratio
    }

    pub fn status(&self) -> SceneStatus {
        match &self.state {
            SceneState::Pending => SceneStatus::Pending,
            SceneState::GeneratingImage { .. } => SceneStatus::GeneratingImage,
            SceneState::ImageReady { .. } => SceneStatus::ImageReady,
            SceneState::GeneratingVideo { .. } => SceneStatus::GeneratingVideo,
            SceneState::VideoReady { .. } => SceneStatus::VideoReady,
            SceneState::Error { .. } => SceneStatus::Error,
        }
    }

    pub fn image(&self) -> Option<&ImageResource> {
        match &self.state {
            SceneState::ImageReady { image }
            | SceneState::GeneratingVideo { image }
            | SceneState::VideoReady { image, .. } => Some(image),
            SceneState::GeneratingImage { previous } => previous.as_ref(),
            SceneState::Error { image, .. } => image.as_ref(),
            SceneState::Pending => None,
        }
    }

    pub fn clip(&self) -> Option<&VideoResource> {
        match &self.state {
            SceneState::VideoReady { clip, .. } => Some(clip),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            SceneState::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self.state,
            SceneState::GeneratingImage { .. } | SceneState::GeneratingVideo { .. }
        )
    }

    /// Selected scenes with a clip take part in the export.
    pub fn is_exportable(&self) -> bool {
        self.selected && self.clip().is_some()
    }

    /// Ratio to request for this scene: the pinned one wins over the selector.
    pub fn effective_ratio(&self, selector: AspectRatio) -> AspectRatio {
        self.aspect_ratio.unwrap_or(selector)
    }

    /// Enter `generating-image`. Any existing clip is discarded since it
    /// animates the image being replaced.
    pub fn begin_image(&mut self) -> Result<(), SceneError> {
        if self.is_busy() {
            return Err(SceneError::Busy(self.id));
        }
        let previous = self.take_image();
        self.state = SceneState::GeneratingImage { previous };
        Ok(())
    }

    /// Store a new illustration and pin the ratio if it is not pinned yet.
    pub fn complete_image(
        &mut self,
        image: ImageResource,
        ratio: AspectRatio,
    ) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingImage, "complete an image")?;
        if self.aspect_ratio.is_none() {
            self.aspect_ratio = Some(ratio);
        }
        self.state = SceneState::ImageReady { image };
        Ok(())
    }

    pub fn fail_image(&mut self, message: impl Into<String>) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingImage, "fail an image")?;
        let image = self.take_image();
        self.state = SceneState::Error {
            message: message.into(),
            image,
        };
        Ok(())
    }

    /// Return to the last stable state without recording an error.
    pub fn revert_image(&mut self) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingImage, "revert an image")?;
        self.state = match self.take_image() {
            Some(image) => SceneState::ImageReady { image },
            None => SceneState::Pending,
        };
        Ok(())
    }

    pub fn begin_video(&mut self) -> Result<(), SceneError> {
        if self.is_busy() {
            return Err(SceneError::Busy(self.id));
        }
        if self.image().is_none() {
            return Err(SceneError::MissingImage(self.id));
        }
        let image = self.take_image().ok_or(SceneError::MissingImage(self.id))?;
        self.state = SceneState::GeneratingVideo { image };
        Ok(())
    }

    pub fn complete_video(&mut self, clip: VideoResource) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingVideo, "complete a clip")?;
        let image = self.take_image().ok_or(SceneError::MissingImage(self.id))?;
        self.state = SceneState::VideoReady { image, clip };
        Ok(())
    }

    /// Record a clip failure, keeping the illustration.
    pub fn fail_video(&mut self, message: impl Into<String>) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingVideo, "fail a clip")?;
        let image = self.take_image();
        self.state = SceneState::Error {
            message: message.into(),
            image,
        };
        Ok(())
    }

    pub fn revert_video(&mut self) -> Result<(), SceneError> {
        self.require_status(SceneStatus::GeneratingVideo, "revert a clip")?;
        let image = self.take_image().ok_or(SceneError::MissingImage(self.id))?;
        self.state = SceneState::ImageReady { image };
        Ok(())
    }

    fn require_status(&self, status: SceneStatus, action: &'static str) -> Result<(), SceneError> {
        if self.status() == status {
            Ok(())
        } else {
            Err(SceneError::InvalidTransition {
                id: self.id,
                action,
                status: self.status(),
            })
        }
    }

    fn take_image(&mut self) -> Option<ImageResource> {
        match std::mem::replace(&mut self.state, SceneState::Pending) {
            SceneState::ImageReady { image }
            | SceneState::GeneratingVideo { image }
            | SceneState::VideoReady { image, .. } => Some(image),
            SceneState::GeneratingImage { previous } => previous,
            SceneState::Error { image, .. } => image,
            SceneState::Pending => None,
        }
    }
}
