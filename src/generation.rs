//! The generation contract used by the orchestrator.
//!
//! [`StoryBackend`] is the seam between the workflow and whatever produces
//! outlines, illustrations and clips. The Gemini client is the production
//! implementation; tests substitute in-memory fakes.

use std::fmt;

use async_trait::async_trait;

use crate::media::{ArtStyle, AspectRatio, ImageResource, Outline, VideoResource};

/// Which generation call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Outline,
    Image,
    Video,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Outline => "outline",
            Stage::Image => "image",
            Stage::Video => "video",
        })
    }
}

/// Failure surfaced by a [`StoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{message}")]
    Failed { stage: Stage, message: String },

    /// The backend rejected the active credential. Callers prompt for a new
    /// one instead of treating this as a per-scene failure.
    #[error("credential rejected: {message}")]
    CredentialRejected { stage: Stage, message: String },
}

impl GenerationError {
    pub fn failed(stage: Stage, message: impl Into<String>) -> Self {
        GenerationError::Failed {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            GenerationError::Failed { stage, .. }
            | GenerationError::CredentialRejected { stage, .. } => *stage,
        }
    }

    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, GenerationError::CredentialRejected { .. })
    }
}

/// Produces story outlines, illustrations and animated clips.
#[async_trait]
pub trait StoryBackend: Send + Sync {
    /// Four-scene outline for `topic`.
    async fn generate_outline(&self, topic: &str) -> Result<Outline, GenerationError>;

    /// One illustration for a scene prompt, rendered in `style`.
    async fn generate_illustration(
        &self,
        prompt: &str,
        style: ArtStyle,
        ratio: AspectRatio,
    ) -> Result<ImageResource, GenerationError>;

    /// Animate `image` into a short clip.
    async fn generate_clip(
        &self,
        image: &ImageResource,
        prompt: &str,
        ratio: AspectRatio,
    ) -> Result<VideoResource, GenerationError>;
}
