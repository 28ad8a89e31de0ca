//! Gemini API integration.
//!
//! Outlines come from the text model, illustrations from the image model and
//! clips from the Veo long-running video endpoint. Every call resolves the
//! credential at request time so a re-selection takes effect immediately.

mod client;
mod credential;
mod prompt;
mod retry;

pub use client::{
    is_credential_error, normalize_outline, validate_prompt, GeminiClient, GeminiError, ModelSet,
    DEFAULT_IMAGE_MODEL, DEFAULT_MAX_POLL_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_TEXT_MODEL,
    DEFAULT_VIDEO_MODEL, GEMINI_API_BASE_URL,
};
pub use credential::{
    AuthState, CredentialError, CredentialProvider, EnvCredentials, StaticCredential,
    FALLBACK_API_KEY_ENV, GEMINI_API_KEY_ENV,
};
pub use prompt::{
    animation_prompt, illustration_prompt, outline_prompt, video_ratio, SCENE_COUNT,
    SUPPORTED_VIDEO_RATIOS,
};
pub use retry::RetryPolicy;
