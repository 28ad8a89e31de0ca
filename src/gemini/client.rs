//! GeminiClient - handles communication with the Gemini and Veo REST APIs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use super::credential::{CredentialProvider, EnvCredentials, StaticCredential};
use super::prompt::{
    animation_prompt, video_ratio, ApiErrorEnvelope, GenerateContentRequest,
    GenerateContentResponse, InstanceImage, Operation, PredictRequest, VideoInstance,
    VideoParameters, SCENE_COUNT,
};
use super::retry::{calculate_backoff, is_transient_network_error, parse_retry_after, RetryPolicy};
use crate::config::GeminiConfig;
use crate::generation::{GenerationError, Stage, StoryBackend};
use crate::media::{ArtStyle, AspectRatio, ImageResource, Outline, VideoResource};

/// Default base URL for the Gemini API.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// API version prefix for every endpoint.
const API_VERSION: &str = "v1beta";

pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

/// Default timeout for HTTP requests. Image generation routinely takes tens of seconds.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed interval between operation status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on how long a clip generation may stay unfinished.
pub const DEFAULT_MAX_POLL_WAIT: Duration = Duration::from_secs(600);

/// HTTP status code for rate limiting.
const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// HTTP status code for unauthorized.
const HTTP_STATUS_UNAUTHORIZED: u16 = 401;

/// Substrings of backend errors that mean the credential was rejected.
const CREDENTIAL_KEYWORDS: &[&str] = &[
    "requested entity was not found",
    "api key not valid",
    "api_key_invalid",
    "permission_denied",
];

/// Check if a backend error message indicates a rejected credential.
pub fn is_credential_error(error_text: &str) -> bool {
    let lower = error_text.to_lowercase();
    CREDENTIAL_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Validate a prompt or topic before sending it to the API.
pub fn validate_prompt(prompt: &str) -> Result<(), GeminiError> {
    if prompt.trim().is_empty() {
        return Err(GeminiError::EmptyPrompt);
    }
    Ok(())
}

/// Enforce the outline contract: exactly [`SCENE_COUNT`] non-empty scenes.
///
/// Extra scenes are dropped; missing or blank ones are an error.
pub fn normalize_outline(mut outline: Outline) -> Result<Outline, GeminiError> {
    if outline.scenes.len() > SCENE_COUNT {
        log::warn!(
            "Outline returned {} scenes, keeping the first {}",
            outline.scenes.len(),
            SCENE_COUNT
        );
        outline.scenes.truncate(SCENE_COUNT);
    }
    if outline.scenes.len() < SCENE_COUNT {
        return Err(GeminiError::InvalidResponse(format!(
            "Expected {} scenes, got {}",
            SCENE_COUNT,
            outline.scenes.len()
        )));
    }
    for (i, scene) in outline.scenes.iter_mut().enumerate() {
        scene.story_text = scene.story_text.trim().to_string();
        scene.visual_prompt = scene.visual_prompt.trim().to_string();
        if scene.story_text.is_empty() || scene.visual_prompt.is_empty() {
            return Err(GeminiError::InvalidResponse(format!(
                "Scene {} is missing its text or visual prompt",
                i + 1
            )));
        }
    }
    outline.title = outline.title.trim().to_string();
    Ok(outline)
}

/// Strip a Markdown code fence the model sometimes wraps JSON in.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// Append the credential to a download link as a query parameter.
fn with_key_param(uri: &str, api_key: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{}{}key={}", uri, separator, api_key)
}

/// Model names used for each generation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub text: String,
    pub image: String,
    pub video: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT_MODEL.to_string(),
            image: DEFAULT_IMAGE_MODEL.to_string(),
            video: DEFAULT_VIDEO_MODEL.to_string(),
        }
    }
}

/// Client for the Gemini API.
pub struct GeminiClient {
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    models: ModelSet,
    http_client: reqwest::Client,
    poll_interval: Duration,
    max_poll_wait: Duration,
    retry: RetryPolicy,
    download_dir: PathBuf,
    /// Per-client clip directory, removed when the client is dropped.
    /// `None` once a caller picks its own directory.
    session_dir: Option<tempfile::TempDir>,
}

impl GeminiClient {
    /// Create a client that reads the key from the environment on every request.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::MissingApiKey` if neither `GEMINI_API_KEY` nor
    /// `API_KEY` is set.
    pub fn new() -> Result<Self, GeminiError> {
        let credentials = EnvCredentials::new();
        if !credentials.has_credential() {
            return Err(GeminiError::MissingApiKey);
        }
        Self::with_credentials(Arc::new(credentials))
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, GeminiError> {
        if api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }
        Self::with_credentials(Arc::new(StaticCredential::new(api_key)))
    }

    /// Create a client with a custom base URL. Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GeminiError> {
        let mut client = Self::with_api_key(api_key)?;
        client.base_url = base_url.trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Create a client backed by any credential provider.
    pub fn with_credentials(credentials: Arc<dyn CredentialProvider>) -> Result<Self, GeminiError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        let session_dir = tempfile::Builder::new().prefix("dreamtales-clips-").tempdir()?;

        Ok(Self {
            credentials,
            base_url: GEMINI_API_BASE_URL.to_string(),
            models: ModelSet::default(),
            http_client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_wait: DEFAULT_MAX_POLL_WAIT,
            retry: RetryPolicy::default(),
            download_dir: session_dir.path().to_path_buf(),
            session_dir: Some(session_dir),
        })
    }

    /// Create a client from the `[gemini]` config section.
    pub fn from_config(
        config: &GeminiConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, GeminiError> {
        let mut client = Self::with_credentials(credentials)?;
        if let Some(base_url) = &config.base_url {
            client.base_url = base_url.trim_end_matches('/').to_string();
        }
        client.models = ModelSet {
            text: config.text_model.clone(),
            image: config.image_model.clone(),
            video: config.video_model.clone(),
        };
        client.poll_interval = Duration::from_secs(config.poll_interval_secs);
        client.max_poll_wait = Duration::from_secs(config.max_poll_wait_secs);
        Ok(client)
    }

    pub fn models(mut self, models: ModelSet) -> Self {
        self.models = models;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_poll_wait(mut self, max_wait: Duration) -> Self {
        self.max_poll_wait = max_wait;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Directory downloaded clips are written to.
    ///
    /// By default every client gets its own temporary directory that lives
    /// as long as the client. A directory set here is never cleaned up.
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self.session_dir = None;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model_set(&self) -> &ModelSet {
        &self.models
    }

    pub fn clip_dir(&self) -> &Path {
        &self.download_dir
    }

    fn api_key(&self) -> Result<String, GeminiError> {
        self.credentials.api_key().ok_or(GeminiError::MissingApiKey)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/{}/models/{}:{}", self.base_url, API_VERSION, model, method)
    }

    /// Request a four-scene outline for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::EmptyPrompt` for a blank topic and
    /// `GeminiError::InvalidResponse` when no parseable outline comes back.
    pub async fn outline(&self, topic: &str) -> Result<Outline, GeminiError> {
        validate_prompt(topic)?;
        log::info!("Requesting story outline for topic: {}", topic.trim());

        let url = self.model_url(&self.models.text, "generateContent");
        let response: GenerateContentResponse = self
            .post_json_with_retry(&url, &GenerateContentRequest::outline(topic))
            .await?;

        let text = response
            .text()
            .ok_or_else(|| GeminiError::InvalidResponse("No response from Gemini".to_string()))?;
        let outline: Outline = serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            GeminiError::InvalidResponse(format!("Outline is not valid JSON: {}", e))
        })?;

        let outline = normalize_outline(outline)?;
        log::info!("Outline ready: \"{}\"", outline.title);
        Ok(outline)
    }

    /// Render one illustration.
    pub async fn illustrate(
        &self,
        visual_prompt: &str,
        style: ArtStyle,
        ratio: AspectRatio,
    ) -> Result<ImageResource, GeminiError> {
        validate_prompt(visual_prompt)?;

        let url = self.model_url(&self.models.image, "generateContent");
        let request = GenerateContentRequest::illustration(visual_prompt, style, ratio);
        let response: GenerateContentResponse = self.post_json_with_retry(&url, &request).await?;

        let inline = response
            .inline_data()
            .ok_or_else(|| GeminiError::InvalidResponse("No image generated".to_string()))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(inline.data.trim())
            .map_err(|e| GeminiError::InvalidResponse(format!("Image payload is not base64: {}", e)))?;

        log::debug!("Illustration ready ({} bytes, {})", data.len(), inline.mime_type);
        Ok(ImageResource::new(inline.mime_type.clone(), data))
    }

    /// Animate an illustration and download the finished clip.
    ///
    /// This combines all steps:
    /// 1. Submits the long-running generation with the (possibly degraded) ratio
    /// 2. Polls the operation on a fixed interval until it is done
    /// 3. Streams the clip to the download directory
    pub async fn animate(
        &self,
        image: &ImageResource,
        visual_prompt: &str,
        ratio: AspectRatio,
    ) -> Result<VideoResource, GeminiError> {
        validate_prompt(visual_prompt)?;

        let submitted_ratio = video_ratio(ratio);
        if submitted_ratio != ratio {
            log::warn!(
                "Video model does not support {}; submitting as {}",
                ratio,
                submitted_ratio
            );
        }

        let request = PredictRequest {
            instances: vec![VideoInstance {
                prompt: animation_prompt(visual_prompt),
                image: InstanceImage {
                    bytes_base64_encoded: base64::engine::general_purpose::STANDARD
                        .encode(&image.data),
                    mime_type: image.mime_type.clone(),
                },
            }],
            parameters: VideoParameters {
                aspect_ratio: submitted_ratio,
                resolution: "720p",
                sample_count: 1,
            },
        };

        let url = self.model_url(&self.models.video, "predictLongRunning");
        let operation: Operation = self.post_json_with_retry(&url, &request).await?;
        log::info!("Clip generation submitted, operation: {}", operation.name);

        let stem = operation
            .name
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("clip")
            .to_string();
        let video_uri = self.wait_for_operation(operation).await?;

        let dest = self.download_dir.join(format!("{}.mp4", stem));
        let path = self.download_video(&video_uri, &dest).await?;
        log::info!("Clip downloaded to: {:?}", path);
        Ok(VideoResource::new(path))
    }

    /// Check a long-running operation. Safe to repeat.
    pub async fn poll_operation(&self, name: &str) -> Result<Operation, GeminiError> {
        let url = format!("{}/{}/{}", self.base_url, API_VERSION, name);
        let response = self
            .http_client
            .get(&url)
            .header("x-goog-api-key", self.api_key()?)
            .send()
            .await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    /// Poll until the operation is done and return its download link.
    async fn wait_for_operation(&self, mut operation: Operation) -> Result<String, GeminiError> {
        use tokio::time::Instant;

        let start_time = Instant::now();
        loop {
            if operation.done {
                if let Some(error) = operation.error.take() {
                    log::error!("Clip generation failed: ({}) {}", error.code, error.message);
                    if is_credential_error(&error.message) {
                        return Err(GeminiError::CredentialRejected {
                            message: error.message,
                        });
                    }
                    return Err(GeminiError::ApiError(format!(
                        "Generation failed: {}",
                        error.message
                    )));
                }
                return operation.video_uri().map(str::to_string).ok_or_else(|| {
                    GeminiError::InvalidResponse(
                        "Video generation failed to return a link".to_string(),
                    )
                });
            }

            if start_time.elapsed() >= self.max_poll_wait {
                log::error!("Clip generation timed out after {:?}", self.max_poll_wait);
                return Err(GeminiError::Timeout {
                    waited_secs: self.max_poll_wait.as_secs(),
                });
            }

            log::debug!("Operation {} not done, waiting {:?}", operation.name, self.poll_interval);
            tokio::time::sleep(self.poll_interval).await;

            match self.poll_operation(&operation.name).await {
                Ok(next) => operation = next,
                Err(GeminiError::HttpError(ref e)) if is_transient_network_error(e) => {
                    log::warn!("Status check failed ({}), retrying on next tick", e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stream a clip to disk. The credential is appended to the link.
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::ApiError` if the server answers with an error
    /// status and `GeminiError::IoError` if writing fails.
    pub async fn download_video(&self, uri: &str, dest: &Path) -> Result<PathBuf, GeminiError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .http_client
            .get(with_key_param(uri, &self.api_key()?))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GeminiError::ApiError(format!(
                "Failed to download video (status {}): {}",
                status, error_text
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(dest.to_path_buf())
    }

    /// Single POST attempt.
    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, GeminiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", self.api_key()?)
            .json(body)
            .send()
            .await?;
        let response = check_response(response).await?;
        Ok(response.json().await?)
    }

    /// POST with retries on both transient network errors and rate limiting.
    async fn post_json_with_retry<B, R>(&self, url: &str, body: &B) -> Result<R, GeminiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let policy = self.retry;
        let mut network_attempt = 0u32;
        let mut rate_limit_attempt = 0u32;

        loop {
            match self.post_json(url, body).await {
                Ok(response) => return Ok(response),

                Err(GeminiError::HttpError(ref http_err)) if is_transient_network_error(http_err) => {
                    network_attempt += 1;
                    if network_attempt > policy.network_retries {
                        log::error!(
                            "Network error after {} attempts. Giving up. Error: {}",
                            network_attempt,
                            http_err
                        );
                        return Err(GeminiError::NetworkError {
                            message: http_err.to_string(),
                            attempts: network_attempt,
                        });
                    }

                    let delay =
                        calculate_backoff(network_attempt - 1, policy.backoff_base, policy.backoff_max);
                    log::warn!(
                        "Network error (attempt {}/{}): {}. Retrying in {:?}...",
                        network_attempt,
                        policy.network_retries + 1,
                        http_err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }

                Err(GeminiError::RateLimit {
                    message,
                    retry_after_secs,
                }) => {
                    rate_limit_attempt += 1;
                    if rate_limit_attempt > policy.rate_limit_retries {
                        log::error!(
                            "Rate limit exceeded after {} attempts. Giving up.",
                            rate_limit_attempt
                        );
                        return Err(GeminiError::RateLimit {
                            message,
                            retry_after_secs,
                        });
                    }

                    let delay = policy.rate_limit_delay(rate_limit_attempt - 1, retry_after_secs);
                    log::info!(
                        "Rate limited (attempt {}/{}). Retrying in {:?}...",
                        rate_limit_attempt,
                        policy.rate_limit_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }

                Err(e) => return Err(e),
            }
        }
    }
}

/// Turn an error status into the matching `GeminiError`.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
        let retry_after_secs = parse_retry_after(&response);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Rate limit exceeded".to_string());
        log::warn!(
            "Rate limited by Gemini API. Retry-After: {:?} seconds",
            retry_after_secs
        );
        return Err(GeminiError::RateLimit {
            message: error_message(&message),
            retry_after_secs,
        });
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let message = error_message(&body);

    if status.as_u16() == HTTP_STATUS_UNAUTHORIZED || is_credential_error(&body) {
        log::warn!("Credential rejected by Gemini API: {}", message);
        return Err(GeminiError::CredentialRejected { message });
    }

    Err(GeminiError::ApiError(format!(
        "API request failed with status {}: {}",
        status, message
    )))
}

/// Pull the human message out of a Google error envelope, if there is one.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) if !envelope.error.message.is_empty() => {
                format!("{} ({})", envelope.error.message, status)
            }
            _ => envelope.error.message,
        },
        Err(_) => body.trim().to_string(),
    }
}

#[async_trait]
impl StoryBackend for GeminiClient {
    async fn generate_outline(&self, topic: &str) -> Result<Outline, GenerationError> {
        self.outline(topic)
            .await
            .map_err(|e| e.into_generation_error(Stage::Outline))
    }

    async fn generate_illustration(
        &self,
        prompt: &str,
        style: ArtStyle,
        ratio: AspectRatio,
    ) -> Result<ImageResource, GenerationError> {
        self.illustrate(prompt, style, ratio)
            .await
            .map_err(|e| e.into_generation_error(Stage::Image))
    }

    async fn generate_clip(
        &self,
        image: &ImageResource,
        prompt: &str,
        ratio: AspectRatio,
    ) -> Result<VideoResource, GenerationError> {
        self.animate(image, prompt, ratio)
            .await
            .map_err(|e| e.into_generation_error(Stage::Video))
    }
}

/// Errors that can occur during Gemini operations.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Credential rejected: {message}")]
    CredentialRejected {
        /// Backend message, e.g. "Requested entity was not found."
        message: String,
    },

    #[error("Generation timed out after {waited_secs}s")]
    Timeout { waited_secs: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError {
        /// Human-readable network error message
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty prompt")]
    EmptyPrompt,
}

impl GeminiError {
    /// Whether the failure means the credential must be re-selected.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            GeminiError::MissingApiKey | GeminiError::CredentialRejected { .. }
        )
    }

    pub fn into_generation_error(self, stage: Stage) -> GenerationError {
        if self.is_credential_error() {
            GenerationError::CredentialRejected {
                stage,
                message: self.to_string(),
            }
        } else {
            GenerationError::Failed {
                stage,
                message: self.to_string(),
            }
        }
    }
}
