//! Configuration file handling for dreamtales.
//!
//! Loads configuration from `~/.config/dreamtales/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::gemini::{
    DEFAULT_IMAGE_MODEL, DEFAULT_MAX_POLL_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_TEXT_MODEL,
    DEFAULT_VIDEO_MODEL,
};
use crate::media::{ArtStyle, AspectRatio};
use crate::stitch::StitchSettings;

/// Configuration file structure for dreamtales.
/// Loaded from ~/.config/dreamtales/config.toml (or custom path via --config).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub story: StoryConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeminiConfig {
    /// Override for the API host, e.g. a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_wait_secs")]
    pub max_poll_wait_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            text_model: default_text_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_wait_secs: default_max_poll_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct StoryConfig {
    #[serde(default)]
    pub style: ArtStyle,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Where movies and scene assets are written. Defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u64,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            video_bitrate: default_video_bitrate(),
            fps: default_fps(),
        }
    }
}

impl ExportConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn stitch_settings(&self) -> StitchSettings {
        StitchSettings {
            fps: self.fps.max(1),
            video_bitrate: self.video_bitrate,
            ..StitchSettings::default()
        }
    }
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_poll_wait_secs() -> u64 {
    DEFAULT_MAX_POLL_WAIT.as_secs()
}

fn default_video_bitrate() -> u64 {
    StitchSettings::default().video_bitrate
}

fn default_fps() -> u32 {
    StitchSettings::default().fps
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
                path: path.clone(),
                source: e,
            })?;
            let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }

    /// Write the default configuration to `path` unless a file already exists.
    ///
    /// Returns `true` if a file was written.
    pub fn init(path: Option<&Path>) -> Result<bool, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);
        if path.exists() {
            return Ok(false);
        }

        let content = Config::default().to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(&path, content).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        Ok(true)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    SerializeError(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::SerializeError(source) => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::SerializeError(source) => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("dreamtales").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/dreamtales/config.toml")
        })
}
