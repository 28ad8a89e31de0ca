//! Stitching: plays each clip onto a fixed canvas and records the canvas
//! plus the mixed audio into a single movie.
//!
//! The pipeline itself only talks to the [`MediaBackend`] traits; the
//! ffmpeg implementation lives in [`FfmpegBackend`].

mod backend;
mod encoder;
mod mixer;
mod pipeline;
mod player;
mod probe;
mod process;
mod surface;

use crate::media::AspectRatio;

pub use backend::{FfmpegBackend, MediaBackend};
pub use encoder::{
    parse_encoder_list, select_codec, CodecChoice, EncoderConfig, FfmpegEncoder, MediaEncoder,
    CODEC_PREFERENCES, FALLBACK_CODEC,
};
pub use mixer::{AudioTap, MixingGraph};
pub use pipeline::{stitch, stitch_with_canvas};
pub use player::{ClipPlayer, FfmpegPlayer, PlaybackEvent, VideoFrame};
pub use probe::{parse_probe_output, probe, ClipInfo};
pub use process::{is_on_path, FfmpegProcess, PipeSpec, ProcessError};
pub use surface::Surface;

/// Output resolution of a stitched movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn for_ratio(ratio: AspectRatio) -> Self {
        match ratio {
            AspectRatio::Landscape => Self::new(1280, 720),
            AspectRatio::Portrait => Self::new(720, 1280),
            AspectRatio::Square => Self::new(1024, 1024),
            AspectRatio::Standard => Self::new(1024, 768),
            AspectRatio::Tall => Self::new(768, 1024),
        }
    }

    /// Canvas for a ratio label such as `"9:16"`. Unknown labels get 1280x720.
    pub fn for_label(label: &str) -> Self {
        label
            .parse::<AspectRatio>()
            .map(Self::for_ratio)
            .unwrap_or(Self::new(1280, 720))
    }

    /// Bytes in one RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Fixed encoding parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchSettings {
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Video bitrate in bits per second.
    pub video_bitrate: u64,
}

impl Default for StitchSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            sample_rate: 48_000,
            channels: 2,
            video_bitrate: 5_000_000,
        }
    }
}

impl StitchSettings {
    /// Audio sample frames rendered per video frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate / self.fps.max(1)) as usize
    }
}

/// Errors that abort a stitch.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("No videos to stitch")]
    EmptyInput,

    #[error("Failed to set up encoder: {0}")]
    EncoderSetup(String),

    #[error("Encoder failed: {0}")]
    Encoder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-clip failures. The pipeline logs these and skips the clip.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("No clip loaded")]
    NotLoaded,
}
