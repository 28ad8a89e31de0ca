use std::collections::HashSet;
use std::process::Command;

use super::encoder::{parse_encoder_list, CodecChoice, EncoderConfig, FfmpegEncoder, MediaEncoder};
use super::player::{ClipPlayer, FfmpegPlayer};
use super::process::is_on_path;
use super::{StitchError, StitchSettings};

/// Factory for the player and encoder a stitch runs on.
pub trait MediaBackend: Send + Sync {
    type Player: ClipPlayer;
    type Encoder: MediaEncoder;

    /// Whether the output codec combination can be produced.
    fn supports_codec(&self, codec: &CodecChoice) -> bool;

    fn create_player(&self, settings: &StitchSettings) -> Result<Self::Player, StitchError>;

    fn create_encoder(&self, config: EncoderConfig) -> Result<Self::Encoder, StitchError>;
}

/// Media backend using the system `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    encoders: HashSet<String>,
}

impl FfmpegBackend {
    /// Detect ffmpeg and the encoders it was built with.
    ///
    /// # Errors
    ///
    /// Returns `StitchError::EncoderSetup` if `ffmpeg` or `ffprobe` is not on PATH.
    pub fn detect() -> Result<Self, StitchError> {
        for program in ["ffmpeg", "ffprobe"] {
            if !is_on_path(program) {
                return Err(StitchError::EncoderSetup(format!(
                    "{} not found. Please install FFmpeg (e.g. brew install ffmpeg or apt install ffmpeg)",
                    program
                )));
            }
        }

        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()?;
        let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
        log::debug!("ffmpeg reports {} encoders", encoders.len());
        Ok(Self { encoders })
    }

    /// Backend with a known encoder list.
    pub fn with_encoders<I, S>(encoders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encoders: encoders.into_iter().map(Into::into).collect(),
        }
    }
}

impl MediaBackend for FfmpegBackend {
    type Player = FfmpegPlayer;
    type Encoder = FfmpegEncoder;

    fn supports_codec(&self, codec: &CodecChoice) -> bool {
        self.encoders.contains(codec.video_codec) && self.encoders.contains(codec.audio_codec)
    }

    fn create_player(&self, settings: &StitchSettings) -> Result<Self::Player, StitchError> {
        Ok(FfmpegPlayer::new(settings))
    }

    fn create_encoder(&self, config: EncoderConfig) -> Result<Self::Encoder, StitchError> {
        Ok(FfmpegEncoder::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stitch::{select_codec, FALLBACK_CODEC};

    #[test]
    fn test_supports_codec_needs_both_encoders() {
        let backend = FfmpegBackend::with_encoders(["libx264", "flac"]);
        let codec = select_codec(|c| backend.supports_codec(c));
        assert_eq!(codec, FALLBACK_CODEC);

        let backend = FfmpegBackend::with_encoders(["libvpx", "libvorbis", "libx264", "aac"]);
        let codec = select_codec(|c| backend.supports_codec(c));
        assert_eq!(codec.video_codec, "libvpx");
    }
}
