//! Clip playback: decoded frames out, audio into a tap.

use std::io::Read;
use std::path::Path;
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::mixer::AudioTap;
use super::probe::{probe, ClipInfo};
use super::process::{FfmpegProcess, PipeSpec};
use super::{PlaybackError, StitchSettings};
use crate::media::VideoResource;

/// Frames buffered between the decoder thread and the pipeline.
const FRAME_QUEUE_DEPTH: usize = 8;

/// One decoded frame in RGBA at the clip's native size.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Result of waiting for the next frame.
#[derive(Debug)]
pub enum PlaybackEvent {
    Frame(VideoFrame),
    Ended,
    Error(PlaybackError),
}

/// A reusable player. One instance plays every clip of a stitch.
#[async_trait]
pub trait ClipPlayer: Send {
    /// Load a clip: metadata plus audio. Returns once the clip is ready to play.
    async fn load(&mut self, clip: &VideoResource) -> Result<(), PlaybackError>;

    /// Start producing frames for the loaded clip.
    fn play(&mut self) -> Result<(), PlaybackError>;

    fn is_playing(&self) -> bool;

    /// Wait for the next frame. `Ended` clears `is_playing`.
    async fn next_frame(&mut self) -> PlaybackEvent;

    /// The node this player's audio flows through. Stable across loads.
    fn audio_output(&self) -> AudioTap;

    /// Stop playback and release the decoder.
    fn stop(&mut self);
}

/// `ClipPlayer` backed by ffprobe and ffmpeg decoders.
pub struct FfmpegPlayer {
    fps: u32,
    sample_rate: u32,
    channels: u16,
    tap: AudioTap,
    loaded: Option<LoadedClip>,
    decoder: Option<FfmpegProcess>,
    frames: Option<mpsc::Receiver<Result<VideoFrame, PlaybackError>>>,
}

struct LoadedClip {
    clip: VideoResource,
    info: ClipInfo,
}

impl FfmpegPlayer {
    pub fn new(settings: &StitchSettings) -> Self {
        Self {
            fps: settings.fps,
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            tap: AudioTap::new(),
            loaded: None,
            decoder: None,
            frames: None,
        }
    }

    /// Info about the currently loaded clip.
    pub fn clip_info(&self) -> Option<&ClipInfo> {
        self.loaded.as_ref().map(|l| &l.info)
    }
}

#[async_trait]
impl ClipPlayer for FfmpegPlayer {
    async fn load(&mut self, clip: &VideoResource) -> Result<(), PlaybackError> {
        self.stop();
        self.loaded = None;

        let info = probe(clip.path()).await?;
        let samples = if info.has_audio {
            decode_audio(clip.path(), self.sample_rate, self.channels).await?
        } else {
            log::debug!("{} has no audio stream; contributing silence", clip.path().display());
            Vec::new()
        };
        self.tap.replace(samples);

        log::debug!(
            "Loaded {} ({}x{}, {:.1}s)",
            clip.path().display(),
            info.width,
            info.height,
            info.duration_secs
        );
        self.loaded = Some(LoadedClip {
            clip: clip.clone(),
            info,
        });
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let loaded = self.loaded.as_ref().ok_or(PlaybackError::NotLoaded)?;

        let filter = format!("fps={}", self.fps);
        let path = loaded.clip.path().to_string_lossy().into_owned();
        let mut decoder = FfmpegProcess::spawn(
            "ffmpeg",
            [
                "-v", "error", "-i", &path, "-an", "-vf", &filter, "-f", "rawvideo", "-pix_fmt",
                "rgba", "pipe:1",
            ],
            PipeSpec {
                stdin: false,
                stdout: true,
            },
            "ffmpeg-decode",
        )
        .map_err(|e| PlaybackError::Decode(e.to_string()))?;

        let mut stdout = decoder
            .take_stdout()
            .ok_or_else(|| PlaybackError::Decode("failed to open decoder stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (width, height) = (loaded.info.width, loaded.info.height);
        let frame_len = width as usize * height as usize * 4;

        thread::spawn(move || loop {
            let mut data = vec![0u8; frame_len];
            match stdout.read_exact(&mut data) {
                Ok(()) => {
                    let frame = VideoFrame {
                        width,
                        height,
                        data,
                    };
                    if tx.blocking_send(Ok(frame)).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    let _ = tx.blocking_send(Err(PlaybackError::Decode(e.to_string())));
                    break;
                }
            }
        });

        self.decoder = Some(decoder);
        self.frames = Some(rx);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.frames.is_some()
    }

    async fn next_frame(&mut self) -> PlaybackEvent {
        let Some(frames) = self.frames.as_mut() else {
            return PlaybackEvent::Ended;
        };

        match frames.recv().await {
            Some(Ok(frame)) => PlaybackEvent::Frame(frame),
            Some(Err(e)) => {
                self.stop();
                PlaybackEvent::Error(e)
            }
            None => {
                self.frames = None;
                if let Some(mut decoder) = self.decoder.take() {
                    if let Err(e) = decoder.wait_success() {
                        return PlaybackEvent::Error(PlaybackError::Decode(e.to_string()));
                    }
                }
                PlaybackEvent::Ended
            }
        }
    }

    fn audio_output(&self) -> AudioTap {
        self.tap.clone()
    }

    fn stop(&mut self) {
        self.frames = None;
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.shutdown();
        }
    }
}

impl Drop for FfmpegPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode a clip's whole audio track to interleaved f32.
async fn decode_audio(
    path: &Path,
    sample_rate: u32,
    channels: u16,
) -> Result<Vec<f32>, PlaybackError> {
    let out = tokio::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &channels.to_string(),
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .await
        .map_err(|e| PlaybackError::Decode(format!("failed to run ffmpeg for audio decode: {}", e)))?;

    if !out.status.success() {
        return Err(PlaybackError::Decode(format!(
            "audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    Ok(f32_samples(&out.stdout))
}

/// Little-endian f32 PCM to samples. A trailing partial sample is dropped.
pub(crate) fn f32_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_samples_drops_partial_tail() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0);
        assert_eq!(f32_samples(&bytes), vec![0.5, -1.0]);
    }

    #[test]
    fn test_play_without_load_is_rejected() {
        let mut player = FfmpegPlayer::new(&StitchSettings::default());
        assert!(matches!(player.play(), Err(PlaybackError::NotLoaded)));
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_next_frame_when_idle_is_ended() {
        let mut player = FfmpegPlayer::new(&StitchSettings::default());
        assert!(matches!(player.next_frame().await, PlaybackEvent::Ended));
    }

    #[test]
    fn test_audio_output_is_stable() {
        let player = FfmpegPlayer::new(&StitchSettings::default());
        assert!(player.audio_output().ptr_eq(&player.audio_output()));
    }
}
