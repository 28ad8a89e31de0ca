//! Output encoding: codec selection and the ffmpeg-backed recorder.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::process::{FfmpegProcess, PipeSpec, ProcessError};
use super::{CanvasSize, StitchError};

/// Buffered frames per encoder input before `push_*` waits.
const INPUT_QUEUE_DEPTH: usize = 16;

/// Size of each read from the encoder's stdout.
const OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

const AUDIO_FIFO_NAME: &str = "audio.f32le";

/// Container plus the codecs muxed into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecChoice {
    /// ffmpeg muxer name.
    pub format: &'static str,
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    /// Extra output options for this combination.
    pub extra_args: &'static [&'static str],
}

/// Preferred outputs, best first.
pub const CODEC_PREFERENCES: &[CodecChoice] = &[
    CodecChoice {
        format: "webm",
        mime_type: "video/webm;codecs=vp9,opus",
        extension: "webm",
        video_codec: "libvpx-vp9",
        audio_codec: "libopus",
        extra_args: &["-deadline", "realtime", "-cpu-used", "8"],
    },
    CodecChoice {
        format: "webm",
        mime_type: "video/webm;codecs=vp8,vorbis",
        extension: "webm",
        video_codec: "libvpx",
        audio_codec: "libvorbis",
        extra_args: &["-deadline", "realtime", "-cpu-used", "8"],
    },
    CodecChoice {
        format: "mp4",
        mime_type: "video/mp4",
        extension: "mp4",
        video_codec: "libx264",
        audio_codec: "aac",
        extra_args: &["-preset", "veryfast", "-movflags", "frag_keyframe+empty_moov"],
    },
];

/// Used when nothing in [`CODEC_PREFERENCES`] is available. Both codecs are
/// built into every ffmpeg.
pub const FALLBACK_CODEC: CodecChoice = CodecChoice {
    format: "matroska",
    mime_type: "video/x-matroska",
    extension: "mkv",
    video_codec: "mpeg4",
    audio_codec: "flac",
    extra_args: &[],
};

/// First preference accepted by `is_supported`, else the fallback.
pub fn select_codec(is_supported: impl Fn(&CodecChoice) -> bool) -> CodecChoice {
    CODEC_PREFERENCES
        .iter()
        .find(|c| is_supported(c))
        .cloned()
        .unwrap_or(FALLBACK_CODEC)
}

/// Parse `ffmpeg -encoders` output into encoder names.
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            // Capability rows look like " V....D libx264  description".
            let is_row = flags.len() == 6
                && flags
                    .chars()
                    .next()
                    .is_some_and(|c| matches!(c, 'V' | 'A' | 'S'));
            (is_row && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Everything an encoder needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub canvas: CanvasSize,
    pub fps: u32,
    pub video_bitrate: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: CodecChoice,
}

/// Records the surface and the mixed audio into a container.
#[async_trait]
pub trait MediaEncoder: Send {
    fn codec(&self) -> &CodecChoice;

    async fn start(&mut self) -> Result<(), StitchError>;

    /// One canvas frame, RGBA.
    async fn push_video(&mut self, frame: &[u8]) -> Result<(), StitchError>;

    /// Interleaved f32 samples covering one frame interval.
    async fn push_audio(&mut self, samples: &[f32]) -> Result<(), StitchError>;

    /// Output produced so far. Chunks are never empty.
    fn drain_output(&mut self) -> Vec<Vec<u8>>;

    /// Flush and stop; returns the remaining output.
    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, StitchError>;

    /// Stop without flushing. Safe to call in any state.
    async fn abort(&mut self);
}

/// ffmpeg recorder: rawvideo on stdin, f32le audio on a named pipe,
/// container on stdout.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    state: Option<Running>,
}

struct Running {
    process: FfmpegProcess,
    fifo_dir: tempfile::TempDir,
    video_tx: Option<mpsc::Sender<Vec<u8>>>,
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    writers: Vec<JoinHandle<std::io::Result<()>>>,
    output_rx: std_mpsc::Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    fn args(&self, audio_input: &str) -> Vec<String> {
        let c = &self.config;
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", c.canvas.width, c.canvas.height),
            "-r",
            &c.fps.to_string(),
            "-i",
            "pipe:0",
            "-f",
            "f32le",
            "-ar",
            &c.sample_rate.to_string(),
            "-ac",
            &c.channels.to_string(),
            "-i",
            audio_input,
            "-map",
            "0:v",
            "-map",
            "1:a",
            "-c:v",
            c.codec.video_codec,
            "-b:v",
            &c.video_bitrate.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            c.codec.audio_codec,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(c.codec.extra_args.iter().map(|s| s.to_string()));
        args.extend(["-f", c.codec.format, "pipe:1"].iter().map(|s| s.to_string()));
        args
    }

    fn running(&mut self) -> Result<&mut Running, StitchError> {
        self.state
            .as_mut()
            .ok_or_else(|| StitchError::Encoder("encoder is not running".to_string()))
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    fn codec(&self) -> &CodecChoice {
        &self.config.codec
    }

    async fn start(&mut self) -> Result<(), StitchError> {
        if self.state.is_some() {
            return Ok(());
        }

        let fifo_dir = tempfile::Builder::new()
            .prefix("dreamtales-audio")
            .tempdir()?;
        let fifo_path = fifo_path(fifo_dir.path());
        make_fifo(&fifo_path)?;

        let args = self.args(&fifo_path.to_string_lossy());
        let mut process = FfmpegProcess::spawn(
            "ffmpeg",
            &args,
            PipeSpec {
                stdin: true,
                stdout: true,
            },
            "ffmpeg-encode",
        )
        .map_err(|e| StitchError::EncoderSetup(e.to_string()))?;

        let stdin = process
            .take_stdin()
            .ok_or_else(|| StitchError::EncoderSetup("failed to open ffmpeg stdin".to_string()))?;
        let mut stdout = process
            .take_stdout()
            .ok_or_else(|| StitchError::EncoderSetup("failed to open ffmpeg stdout".to_string()))?;

        let (video_tx, video_rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE_DEPTH);
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(INPUT_QUEUE_DEPTH);

        let video_writer = spawn_writer(video_rx, move || Ok(stdin));
        let audio_path = fifo_path.clone();
        // Opening a FIFO for writing blocks until ffmpeg opens it for reading.
        let audio_writer = spawn_writer(audio_rx, move || {
            std::fs::OpenOptions::new().write(true).open(&audio_path)
        });

        let (output_tx, output_rx) = std_mpsc::channel();
        let reader = thread::spawn(move || {
            let mut buf = vec![0u8; OUTPUT_CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        log::info!(
            "Encoder started: {}x{} @ {} fps, {} ({} + {})",
            self.config.canvas.width,
            self.config.canvas.height,
            self.config.fps,
            self.config.codec.format,
            self.config.codec.video_codec,
            self.config.codec.audio_codec
        );

        self.state = Some(Running {
            process,
            fifo_dir,
            video_tx: Some(video_tx),
            audio_tx: Some(audio_tx),
            writers: vec![video_writer, audio_writer],
            output_rx,
            reader: Some(reader),
        });
        Ok(())
    }

    async fn push_video(&mut self, frame: &[u8]) -> Result<(), StitchError> {
        let running = self.running()?;
        let tx = running
            .video_tx
            .as_ref()
            .ok_or_else(|| StitchError::Encoder("video input closed".to_string()))?;
        tx.send(frame.to_vec())
            .await
            .map_err(|_| StitchError::Encoder("ffmpeg stopped accepting video".to_string()))
    }

    async fn push_audio(&mut self, samples: &[f32]) -> Result<(), StitchError> {
        if samples.is_empty() {
            return Ok(());
        }
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let running = self.running()?;
        let tx = running
            .audio_tx
            .as_ref()
            .ok_or_else(|| StitchError::Encoder("audio input closed".to_string()))?;
        tx.send(bytes)
            .await
            .map_err(|_| StitchError::Encoder("ffmpeg stopped accepting audio".to_string()))
    }

    fn drain_output(&mut self) -> Vec<Vec<u8>> {
        match self.state.as_ref() {
            Some(running) => running.output_rx.try_iter().filter(|c| !c.is_empty()).collect(),
            None => Vec::new(),
        }
    }

    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, StitchError> {
        let Some(mut running) = self.state.take() else {
            return Ok(Vec::new());
        };

        // Closing both inputs signals end of stream.
        running.video_tx = None;
        running.audio_tx = None;

        let fifo_path = fifo_path(running.fifo_dir.path());
        let joined = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<u8>>, StitchError> {
            let status = running.process.wait_success();
            // ffmpeg may exit before it ever opened the audio pipe.
            release_fifo(&fifo_path);
            for writer in running.writers.drain(..) {
                match writer.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::warn!("Encoder input writer failed: {}", e),
                    Err(_) => log::warn!("Encoder input writer panicked"),
                }
            }
            if let Some(reader) = running.reader.take() {
                let _ = reader.join();
            }
            let chunks: Vec<Vec<u8>> = running
                .output_rx
                .try_iter()
                .filter(|c| !c.is_empty())
                .collect();
            drop(running.fifo_dir);
            status.map_err(|e: ProcessError| StitchError::Encoder(e.to_string()))?;
            Ok(chunks)
        })
        .await
        .map_err(|e| StitchError::Encoder(format!("encoder shutdown task failed: {}", e)))?;

        if joined.is_ok() {
            log::info!("Encoder finished");
        }
        joined
    }

    async fn abort(&mut self) {
        let Some(mut running) = self.state.take() else {
            return;
        };
        running.video_tx = None;
        running.audio_tx = None;

        let fifo_path = fifo_path(running.fifo_dir.path());
        let result = tokio::task::spawn_blocking(move || {
            let _ = running.process.shutdown();
            // Release a writer still blocked opening the FIFO.
            release_fifo(&fifo_path);
            for writer in running.writers.drain(..) {
                let _ = writer.join();
            }
            if let Some(reader) = running.reader.take() {
                let _ = reader.join();
            }
        })
        .await;

        if let Err(e) = result {
            log::warn!("Encoder abort task failed: {}", e);
        }
        log::info!("Encoder aborted");
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut running) = self.state.take() {
            running.video_tx = None;
            running.audio_tx = None;
            let _ = running.process.shutdown();
            release_fifo(&fifo_path(running.fifo_dir.path()));
        }
    }
}

/// Feed queued buffers into a sink opened on the writer thread.
fn spawn_writer<W, F>(mut rx: mpsc::Receiver<Vec<u8>>, open: F) -> JoinHandle<std::io::Result<()>>
where
    W: Write,
    F: FnOnce() -> std::io::Result<W> + Send + 'static,
{
    thread::spawn(move || {
        let mut sink = open()?;
        while let Some(buf) = rx.blocking_recv() {
            sink.write_all(&buf)?;
        }
        sink.flush()
    })
}

#[cfg(unix)]
fn make_fifo(path: &std::path::Path) -> Result<(), StitchError> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| StitchError::EncoderSetup(e.to_string()))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(StitchError::EncoderSetup(format!(
            "failed to create audio pipe: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_fifo(_path: &std::path::Path) -> Result<(), StitchError> {
    Err(StitchError::EncoderSetup(
        "audio pipes are only supported on unix".to_string(),
    ))
}

/// Open the FIFO's read end without blocking so a pending writer open returns.
#[cfg(unix)]
fn release_fifo(path: &std::path::Path) {
    use std::os::unix::fs::OpenOptionsExt;

    let _ = std::fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
}

#[cfg(not(unix))]
fn release_fifo(_path: &std::path::Path) {}

fn fifo_path(dir: &std::path::Path) -> PathBuf {
    dir.join(AUDIO_FIFO_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
 A....D flac                 FLAC (Free Lossless Audio Codec)
";

    #[test]
    fn test_parse_encoder_list() {
        let encoders = parse_encoder_list(ENCODERS);
        assert!(encoders.contains("libx264"));
        assert!(encoders.contains("aac"));
        assert!(!encoders.contains("="));
        assert!(!encoders.contains("------"));
    }

    #[test]
    fn test_select_codec_prefers_vp9() {
        let codec = select_codec(|_| true);
        assert_eq!(codec.video_codec, "libvpx-vp9");
        assert_eq!(codec.extension, "webm");
    }

    #[test]
    fn test_select_codec_walks_preferences() {
        let encoders = parse_encoder_list(ENCODERS);
        let codec = select_codec(|c| {
            encoders.contains(c.video_codec) && encoders.contains(c.audio_codec)
        });
        assert_eq!(codec.format, "mp4");
        assert_eq!(codec.mime_type, "video/mp4");
    }

    #[test]
    fn test_select_codec_falls_back_to_matroska() {
        let codec = select_codec(|_| false);
        assert_eq!(codec, FALLBACK_CODEC);
        assert_eq!(codec.extension, "mkv");
    }

    #[test]
    fn test_encoder_args_wire_both_inputs() {
        let encoder = FfmpegEncoder::new(EncoderConfig {
            canvas: CanvasSize::new(720, 1280),
            fps: 30,
            video_bitrate: 5_000_000,
            sample_rate: 48_000,
            channels: 2,
            codec: FALLBACK_CODEC,
        });
        let args = encoder.args("/tmp/audio.f32le");
        let joined = args.join(" ");
        assert!(joined.contains("-s 720x1280 -r 30 -i pipe:0"));
        assert!(joined.contains("-f f32le -ar 48000 -ac 2 -i /tmp/audio.f32le"));
        assert!(joined.contains("-b:v 5000000"));
        assert!(joined.ends_with("-f matroska pipe:1"));
    }

    #[tokio::test]
    async fn test_push_before_start_is_an_error() {
        let mut encoder = FfmpegEncoder::new(EncoderConfig {
            canvas: CanvasSize::new(2, 2),
            fps: 30,
            video_bitrate: 1,
            sample_rate: 48_000,
            channels: 2,
            codec: FALLBACK_CODEC,
        });
        assert!(matches!(
            encoder.push_video(&[0; 16]).await,
            Err(StitchError::Encoder(_))
        ));
        assert!(encoder.drain_output().is_empty());
        assert!(encoder.finish().await.unwrap().is_empty());
        encoder.abort().await;
    }
}
