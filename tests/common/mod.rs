//! Scripted media backend shared by the integration tests.
//!
//! Each clip is looked up by file name: a known name plays that many frames,
//! an unknown name fails to load.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dreamtales::media::VideoResource;
use dreamtales::stitch::{
    AudioTap, ClipPlayer, CodecChoice, EncoderConfig, MediaBackend, MediaEncoder, PlaybackError,
    PlaybackEvent, StitchError, StitchSettings, VideoFrame,
};

/// Ordered record of what the pipeline did.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Clone)]
pub struct FakeMedia {
    pub log: EventLog,
    frames: HashMap<String, usize>,
    /// Clips whose playback errors after the first frame.
    failing: Vec<String>,
    encoder_configs: Arc<Mutex<Vec<EncoderConfig>>>,
    /// Formats reported as encodable. Empty means everything.
    formats: Vec<&'static str>,
    /// 1-based video push the encoder rejects.
    fail_video_at: Option<usize>,
    fail_finish: bool,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self {
            log: EventLog::default(),
            frames: HashMap::new(),
            failing: Vec::new(),
            encoder_configs: Arc::new(Mutex::new(Vec::new())),
            formats: Vec::new(),
            fail_video_at: None,
            fail_finish: false,
        }
    }

    pub fn clip(mut self, name: &str, frames: usize) -> Self {
        self.frames.insert(name.to_string(), frames);
        self
    }

    pub fn failing_clip(mut self, name: &str) -> Self {
        self.frames.insert(name.to_string(), 3);
        self.failing.push(name.to_string());
        self
    }

    pub fn only_formats(mut self, formats: &[&'static str]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    pub fn failing_encoder_at(mut self, push: usize) -> Self {
        self.fail_video_at = Some(push);
        self
    }

    pub fn failing_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }

    pub fn encoder_configs(&self) -> Vec<EncoderConfig> {
        self.encoder_configs.lock().unwrap().clone()
    }
}

impl MediaBackend for FakeMedia {
    type Player = FakePlayer;
    type Encoder = FakeEncoder;

    fn supports_codec(&self, codec: &CodecChoice) -> bool {
        self.formats.is_empty() || self.formats.contains(&codec.format)
    }

    fn create_player(&self, _settings: &StitchSettings) -> Result<FakePlayer, StitchError> {
        Ok(FakePlayer {
            log: self.log.clone(),
            frames: self.frames.clone(),
            failing: self.failing.clone(),
            tap: AudioTap::new(),
            loaded: None,
            remaining: 0,
            played: 0,
            playing: false,
        })
    }

    fn create_encoder(&self, config: EncoderConfig) -> Result<FakeEncoder, StitchError> {
        self.log.push(format!(
            "encoder {}x{} {}",
            config.canvas.width, config.canvas.height, config.codec.format
        ));
        self.encoder_configs.lock().unwrap().push(config.clone());
        Ok(FakeEncoder {
            log: self.log.clone(),
            config,
            started: false,
            pending: 0,
            pushed: 0,
            fail_video_at: self.fail_video_at,
            fail_finish: self.fail_finish,
            frame_bytes: Vec::new(),
        })
    }
}

pub struct FakePlayer {
    log: EventLog,
    frames: HashMap<String, usize>,
    failing: Vec<String>,
    tap: AudioTap,
    loaded: Option<String>,
    remaining: usize,
    played: usize,
    playing: bool,
}

fn file_name(clip: &VideoResource) -> String {
    clip.path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl ClipPlayer for FakePlayer {
    async fn load(&mut self, clip: &VideoResource) -> Result<(), PlaybackError> {
        let name = file_name(clip);
        self.log.push(format!("load {}", name));
        match self.frames.get(&name) {
            Some(frames) => {
                self.remaining = *frames;
                self.loaded = Some(name);
                Ok(())
            }
            None => {
                self.loaded = None;
                Err(PlaybackError::Probe(format!("{} not found", name)))
            }
        }
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.loaded.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        self.played = 0;
        self.playing = true;
        self.tap.replace(vec![0.25; 4096]);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    async fn next_frame(&mut self) -> PlaybackEvent {
        let name = self.loaded.clone().unwrap_or_default();
        if self.failing.contains(&name) && self.played == 1 {
            return PlaybackEvent::Error(PlaybackError::Decode("corrupt packet".to_string()));
        }
        if self.remaining == 0 {
            self.playing = false;
            return PlaybackEvent::Ended;
        }
        self.remaining -= 1;
        self.played += 1;
        PlaybackEvent::Frame(VideoFrame {
            width: 2,
            height: 2,
            data: vec![200; 16],
        })
    }

    fn audio_output(&self) -> AudioTap {
        self.tap.clone()
    }

    fn stop(&mut self) {
        self.log.push("stop");
        self.playing = false;
        self.tap.clear();
    }
}

pub struct FakeEncoder {
    log: EventLog,
    config: EncoderConfig,
    started: bool,
    pending: usize,
    pushed: usize,
    fail_video_at: Option<usize>,
    fail_finish: bool,
    pub frame_bytes: Vec<usize>,
}

#[async_trait]
impl MediaEncoder for FakeEncoder {
    fn codec(&self) -> &CodecChoice {
        &self.config.codec
    }

    async fn start(&mut self) -> Result<(), StitchError> {
        self.log.push("start");
        self.started = true;
        Ok(())
    }

    async fn push_video(&mut self, frame: &[u8]) -> Result<(), StitchError> {
        if !self.started {
            return Err(StitchError::Encoder("not started".to_string()));
        }
        if frame.len() != self.config.canvas.frame_bytes() {
            return Err(StitchError::Encoder(format!("bad frame size {}", frame.len())));
        }
        self.pushed += 1;
        if self.fail_video_at == Some(self.pushed) {
            self.log.push("video rejected");
            return Err(StitchError::Encoder("broken pipe".to_string()));
        }
        self.log.push("video");
        self.pending += 1;
        Ok(())
    }

    async fn push_audio(&mut self, samples: &[f32]) -> Result<(), StitchError> {
        self.log.push(format!("audio {}", samples.len()));
        Ok(())
    }

    fn drain_output(&mut self) -> Vec<Vec<u8>> {
        let chunks = (0..self.pending).map(|_| vec![b'F']).collect();
        self.pending = 0;
        chunks
    }

    async fn finish(&mut self) -> Result<Vec<Vec<u8>>, StitchError> {
        self.log.push("finish");
        self.started = false;
        if self.fail_finish {
            return Err(StitchError::Encoder("muxer failed".to_string()));
        }
        Ok(vec![b"END".to_vec()])
    }

    async fn abort(&mut self) {
        self.log.push("abort");
        self.started = false;
    }
}

pub fn clip(name: &str) -> VideoResource {
    VideoResource::new(format!("/clips/{}", name))
}
