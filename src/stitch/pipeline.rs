//! The sequential play-and-record loop.

use super::backend::MediaBackend;
use super::encoder::{select_codec, EncoderConfig, MediaEncoder};
use super::mixer::MixingGraph;
use super::player::{ClipPlayer, PlaybackEvent};
use super::surface::Surface;
use super::{CanvasSize, StitchError, StitchSettings};
use crate::media::{AspectRatio, MergedMedia, VideoResource};

/// Stitch `clips` into one movie sized for `ratio`.
///
/// `on_progress(index, total)` is called before each clip starts.
///
/// # Errors
///
/// Returns `StitchError::EmptyInput` for an empty list and
/// `StitchError::Encoder` if the encoder fails. Clips that fail to load or
/// play are skipped.
///
/// If no clip produced a frame the movie is whatever the encoder writes for
/// an empty stream, usually a header-only container. When the encoder
/// cannot produce even that, `data` is empty.
pub async fn stitch<B, F>(
    backend: &B,
    clips: &[VideoResource],
    ratio: AspectRatio,
    on_progress: F,
) -> Result<MergedMedia, StitchError>
where
    B: MediaBackend,
    F: FnMut(usize, usize),
{
    stitch_with_canvas(
        backend,
        clips,
        CanvasSize::for_ratio(ratio),
        &StitchSettings::default(),
        on_progress,
    )
    .await
}

/// Stitch onto an explicit canvas with explicit settings.
pub async fn stitch_with_canvas<B, F>(
    backend: &B,
    clips: &[VideoResource],
    canvas: CanvasSize,
    settings: &StitchSettings,
    mut on_progress: F,
) -> Result<MergedMedia, StitchError>
where
    B: MediaBackend,
    F: FnMut(usize, usize),
{
    if clips.is_empty() {
        return Err(StitchError::EmptyInput);
    }

    let codec = select_codec(|c| backend.supports_codec(c));
    log::info!(
        "Stitching {} clips at {}x{} into {}",
        clips.len(),
        canvas.width,
        canvas.height,
        codec.mime_type
    );

    let mut player = backend.create_player(settings)?;
    let mut encoder = backend.create_encoder(EncoderConfig {
        canvas,
        fps: settings.fps,
        video_bitrate: settings.video_bitrate,
        sample_rate: settings.sample_rate,
        channels: settings.channels,
        codec: codec.clone(),
    })?;

    let mut surface = Surface::new(canvas);
    let mut graph = MixingGraph::new(settings.sample_rate, settings.channels);
    graph.connect(&player.audio_output());

    let mut data = Vec::new();
    let run = async {
        encoder.start().await?;
        render_clips(
            &mut player,
            &mut encoder,
            &mut graph,
            &mut surface,
            clips,
            settings,
            &mut on_progress,
            &mut data,
        )
        .await
    };
    let result = run.await;

    player.stop();
    graph.close();

    let frames = match result {
        Ok(frames) => frames,
        Err(e) => {
            log::error!("Stitch aborted: {}", e);
            encoder.abort().await;
            return Err(e);
        }
    };

    if frames == 0 {
        // Still finish so the muxer writes a header-only container.
        log::warn!("No frames were recorded; finishing an empty container");
        match encoder.finish().await {
            Ok(chunks) => data = chunks.concat(),
            Err(e) => {
                log::warn!("Empty container could not be written: {}", e);
                data.clear();
            }
        }
    } else {
        for chunk in encoder.finish().await? {
            data.extend_from_slice(&chunk);
        }
    }

    log::info!("Stitch complete: {} frames, {} bytes", frames, data.len());
    Ok(MergedMedia {
        data,
        mime_type: codec.mime_type.to_string(),
        extension: codec.extension.to_string(),
    })
}

/// Play every clip in order, recording each frame. Returns the number of
/// frames pushed to the encoder.
#[allow(clippy::too_many_arguments)]
async fn render_clips<P, E, F>(
    player: &mut P,
    encoder: &mut E,
    graph: &mut MixingGraph,
    surface: &mut Surface,
    clips: &[VideoResource],
    settings: &StitchSettings,
    on_progress: &mut F,
    data: &mut Vec<u8>,
) -> Result<u64, StitchError>
where
    P: ClipPlayer,
    E: MediaEncoder,
    F: FnMut(usize, usize),
{
    let total = clips.len();
    let audio_frames = settings.samples_per_frame();
    let mut frames = 0u64;

    for (index, clip) in clips.iter().enumerate() {
        on_progress(index, total);
        log::info!("Processing clip {}/{}: {}", index + 1, total, clip.path().display());

        if let Err(e) = player.load(clip).await {
            log::warn!("Skipping clip {}: {}", index + 1, e);
            continue;
        }
        if let Err(e) = player.play() {
            log::warn!("Skipping clip {}: {}", index + 1, e);
            continue;
        }

        while player.is_playing() {
            match player.next_frame().await {
                PlaybackEvent::Frame(frame) => {
                    if !surface.draw_scaled(&frame) {
                        log::debug!("Dropping malformed frame from clip {}", index + 1);
                    }
                    encoder.push_video(surface.pixels()).await?;
                    let audio = graph.render(audio_frames);
                    encoder.push_audio(&audio).await?;
                    frames += 1;

                    for chunk in encoder.drain_output() {
                        data.extend_from_slice(&chunk);
                    }
                }
                PlaybackEvent::Ended => break,
                PlaybackEvent::Error(e) => {
                    log::warn!("Playback of clip {} failed: {}", index + 1, e);
                    player.stop();
                    break;
                }
            }
        }
    }

    Ok(frames)
}
