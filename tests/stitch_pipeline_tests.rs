//! Stitch pipeline tests against a scripted media backend.

mod common;

use common::{clip, FakeMedia};
use dreamtales::media::AspectRatio;
use dreamtales::stitch::{stitch, stitch_with_canvas, CanvasSize, StitchError, StitchSettings};

const SMALL: CanvasSize = CanvasSize::new(4, 4);

#[tokio::test]
async fn test_clips_play_in_order_with_progress() {
    let media = FakeMedia::new().clip("one.mp4", 2).clip("two.mp4", 3);
    let mut progress = Vec::new();

    let movie = stitch_with_canvas(
        &media,
        &[clip("one.mp4"), clip("two.mp4")],
        SMALL,
        &StitchSettings::default(),
        |index, total| progress.push((index, total)),
    )
    .await
    .unwrap();

    assert_eq!(progress, vec![(0, 2), (1, 2)]);

    let loads: Vec<String> = media
        .log
        .events()
        .into_iter()
        .filter(|e| e.starts_with("load"))
        .collect();
    assert_eq!(loads, vec!["load one.mp4", "load two.mp4"]);

    assert_eq!(media.log.count("video"), 5);
    assert_eq!(movie.data, b"FFFFFEND".to_vec());
    assert_eq!(movie.mime_type, "video/webm;codecs=vp9,opus");
    assert_eq!(movie.extension, "webm");
}

#[tokio::test]
async fn test_each_frame_carries_one_frame_of_audio() {
    let media = FakeMedia::new().clip("one.mp4", 2);
    let settings = StitchSettings::default();

    stitch_with_canvas(&media, &[clip("one.mp4")], SMALL, &settings, |_, _| {})
        .await
        .unwrap();

    let expected = format!("audio {}", settings.samples_per_frame() * settings.channels as usize);
    assert_eq!(media.log.count(&expected), 2);
}

#[tokio::test]
async fn test_unloadable_clip_is_skipped() {
    let media = FakeMedia::new().clip("a.mp4", 2).clip("c.mp4", 1);
    let mut progress = Vec::new();

    let movie = stitch_with_canvas(
        &media,
        &[clip("a.mp4"), clip("missing.mp4"), clip("c.mp4")],
        SMALL,
        &StitchSettings::default(),
        |index, total| progress.push((index, total)),
    )
    .await
    .unwrap();

    assert_eq!(progress, vec![(0, 3), (1, 3), (2, 3)]);
    assert!(media.log.contains("load missing.mp4"));
    assert_eq!(media.log.count("video"), 3);
    assert_eq!(movie.data, b"FFFEND".to_vec());
}

#[tokio::test]
async fn test_playback_error_moves_on_to_next_clip() {
    let media = FakeMedia::new().failing_clip("bad.mp4").clip("good.mp4", 2);

    let movie = stitch_with_canvas(
        &media,
        &[clip("bad.mp4"), clip("good.mp4")],
        SMALL,
        &StitchSettings::default(),
        |_, _| {},
    )
    .await
    .unwrap();

    // One frame from the failing clip, then all of the good one.
    assert_eq!(media.log.count("video"), 3);
    assert!(media.log.contains("load good.mp4"));
    assert_eq!(movie.data, b"FFFEND".to_vec());
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let media = FakeMedia::new();
    let err = stitch(&media, &[], AspectRatio::Landscape, |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(err, StitchError::EmptyInput));
    assert_eq!(err.to_string(), "No videos to stitch");
    assert!(media.encoder_configs().is_empty());
}

#[tokio::test]
async fn test_no_frames_still_finishes_container() {
    let media = FakeMedia::new();

    let movie = stitch_with_canvas(
        &media,
        &[clip("gone.mp4"), clip("also-gone.mp4")],
        SMALL,
        &StitchSettings::default(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(media.log.count("video"), 0);
    assert!(media.log.contains("finish"));
    assert!(!media.log.contains("abort"));
    assert_eq!(movie.data, b"END".to_vec());
    assert_eq!(movie.extension, "webm");
}

#[tokio::test]
async fn test_no_frames_and_failed_finish_yields_empty_movie() {
    let media = FakeMedia::new().failing_finish();

    let movie = stitch_with_canvas(
        &media,
        &[clip("gone.mp4")],
        SMALL,
        &StitchSettings::default(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert!(movie.is_empty());
    assert!(media.log.contains("finish"));
}

#[tokio::test]
async fn test_encoder_failure_tears_everything_down() {
    let media = FakeMedia::new()
        .clip("one.mp4", 2)
        .clip("two.mp4", 3)
        .failing_encoder_at(3);
    let mut progress = Vec::new();

    let err = stitch_with_canvas(
        &media,
        &[clip("one.mp4"), clip("two.mp4")],
        SMALL,
        &StitchSettings::default(),
        |index, total| progress.push((index, total)),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, StitchError::Encoder(ref m) if m == "broken pipe"));
    assert_eq!(progress, vec![(0, 2), (1, 2)]);

    let events = media.log.events();
    let rejected = events.iter().position(|e| e == "video rejected").unwrap();
    let stop = events.iter().rposition(|e| e == "stop").unwrap();
    let abort = events.iter().position(|e| e == "abort").unwrap();
    assert!(rejected < stop);
    assert!(stop < abort);
    assert!(!media.log.contains("finish"));
}

#[tokio::test]
async fn test_finish_failure_is_reported() {
    let media = FakeMedia::new().clip("one.mp4", 1).failing_finish();

    let err = stitch_with_canvas(&media, &[clip("one.mp4")], SMALL, &StitchSettings::default(), |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(err, StitchError::Encoder(ref m) if m == "muxer failed"));
    assert!(media.log.contains("stop"));
}

#[tokio::test]
async fn test_teardown_stops_player_before_finishing() {
    let media = FakeMedia::new().clip("one.mp4", 1);

    stitch_with_canvas(&media, &[clip("one.mp4")], SMALL, &StitchSettings::default(), |_, _| {})
        .await
        .unwrap();

    let events = media.log.events();
    let stop = events.iter().rposition(|e| e == "stop").unwrap();
    let finish = events.iter().position(|e| e == "finish").unwrap();
    assert!(stop < finish);
    assert!(events.iter().position(|e| e == "start").unwrap() < finish);
}

#[tokio::test]
async fn test_canvas_follows_ratio() {
    let media = FakeMedia::new().clip("tall.mp4", 1);

    stitch(&media, &[clip("tall.mp4")], AspectRatio::Portrait, |_, _| {})
        .await
        .unwrap();

    let configs = media.encoder_configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].canvas, CanvasSize::new(720, 1280));
    assert_eq!(configs[0].fps, 30);
    assert_eq!(configs[0].sample_rate, 48_000);
}

#[tokio::test]
async fn test_codec_falls_back_in_preference_order() {
    let media = FakeMedia::new().clip("one.mp4", 1).only_formats(&["mp4"]);
    let movie = stitch_with_canvas(&media, &[clip("one.mp4")], SMALL, &StitchSettings::default(), |_, _| {})
        .await
        .unwrap();
    assert_eq!(movie.mime_type, "video/mp4");
    assert_eq!(movie.extension, "mp4");

    let media = FakeMedia::new().clip("one.mp4", 1).only_formats(&["nothing"]);
    let movie = stitch_with_canvas(&media, &[clip("one.mp4")], SMALL, &StitchSettings::default(), |_, _| {})
        .await
        .unwrap();
    assert_eq!(movie.mime_type, "video/x-matroska");
    assert_eq!(movie.extension, "mkv");
}
