//! Clip metadata via `ffprobe`.

use std::path::Path;

use serde::Deserialize;

use super::PlaybackError;

/// What the player needs to know before decoding a clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub has_audio: bool,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

/// Read stream metadata for `path`.
pub async fn probe(path: &Path) -> Result<ClipInfo, PlaybackError> {
    let out = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| PlaybackError::Probe(format!("failed to run ffprobe: {}", e)))?;

    if !out.status.success() {
        return Err(PlaybackError::Probe(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    parse_probe_output(&out.stdout)
}

/// Parse `ffprobe -print_format json` output.
pub fn parse_probe_output(json: &[u8]) -> Result<ClipInfo, PlaybackError> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| PlaybackError::Probe(format!("ffprobe json parse failed: {}", e)))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PlaybackError::Probe("no video stream found".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(PlaybackError::Probe("missing video dimensions".to_string())),
    };

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(ClipInfo {
        width,
        height,
        duration_secs,
        has_audio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_with_audio() {
        let json = br#"{
            "streams": [
                {"codec_type": "video", "width": 1280, "height": 720},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "8.000000"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert!(info.has_audio);
        assert!((info.duration_secs - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_probe_output_silent_clip() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 720, "height": 1280}]}"#;
        let info = parse_probe_output(json).unwrap();
        assert!(!info.has_audio);
        assert_eq!(info.duration_secs, 0.0);
    }

    #[test]
    fn test_parse_probe_output_requires_video() {
        let json = br#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(PlaybackError::Probe(_))
        ));
    }
}
