//! Output file naming and writing.

use std::path::{Path, PathBuf};

use crate::media::{ImageResource, MergedMedia, VideoResource};

/// Name used when a title sanitizes to nothing.
pub const UNTITLED: &str = "untitled_story";

/// File-system safe form of a story title.
///
/// Lowercases, turns whitespace runs into `_`, drops everything outside
/// `[a-z0-9_]` and trims `_` from both ends.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut in_space = false;
    for c in title.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        for lower in c.to_lowercase() {
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() || lower == '_' {
                out.push(lower);
            }
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{sanitized_title}_full_movie.{extension}`
pub fn movie_filename(title: &str, extension: &str) -> String {
    format!("{}_full_movie.{}", sanitize_title(title), extension)
}

/// `scene-{n}-image.png` / `scene-{n}-video.mp4`, `n` starting at 1.
pub fn scene_asset_filename(position: usize, kind: AssetKind) -> String {
    match kind {
        AssetKind::Image => format!("scene-{}-image.png", position),
        AssetKind::Video => format!("scene-{}-video.mp4", position),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

/// Write a stitched movie into `dir` and return its path.
pub fn write_movie(dir: &Path, title: &str, movie: &MergedMedia) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(movie_filename(title, &movie.extension));
    std::fs::write(&path, &movie.data)?;
    log::info!("Wrote {} ({} bytes)", path.display(), movie.data.len());
    Ok(path)
}

pub fn write_scene_image(
    dir: &Path,
    position: usize,
    image: &ImageResource,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(scene_asset_filename(position, AssetKind::Image));
    std::fs::write(&path, &image.data)?;
    Ok(path)
}

pub fn write_scene_clip(
    dir: &Path,
    position: usize,
    clip: &VideoResource,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(scene_asset_filename(position, AssetKind::Video));
    std::fs::copy(clip.path(), &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Bob's Dragon!"), "bobs_dragon");
        assert_eq!(sanitize_title("  The   Moon\tBunny  "), "the_moon_bunny");
        assert_eq!(sanitize_title("Chapter 2: Snow"), "chapter_2_snow");
        assert_eq!(sanitize_title("__keep_inner__"), "keep_inner");
    }

    #[test]
    fn test_sanitize_title_empty_falls_back() {
        assert_eq!(sanitize_title(""), UNTITLED);
        assert_eq!(sanitize_title("!!! ???"), UNTITLED);
        assert_eq!(sanitize_title("ドラゴン"), UNTITLED);
    }

    #[test]
    fn test_movie_filename() {
        assert_eq!(
            movie_filename("Bob's Dragon!", "webm"),
            "bobs_dragon_full_movie.webm"
        );
    }

    #[test]
    fn test_scene_asset_filenames() {
        assert_eq!(scene_asset_filename(1, AssetKind::Image), "scene-1-image.png");
        assert_eq!(scene_asset_filename(4, AssetKind::Video), "scene-4-video.mp4");
    }

    #[test]
    fn test_write_movie_and_assets() {
        let dir = TempDir::new().unwrap();
        let movie = MergedMedia {
            data: vec![1, 2, 3],
            mime_type: "video/webm".to_string(),
            extension: "webm".to_string(),
        };
        let path = write_movie(dir.path(), "A Tale", &movie).unwrap();
        assert_eq!(path.file_name().unwrap(), "a_tale_full_movie.webm");
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let image = ImageResource::new("image/png", vec![9]);
        let path = write_scene_image(dir.path(), 2, &image).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![9]);

        let src = dir.path().join("source.mp4");
        std::fs::write(&src, b"clip").unwrap();
        let path = write_scene_clip(dir.path(), 3, &VideoResource::new(&src)).unwrap();
        assert_eq!(path.file_name().unwrap(), "scene-3-video.mp4");
        assert_eq!(std::fs::read(path).unwrap(), b"clip");
    }
}
