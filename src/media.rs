//! Shared media value types: aspect ratios, art styles, outlines and the
//! resource handles that flow between the generation client, the
//! orchestrator and the stitching pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Aspect ratio selectable for illustrations, clips and the final movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Square,
        AspectRatio::Standard,
        AspectRatio::Tall,
    ];

    /// Label as sent to the backend, e.g. `"16:9"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Standard => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }

    /// Human readable label used by the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "Landscape (16:9)",
            AspectRatio::Portrait => "Portrait (9:16)",
            AspectRatio::Square => "Square (1:1)",
            AspectRatio::Standard => "Standard (4:3)",
            AspectRatio::Tall => "Tall (3:4)",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "Unknown aspect ratio '{}'. Available: 16:9, 9:16, 1:1, 4:3, 3:4",
                    s
                )
            })
    }
}

/// Illustration style preset. The descriptor is appended to every image prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtStyle {
    #[default]
    Disney,
    Pixar,
    Watercolor,
    Anime,
    Flat,
    Vintage,
}

impl ArtStyle {
    pub const ALL: [ArtStyle; 6] = [
        ArtStyle::Disney,
        ArtStyle::Pixar,
        ArtStyle::Watercolor,
        ArtStyle::Anime,
        ArtStyle::Flat,
        ArtStyle::Vintage,
    ];

    pub fn descriptor(&self) -> &'static str {
        match self {
            ArtStyle::Disney => {
                "Disney Animation Style, 3D render, cute, expressive, vibrant lighting"
            }
            ArtStyle::Pixar => "Pixar Style, high fidelity, 3D, emotional, detailed textures",
            ArtStyle::Watercolor => {
                "Soft Watercolor, storybook illustration, dreamy, pastel colors"
            }
            ArtStyle::Anime => "Anime Style, Studio Ghibli inspired, lush backgrounds, detailed",
            ArtStyle::Flat => "Flat Vector Art, simple, colorful, clean lines, modern",
            ArtStyle::Vintage => {
                "Vintage Storybook, intricate line work, classic illustration, warm tones"
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArtStyle::Disney => "Disney 3D",
            ArtStyle::Pixar => "Pixar 3D",
            ArtStyle::Watercolor => "Watercolor",
            ArtStyle::Anime => "Studio Ghibli",
            ArtStyle::Flat => "Flat Vector",
            ArtStyle::Vintage => "Vintage",
        }
    }
}

impl FromStr for ArtStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disney" => Ok(ArtStyle::Disney),
            "pixar" => Ok(ArtStyle::Pixar),
            "watercolor" => Ok(ArtStyle::Watercolor),
            "anime" | "ghibli" => Ok(ArtStyle::Anime),
            "flat" => Ok(ArtStyle::Flat),
            "vintage" => Ok(ArtStyle::Vintage),
            other => Err(format!(
                "Unknown style '{}'. Available styles: disney, pixar, watercolor, anime, flat, vintage",
                other
            )),
        }
    }
}

/// Story outline returned by the text model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub scenes: Vec<OutlineScene>,
}

/// One page of an outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineScene {
    pub story_text: String,
    pub visual_prompt: String,
}

/// A generated still image held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageResource {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageResource {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResource")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A generated clip stored on disk for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoResource {
    pub path: PathBuf,
    pub mime_type: String,
}

impl VideoResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime_type: "video/mp4".to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The finalized output of a stitch.
#[derive(Clone, PartialEq, Eq)]
pub struct MergedMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
    /// File extension matching the container, without the dot.
    pub extension: String,
}

impl MergedMedia {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for MergedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedMedia")
            .field("mime_type", &self.mime_type)
            .field("extension", &self.extension)
            .field("bytes", &self.data.len())
            .finish()
    }
}
