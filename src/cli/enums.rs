//! CLI enum types for style and aspect ratio options.

use clap::ValueEnum;

use crate::media::{ArtStyle, AspectRatio};

/// Illustration style preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StyleArg {
    #[default]
    Disney,
    Pixar,
    Watercolor,
    #[value(alias = "ghibli")]
    Anime,
    Flat,
    Vintage,
}

impl From<StyleArg> for ArtStyle {
    fn from(s: StyleArg) -> Self {
        match s {
            StyleArg::Disney => ArtStyle::Disney,
            StyleArg::Pixar => ArtStyle::Pixar,
            StyleArg::Watercolor => ArtStyle::Watercolor,
            StyleArg::Anime => ArtStyle::Anime,
            StyleArg::Flat => ArtStyle::Flat,
            StyleArg::Vintage => ArtStyle::Vintage,
        }
    }
}

/// Aspect ratio for illustrations, clips and the exported movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RatioArg {
    #[default]
    #[value(name = "16:9", alias = "landscape")]
    Landscape,
    #[value(name = "9:16", alias = "portrait")]
    Portrait,
    #[value(name = "1:1", alias = "square")]
    Square,
    #[value(name = "4:3", alias = "standard")]
    Standard,
    #[value(name = "3:4", alias = "tall")]
    Tall,
}

impl From<RatioArg> for AspectRatio {
    fn from(r: RatioArg) -> Self {
        match r {
            RatioArg::Landscape => AspectRatio::Landscape,
            RatioArg::Portrait => AspectRatio::Portrait,
            RatioArg::Square => AspectRatio::Square,
            RatioArg::Standard => AspectRatio::Standard,
            RatioArg::Tall => AspectRatio::Tall,
        }
    }
}
