//! dreamtales library crate.
//!
//! Turns a topic into a four-scene illustrated story, animates each scene
//! and stitches the clips into one movie.

pub mod cli;
pub mod config;
pub mod export;
pub mod gemini;
pub mod generation;
pub mod media;
pub mod orchestrator;
pub mod scene;
pub mod stitch;
