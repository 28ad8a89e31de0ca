//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{RatioArg, StyleArg};

/// Turn a topic into an illustrated, animated short story movie
#[derive(Parser, Debug)]
#[command(name = "dreamtales")]
#[command(version, about = "Illustrated, animated children's stories from a single topic", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the whole workflow: outline, illustrations, clips and the movie
    Make {
        /// What the story is about
        topic: String,

        /// Illustration style (default from config)
        #[arg(long, short)]
        style: Option<StyleArg>,

        /// Aspect ratio (default from config)
        #[arg(long, short)]
        ratio: Option<RatioArg>,

        /// Output directory (default from config, else current directory)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Leave these scenes (1-based) out of the movie
        #[arg(long = "skip-scene", value_name = "N")]
        skip_scenes: Vec<usize>,

        /// Stop after the illustrations
        #[arg(long)]
        images_only: bool,

        /// Also write each scene's image and clip
        #[arg(long)]
        assets: bool,
    },
    /// Print a story outline without generating media
    Outline {
        /// What the story is about
        topic: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stitch existing clips into one movie
    Stitch {
        /// Clips, in playback order
        #[arg(required = true)]
        clips: Vec<PathBuf>,

        /// Canvas aspect ratio
        #[arg(long, short, default_value = "16:9")]
        ratio: RatioArg,

        /// Output directory
        #[arg(long, short, default_value = ".")]
        output: PathBuf,

        /// Title used for the file name
        #[arg(long, short, default_value = "stitched")]
        title: String,
    },
    /// Re-read credentials from the environment and .env
    Login,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_defaults() {
        let args = Args::parse_from(["dreamtales", "make", "a dragon who breathes bubbles"]);
        assert!(args.config.is_none());
        assert!(!args.verbose);
        match args.command {
            Command::Make {
                topic,
                style,
                ratio,
                output,
                skip_scenes,
                images_only,
                assets,
            } => {
                assert_eq!(topic, "a dragon who breathes bubbles");
                assert!(style.is_none());
                assert!(ratio.is_none());
                assert!(output.is_none());
                assert!(skip_scenes.is_empty());
                assert!(!images_only);
                assert!(!assets);
            }
            other => panic!("Expected Make, got {:?}", other),
        }
    }

    #[test]
    fn test_make_options() {
        let args = Args::parse_from([
            "dreamtales",
            "make",
            "moon bunny",
            "--style",
            "ghibli",
            "-r",
            "9:16",
            "--skip-scene",
            "2",
            "--skip-scene",
            "4",
            "--assets",
        ]);
        match args.command {
            Command::Make {
                style,
                ratio,
                skip_scenes,
                assets,
                ..
            } => {
                assert_eq!(style, Some(StyleArg::Anime));
                assert_eq!(ratio, Some(RatioArg::Portrait));
                assert_eq!(skip_scenes, vec![2, 4]);
                assert!(assets);
            }
            other => panic!("Expected Make, got {:?}", other),
        }
    }

    #[test]
    fn test_stitch_requires_clips() {
        assert!(Args::try_parse_from(["dreamtales", "stitch"]).is_err());

        let args = Args::parse_from(["dreamtales", "stitch", "a.mp4", "b.mp4", "--ratio", "1:1"]);
        match args.command {
            Command::Stitch {
                clips,
                ratio,
                output,
                title,
            } => {
                assert_eq!(clips, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
                assert_eq!(ratio, RatioArg::Square);
                assert_eq!(output, PathBuf::from("."));
                assert_eq!(title, "stitched");
            }
            other => panic!("Expected Stitch, got {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["dreamtales", "login", "--verbose", "-c", "/tmp/c.toml"]);
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(args.command, Command::Login));
    }

    #[test]
    fn test_config_subcommands() {
        let args = Args::parse_from(["dreamtales", "config", "show"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));

        let args = Args::parse_from(["dreamtales", "config", "init"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Init
            }
        ));
    }

    #[test]
    fn test_outline_json_flag() {
        let args = Args::parse_from(["dreamtales", "outline", "bees", "--json"]);
        assert!(matches!(args.command, Command::Outline { json: true, .. }));
    }
}
