//! Subcommand handlers.
//!
//! Each handler returns `Result<(), String>`; `main` prints the error and
//! exits non-zero.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::args::ConfigAction;
use crate::config::{default_path, Config};
use crate::gemini::{CredentialProvider, EnvCredentials, GeminiClient, GeminiError};
use crate::generation::StoryBackend;
use crate::media::{ArtStyle, AspectRatio, VideoResource};
use crate::orchestrator::{AppError, BatchOutcome, Orchestrator};
use crate::scene::SceneId;
use crate::stitch::{stitch_with_canvas, CanvasSize, FfmpegBackend, MediaBackend};

const MISSING_KEY_HELP: &str = "GEMINI_API_KEY environment variable is not set.\n\n\
    Add your API key to a .env file:\n\
        echo 'GEMINI_API_KEY=your-api-key-here' >> .env\n\n\
    Or set it as an environment variable:\n\
        export GEMINI_API_KEY=\"your-api-key-here\"\n\n\
    Get an API key at: https://aistudio.google.com/apikey";

/// Options for `make`, already merged with the config file.
#[derive(Debug, Clone)]
pub struct MakeOptions {
    pub topic: String,
    pub style: ArtStyle,
    pub ratio: AspectRatio,
    pub output: PathBuf,
    /// 1-based positions left out of the movie.
    pub skip_scenes: Vec<usize>,
    pub images_only: bool,
    pub assets: bool,
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to create async runtime: {}", e))
}

fn flush() {
    std::io::stdout().flush().ok();
}

/// Environment credentials, re-reading `.env` once if nothing is set yet.
fn env_credentials() -> Result<Arc<EnvCredentials>, String> {
    let credentials = Arc::new(EnvCredentials::new());
    if !credentials.has_credential() {
        credentials
            .select_credential()
            .map_err(|e| e.to_string())?;
    }
    if !credentials.has_credential() {
        return Err(MISSING_KEY_HELP.to_string());
    }
    Ok(credentials)
}

fn gemini_client(config: &Config, credentials: Arc<EnvCredentials>) -> Result<GeminiClient, String> {
    GeminiClient::from_config(&config.gemini, credentials).map_err(|e| match e {
        GeminiError::MissingApiKey => MISSING_KEY_HELP.to_string(),
        _ => format!("Failed to create Gemini client: {}", e),
    })
}

fn report_batch(kind: &str, outcome: &BatchOutcome) {
    println!(
        "  {} generated: {}/{}",
        kind,
        outcome.completed.len(),
        outcome.started()
    );
    for (id, message) in &outcome.failed {
        eprintln!("    {} failed: {}", id, message);
    }
}

/// Run the whole workflow for one topic.
pub fn run_make(config: &Config, options: MakeOptions) -> Result<(), String> {
    let credentials = env_credentials()?;
    let client = gemini_client(config, credentials.clone())?;
    let media = if options.images_only {
        FfmpegBackend::with_encoders(Vec::<String>::new())
    } else {
        FfmpegBackend::detect().map_err(|e| e.to_string())?
    };

    let mut app = Orchestrator::new(client, credentials, media)
        .with_stitch_settings(config.export.stitch_settings());
    app.set_style(options.style);
    app.set_aspect_ratio(options.ratio);

    let rt = runtime()?;
    rt.block_on(async {
        print!("Writing story... ");
        flush();
        app.generate_story(&options.topic)
            .await
            .map_err(|e| format!("Failed to generate story: {}", e))?;
        println!("done");
        println!();
        println!("{}", app.title());
        for (index, scene) in app.scenes().iter().enumerate() {
            println!("  {}. {}", index + 1, scene.story_text);
        }
        println!();

        let ids: Vec<SceneId> = app.scenes().iter().map(|s| s.id()).collect();
        for position in &options.skip_scenes {
            match position.checked_sub(1).and_then(|i| ids.get(i)) {
                Some(id) => {
                    app.toggle_selected(*id).map_err(|e| e.to_string())?;
                }
                None => log::warn!("No scene {} to skip", position),
            }
        }

        println!(
            "Illustrating {} scenes ({}, {})...",
            ids.len(),
            app.style().label(),
            app.aspect_ratio()
        );
        let outcome = app.generate_all_images().await;
        report_batch("Images", &outcome);
        if outcome.deauthorized {
            return Err(AppError::Deauthorized.to_string());
        }

        if options.images_only {
            if options.assets {
                write_assets(&app, &options.output)?;
            }
            return Ok(());
        }

        println!("Animating scenes (this can take several minutes)...");
        let outcome = app.generate_all_videos().await.map_err(|e| e.to_string())?;
        report_batch("Clips", &outcome);
        if outcome.deauthorized {
            return Err(AppError::Deauthorized.to_string());
        }

        print!("Stitching movie... ");
        flush();
        let path = app
            .export_movie(&options.output, |percent| {
                print!("{}% ", percent);
                flush();
            })
            .await
            .map_err(|e| e.to_string())?;
        println!("done");
        println!("  Movie: {}", path.display());

        if options.assets {
            write_assets(&app, &options.output)?;
        }
        Ok(())
    })
}

fn write_assets<B, C, M>(app: &Orchestrator<B, C, M>, dir: &Path) -> Result<(), String>
where
    B: StoryBackend,
    C: CredentialProvider,
    M: MediaBackend,
{
    let written = app
        .download_scene_assets(dir)
        .map_err(|e| format!("Failed to write scene assets: {}", e))?;
    println!("  Assets: {} files in {}", written.len(), dir.display());
    Ok(())
}

/// Print an outline for `topic`.
pub fn run_outline(config: &Config, topic: &str, json: bool) -> Result<(), String> {
    let credentials = env_credentials()?;
    let client = gemini_client(config, credentials)?;

    let rt = runtime()?;
    let outline = rt
        .block_on(client.outline(topic))
        .map_err(|e| format!("Failed to generate story: {}", e))?;

    if json {
        let text = serde_json::to_string_pretty(&outline)
            .map_err(|e| format!("Failed to serialize outline: {}", e))?;
        println!("{}", text);
    } else {
        println!("{}", outline.title);
        println!();
        for (index, scene) in outline.scenes.iter().enumerate() {
            println!("{}. {}", index + 1, scene.story_text);
            println!("   Visual: {}", scene.visual_prompt);
        }
    }
    Ok(())
}

/// Stitch existing clips into one movie.
pub fn run_stitch(
    config: &Config,
    clips: &[PathBuf],
    ratio: AspectRatio,
    output: &Path,
    title: &str,
) -> Result<(), String> {
    for clip in clips {
        if !clip.is_file() {
            return Err(format!("Clip not found: {}", clip.display()));
        }
    }
    let backend = FfmpegBackend::detect().map_err(|e| e.to_string())?;
    let resources: Vec<VideoResource> = clips.iter().map(VideoResource::new).collect();
    let settings = config.export.stitch_settings();

    let rt = runtime()?;
    let movie = rt
        .block_on(stitch_with_canvas(
            &backend,
            &resources,
            CanvasSize::for_ratio(ratio),
            &settings,
            |index, total| {
                println!("  [{}/{}] {}", index + 1, total, clips[index].display());
            },
        ))
        .map_err(|e| AppError::Stitch(e).to_string())?;

    if movie.is_empty() {
        return Err("No frames were recorded".to_string());
    }
    let path = crate::export::write_movie(output, title, &movie)
        .map_err(|e| format!("Failed to write movie: {}", e))?;
    println!("Movie: {} ({})", path.display(), movie.mime_type);
    Ok(())
}

/// Re-read credentials and report whether a key is available.
pub fn run_login() -> Result<(), String> {
    let credentials = EnvCredentials::new();
    credentials.select_credential().map_err(|e| e.to_string())?;
    if credentials.has_credential() {
        println!("API key found.");
        Ok(())
    } else {
        Err(MISSING_KEY_HELP.to_string())
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), String> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(default_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path)).map_err(|e| e.to_string())?;
            let text = config.to_toml().map_err(|e| e.to_string())?;
            println!("{}", text);
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", config_path.display());
            }
        }
        ConfigAction::Init => {
            let written = Config::init(Some(&config_path)).map_err(|e| e.to_string())?;
            if !written {
                return Err(format!(
                    "Config file already exists: {}\nUse 'dreamtales config show' to view current settings.",
                    config_path.display()
                ));
            }
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}
