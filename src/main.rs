use clap::Parser;
use dreamtales::cli::{
    handle_config_action, run_login, run_make, run_outline, run_stitch, Args, Command, MakeOptions,
};
use dreamtales::config::Config;
use dreamtales::gemini::{FALLBACK_API_KEY_ENV, GEMINI_API_KEY_ENV};
use dreamtales::media::{ArtStyle, AspectRatio};
use tracing_subscriber::EnvFilter;

/// Load .env file and check for an API key
///
/// Does not override existing environment variables.
/// Prints a warning if neither GEMINI_API_KEY nor API_KEY is set.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();

    if std::env::var(GEMINI_API_KEY_ENV).is_err() && std::env::var(FALLBACK_API_KEY_ENV).is_err() {
        eprintln!("Warning: {} environment variable not set.", GEMINI_API_KEY_ENV);
        eprintln!("         Story, image and video generation will be unavailable.");
        eprintln!(
            "         Set {} in .env or environment to enable.\n",
            GEMINI_API_KEY_ENV
        );
    }
}

/// Route log output through tracing-subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "dreamtales=debug" } else { "dreamtales=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_on_error(result: Result<(), String>) {
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = args.config.as_deref();
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

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
            // CLI flag > config > default
            let options = MakeOptions {
                topic,
                style: style.map(ArtStyle::from).unwrap_or(config.story.style),
                ratio: ratio.map(AspectRatio::from).unwrap_or(config.story.aspect_ratio),
                output: output.unwrap_or_else(|| config.export.output_dir()),
                skip_scenes,
                images_only,
                assets,
            };
            exit_on_error(run_make(&config, options));
        }
        Command::Outline { topic, json } => {
            exit_on_error(run_outline(&config, &topic, json));
        }
        Command::Stitch {
            clips,
            ratio,
            output,
            title,
        } => {
            exit_on_error(run_stitch(
                &config,
                &clips,
                AspectRatio::from(ratio),
                &output,
                &title,
            ));
        }
        Command::Login => {
            exit_on_error(run_login());
        }
        Command::Config { action } => {
            exit_on_error(handle_config_action(action, config_path));
        }
    }
}
