//! imgclass CLI: train, evaluate and try an image classifier.
//!
//! Running with no arguments performs the full sample run: fetch the flower
//! image set, split it, train, evaluate, predict one image, save the model.

mod commands;
mod render;

use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// imgclass: image-classification training on a folder of labelled photos
#[derive(Parser, Debug)]
#[command(name = "imgclass", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Assets root (defaults to ../../../assets next to the executable)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Global random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Proportion of images held out for evaluation
    #[arg(long)]
    test_fraction: Option<f64>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential log output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Download the image set, train, evaluate and save the model (default)
    Train,
    /// Score every image in a folder with a saved model
    Predict {
        /// Folder of images; sub-folder names are shown as the true labels
        dir: PathBuf,
        /// Saved model (defaults to the configured model output path)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
}

/// Install the stderr and JSON-file log layers.
///
/// The returned guard must be held until exit so buffered file lines are
/// flushed, including after a failed run.
fn init_tracing(verbose: u8, quiet: bool) -> WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Progress and warnings go to stderr so the report on stdout stays clean
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // Every run also leaves a debug-level JSON trail (download, split sizes,
    // per-epoch loss) in <data dir>/logs/imgclass.log.<date>
    let log_dir = directories::ProjectDirs::from("dev", "imgclass", "imgclass")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "imgclass.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let _log_guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config =
        imgclass_core::load_config(Some(&workspace), cli.config.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // CLI overrides
    if let Some(assets) = cli.assets {
        config.assets.root = Some(assets);
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(fraction) = cli.test_fraction {
        config.split.test_fraction = fraction;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let assets_root = config.assets.resolve_root()?;
    tracing::debug!(assets = %assets_root.display(), "Resolved assets root");

    match cli.command.unwrap_or(Commands::Train) {
        Commands::Train => commands::train(&config, &assets_root).await,
        Commands::Predict { dir, model } => {
            commands::predict(&config, &assets_root, &dir, model.as_deref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_arguments_means_training_run() {
        let cli = Cli::try_parse_from(["imgclass"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_overrides_and_verbosity() {
        let cli = Cli::try_parse_from([
            "imgclass",
            "--seed",
            "7",
            "--test-fraction",
            "0.3",
            "--assets",
            "/tmp/assets",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.seed, Some(7));
        assert_eq!(cli.test_fraction, Some(0.3));
        assert_eq!(cli.assets, Some(PathBuf::from("/tmp/assets")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_predict_subcommand() {
        let cli =
            Cli::try_parse_from(["imgclass", "predict", "photos", "--model", "m.zip"]).unwrap();
        match cli.command {
            Some(Commands::Predict { dir, model }) => {
                assert_eq!(dir, PathBuf::from("photos"));
                assert_eq!(model, Some(PathBuf::from("m.zip")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_numeric_seed() {
        assert!(Cli::try_parse_from(["imgclass", "--seed", "abc"]).is_err());
    }
}
