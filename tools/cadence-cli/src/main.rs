//! Cadence CLI: audio-driven video timing and assembly.
//!
//! Usage:
//!   cadence distribute --total <SECS> --count <N>   Split a duration into scenes
//!   cadence validate <TIMELINE>                     Check a timeline for gaps and overlaps
//!   cadence repair <TIMELINE>                       Repair a timeline and print it
//!   cadence recommend --video <SECS> --audio <SECS> Suggest a sync strategy
//!   cadence probe <LOCATOR>...                      Print media durations
//!   cadence assemble <JOB>                          Run an assembly job
//!   cadence preview <JOB>                           Render a short low-cost preview
//!   cadence check                                   Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cadence_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "cadence",
    about = "Fit video segments to a narration track",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/cadence/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a total duration into scene durations
    Distribute {
        /// Total duration in seconds
        #[arg(long)]
        total: f64,

        /// Number of scenes (ignored with --weights)
        #[arg(long, default_value = "1")]
        count: usize,

        /// Minimum scene duration in seconds
        #[arg(long)]
        min: Option<f64>,

        /// Maximum scene duration in seconds
        #[arg(long)]
        max: Option<f64>,

        /// Comma-separated relative weights, one per scene
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,

        /// Report deficits and surpluses against an even split
        #[arg(long)]
        track: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check a timeline JSON file for gaps and overlaps
    Validate {
        /// Path to a JSON array of scenes
        path: PathBuf,
    },

    /// Repair a timeline JSON file
    Repair {
        /// Path to a JSON array of scenes
        path: PathBuf,

        /// Rescale the repaired timeline to this total (seconds)
        #[arg(long)]
        target: Option<f64>,

        /// Minimum scene duration after gap repair
        #[arg(long)]
        min_duration: Option<f64>,

        /// Write the repaired timeline here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Suggest how to reconcile video and audio durations
    Recommend {
        /// Video duration in seconds
        #[arg(long)]
        video: f64,

        /// Audio duration in seconds
        #[arg(long)]
        audio: f64,
    },

    /// Print the duration of one or more media files or URLs
    Probe {
        #[arg(required = true)]
        locators: Vec<String>,
    },

    /// Run an assembly job described by a JSON request
    Assemble {
        /// Path to the job request JSON
        path: PathBuf,

        /// Directory that published outputs are copied into
        #[arg(long, default_value = "published")]
        publish_root: PathBuf,
    },

    /// Render a short preview of an assembly job
    Preview {
        /// Path to the job request JSON
        path: PathBuf,

        /// Preview length in seconds
        #[arg(long, default_value = "10")]
        seconds: f64,

        /// Preview quality: low, medium or high
        #[arg(long, default_value = "low")]
        quality: String,

        /// Full-length output path; the preview is written beside it
        #[arg(short, long, default_value = "preview.mp4")]
        output: PathBuf,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    cadence_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Distribute {
            total,
            count,
            min,
            max,
            weights,
            track,
            json,
        } => commands::distribute::run(&config, total, count, min, max, weights, track, json),
        Commands::Validate { path } => commands::validate::run(&config, path),
        Commands::Repair {
            path,
            target,
            min_duration,
            output,
        } => commands::repair::run(&config, path, target, min_duration, output),
        Commands::Recommend { video, audio } => commands::recommend::run(&config, video, audio),
        Commands::Probe { locators } => commands::probe::run(&config, locators).await,
        Commands::Assemble { path, publish_root } => {
            commands::assemble::run(&config, path, publish_root).await
        }
        Commands::Preview {
            path,
            seconds,
            quality,
            output,
        } => commands::preview::run(&config, path, seconds, quality, output).await,
        Commands::Check => commands::check::run(&config),
    }
}
