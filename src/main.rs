// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pose2bvh::config::{Config, DEFAULT_CONFIG_FILE};
use pose2bvh::pipeline::{self, ConvertOptions, StitchOptions};
use pose2bvh::skeleton::ModelVariant;
use pose2bvh::smoothing::{Smoothing, SmoothingMethod};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "pose2bvh")]
#[command(about = "Convert 3D pose keypoints into BVH skeletal animation")]
#[command(version)]
struct Cli {
    /// Log at DEBUG level
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a keypoint JSON file into one BVH per subject.
    Convert {
        #[arg(long = "input_json_path")]
        input_json_path: PathBuf,

        #[arg(long = "output_dir")]
        output_dir: PathBuf,

        /// lightweight19 or videopose17
        #[arg(long, default_value = "lightweight19")]
        variant: ModelVariant,

        /// Base name for output files, derived from the input name if absent
        #[arg(long = "video_filename_base")]
        video_filename_base: Option<String>,

        /// none, moving_average, savgol or one_euro; overrides the config file
        #[arg(long)]
        smoothing: Option<SmoothingMethod>,

        /// Also write the motion channels as CSV
        #[arg(long)]
        csv: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Stitch per-chunk VideoPose3D predictions and convert the result.
    Stitch {
        #[arg(long = "chunk_dir")]
        chunk_dir: PathBuf,

        #[arg(long = "video_filename_base")]
        video_filename_base: String,

        /// Total frame count; inferred from the chunks if absent
        #[arg(long = "video_length")]
        video_length: Option<usize>,

        /// Defaults to the chunk directory
        #[arg(long = "output_dir")]
        output_dir: Option<PathBuf>,

        #[arg(long = "chunk_size")]
        chunk_size: Option<usize>,

        #[arg(long = "overlap_size")]
        overlap_size: Option<usize>,

        #[arg(long)]
        csv: bool,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the configured model stages, then stitch their output.
    Run {
        #[arg(long)]
        config: PathBuf,

        #[arg(long = "video_filename_base")]
        video_filename_base: String,

        #[arg(long = "chunk_dir")]
        chunk_dir: PathBuf,

        #[arg(long = "video_length")]
        video_length: Option<usize>,

        #[arg(long = "output_dir")]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        csv: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Config::load_or_default(DEFAULT_CONFIG_FILE)
            .context("Failed to load default config"),
    }
}

fn stitch(options: &StitchOptions) -> Result<()> {
    let outputs = pipeline::stitch_directory(options).with_context(|| {
        format!(
            "Failed to stitch chunks in {}",
            options.chunk_dir.display()
        )
    })?;
    info!(path = %outputs.stitched_json.display(), "stitched");
    for path in &outputs.bvh_files {
        println!("{}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Convert {
            input_json_path,
            output_dir,
            variant,
            video_filename_base,
            smoothing,
            csv,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(method) = smoothing {
                config.smoothing.method = method;
            }
            let options = ConvertOptions {
                variant,
                output_dir,
                video_filename_base,
                smoothing: Smoothing::from_config(&config.smoothing),
                write_csv: csv,
            };
            let written = pipeline::convert_file(&input_json_path, &options)
                .with_context(|| format!("Failed to convert {}", input_json_path.display()))?;
            for path in written {
                println!("{}", path.display());
            }
            Ok(())
        }

        Commands::Stitch {
            chunk_dir,
            video_filename_base,
            video_length,
            output_dir,
            chunk_size,
            overlap_size,
            csv,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mut params = config.stitch.params();
            params.chunk_size = chunk_size.unwrap_or(params.chunk_size);
            params.overlap_size = overlap_size.unwrap_or(params.overlap_size);

            stitch(&StitchOptions {
                output_dir: output_dir.unwrap_or_else(|| chunk_dir.clone()),
                chunk_dir,
                video_filename_base,
                video_length,
                params,
                write_csv: csv,
            })
        }

        Commands::Run {
            config,
            video_filename_base,
            chunk_dir,
            video_length,
            output_dir,
            csv,
        } => {
            let config = load_config(Some(config.as_path()))?;
            std::fs::create_dir_all(&chunk_dir)
                .with_context(|| format!("Failed to create {}", chunk_dir.display()))?;
            pipeline::run_stages(&config, &chunk_dir, &video_filename_base)
                .context("Pipeline stage failed")?;

            stitch(&StitchOptions {
                output_dir: output_dir.unwrap_or_else(|| chunk_dir.clone()),
                chunk_dir,
                video_filename_base,
                video_length,
                params: config.stitch.params(),
                write_csv: csv,
            })
        }
    }
}
