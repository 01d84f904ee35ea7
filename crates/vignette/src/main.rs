//! Vignette CLI - asynchronous image loading pipeline.
//!
//! Vignette resolves an image from a file or URL, decodes and optionally
//! downsamples it, applies pixel transformations, and writes the result
//! to disk.
//!
//! # Usage
//!
//! ```bash
//! # Fetch, downsample and save an image
//! vignette load https://example.com/photo.jpg --max-width 512 --max-height 512 -o out.png
//!
//! # Local file, grayscale
//! vignette load ./photo.jpg --grayscale -o out.png
//!
//! # View configuration
//! vignette config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Vignette - asynchronous image loading pipeline.
#[derive(Parser, Debug)]
#[command(name = "vignette")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load an image through the pipeline and write it to disk
    Load(cli::load::LoadArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match vignette_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `vignette config path`."
            );
            vignette_core::Config::default()
        }
    };
    logging::init(&config.logging, cli.verbose, cli.json_logs);

    tracing::debug!("Vignette v{}", vignette_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Load(args) => cli::load::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
