//! CLI command definitions and dispatch.
//!
//! Each subcommand lives in its own submodule:
//! - `play`: resolve queries and play them through a simulated output
//! - `catalog`: list the tracks a catalog file offers
//! - `time`: check how a timestamp string parses
//! - `settings`: show or initialise the config file

mod catalog;
mod play;
mod settings;
mod time;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use crate::config::Config;

pub use catalog::cmd_catalog;
pub use play::{PlayOptions, cmd_play};
pub use settings::cmd_config;
pub use time::cmd_parse_time;

/// Jukebox CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Queue tracks from the catalog and play them
    Play {
        /// Search terms or source refs, one per track
        #[arg(required = true)]
        queries: Vec<String>,
        /// Catalog file (defaults to [catalog] path in the config)
        #[arg(short, long, env = "JUKEBOX_CATALOG")]
        catalog: Option<PathBuf>,
        /// Repeat the whole queue
        #[arg(long, conflicts_with = "loop_track")]
        loop_queue: bool,
        /// Repeat the first track
        #[arg(long)]
        loop_track: bool,
        /// Shuffle the queue after adding everything
        #[arg(long)]
        shuffle: bool,
        /// Playback speed-up factor for the simulated output
        #[arg(long)]
        time_scale: Option<f64>,
    },
    /// List the tracks in a catalog
    Catalog {
        /// Catalog file (defaults to [catalog] path in the config)
        #[arg(short, long, env = "JUKEBOX_CATALOG")]
        catalog: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a timestamp the way `seek` does
    ParseTime {
        /// e.g. "1:30", "90", "1m30s"
        timestamp: String,
    },
    /// Show the config file location and effective settings
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Play {
            queries,
            catalog,
            loop_queue,
            loop_track,
            shuffle,
            time_scale,
        } => {
            let rt = Runtime::new()?;
            let catalog = catalog_path(catalog.as_deref(), config)?;
            let options = PlayOptions {
                loop_queue: *loop_queue,
                loop_track: *loop_track,
                shuffle: *shuffle,
                time_scale: *time_scale,
            };
            cmd_play(&rt, config, &catalog, queries, &options)
        }
        Commands::Catalog { catalog, json } => {
            let catalog = catalog_path(catalog.as_deref(), config)?;
            cmd_catalog(&catalog, *json)
        }
        Commands::ParseTime { timestamp } => cmd_parse_time(timestamp),
        Commands::Config { init } => cmd_config(config, *init),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// The catalog given on the command line, else the configured one.
fn catalog_path(arg: Option<&Path>, config: &Config) -> anyhow::Result<PathBuf> {
    arg.map(Path::to_path_buf)
        .or_else(|| config.catalog.path.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No catalog given; pass --catalog or set [catalog] path in the config")
        })
}
