//! Jukebox command-line front end.
//!
//! Plays catalog tracks through a simulated output, and exposes the
//! timestamp parser and config file for inspection.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use jukebox::{cli, config};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // The filter may come from the file, so a bad file is only reported
    // once the subscriber below is installed.
    let (config, config_error) = match config::load() {
        Ok(config) => (config, None),
        Err(e) => (config::Config::default(), Some(e)),
    };

    // RUST_LOG wins over the config file
    let default_filter = config
        .log_filter
        .clone()
        .unwrap_or_else(|| "jukebox=info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_filter))
        .unwrap_or_else(|_| EnvFilter::new("jukebox=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Ignoring unusable config file; using defaults");
    }

    cli::run_command(&args, &config)
}
