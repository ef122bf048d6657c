//! Command-line interface for jukebox.
//!
//! Drives a single playback session against a local catalog, plus a few
//! inspection commands.

mod commands;

pub use commands::{Cli, Commands, run_command};
