//! Jukebox - per-session music playback queues.
//!
//! Each session (a guild, a room, a party) owns a queue of requested
//! tracks, a current slot and a loop mode, and drives one audio output.
//! Requests and queue edits can arrive from any thread while the output
//! reports track completions from its own.

pub mod cli;
pub mod config;
pub mod error;
pub mod player;
pub mod resolver;
#[cfg(test)]
pub mod test_utils;
pub mod timestamp;
