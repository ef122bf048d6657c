//! Per-session playback control.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 SessionRegistry (one per process)               │
//! │          session key ──► PlaybackSession (created lazily)       │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ control operations (any thread)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  PlaybackSession (state machine)                │
//! │   queue + current slot + loop mode behind one mutex per session │
//! └────────────────────────────┬────────────────────────────────────┘
//!                  start/stop  │  ▲ completion callback (own thread)
//!                              ▼  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  OutputChannel (voice transport)                │
//! │                 plays one AudioResource at a time               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State transitions happen under the session lock; calls into the output
//! happen after the lock is released.

mod output;
mod queue;
mod registry;
mod session;
mod simulated;
mod state;
mod track;

pub use output::{CompletionCallback, OutputChannel, OutputError, OutputFactory};
pub use queue::{LoopMode, PlayQueue};
pub use registry::{SessionKey, SessionRegistry};
pub use session::{PlaybackSession, Requested, SessionSettings};
pub use simulated::{SimulatedOutput, SimulatedOutputFactory};
pub use state::{
    EnqueueOutcome, NowPlaying, PlaybackStatus, QueueSlot, SessionEvent, format_duration,
};
pub use track::{AudioResource, EntryId, Requester, TrackEntry};

use crate::resolver::ResolveError;

/// Errors returned by playback operations.
///
/// Every variant is recoverable: the session stays usable after any of them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Not connected to a voice channel")]
    NotInVoiceContext,

    #[error("Nothing is playing")]
    NothingPlaying,

    #[error("Playback is not paused")]
    NotPaused,

    #[error("Invalid position {position} (queue has {len} entries)")]
    InvalidIndex { position: usize, len: usize },

    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("No result found: {0}")]
    ResolutionFailure(String),

    #[error("Queue is empty")]
    QueueEmpty,
}

impl From<ResolveError> for PlaybackError {
    fn from(err: ResolveError) -> Self {
        PlaybackError::ResolutionFailure(err.to_string())
    }
}

impl From<OutputError> for PlaybackError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Released | OutputError::Transport(_) => PlaybackError::NotInVoiceContext,
            OutputError::Busy | OutputError::Unplayable(_) => {
                PlaybackError::ResolutionFailure(err.to_string())
            }
        }
    }
}
