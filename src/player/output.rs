//! The audio sink abstraction a session drives.
//!
//! An output plays one [`AudioResource`] at a time. Every successful
//! [`OutputChannel::start`] is paired with exactly one invocation of the
//! completion callback handed to it: either when the track runs out or when
//! [`OutputChannel::stop`] cuts it short. The callback may run on any thread,
//! including synchronously from inside `stop`, so callers must not hold
//! locks the callback needs while calling into the output.

use std::sync::Arc;

use super::registry::SessionKey;
use super::track::AudioResource;

/// Invoked once when a started track ends or is stopped.
pub type CompletionCallback = Box<dyn FnOnce(Option<OutputError>) + Send + 'static>;

/// Output failures. Translated into playback errors at the session boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("Output already has an active track")]
    Busy,

    #[error("Output has been released")]
    Released,

    #[error("Voice transport error: {0}")]
    Transport(String),

    #[error("Cannot play resource: {0}")]
    Unplayable(String),
}

/// A single-track audio sink.
pub trait OutputChannel: Send + Sync {
    /// Begin playing `resource`. `on_complete` fires once when it ends.
    ///
    /// On error the callback is dropped without being called.
    fn start(&self, resource: AudioResource, on_complete: CompletionCallback) -> Result<(), OutputError>;

    /// Stop the active track, if any. Fires its completion callback.
    fn stop(&self);

    fn pause(&self) -> Result<(), OutputError>;

    fn resume(&self) -> Result<(), OutputError>;

    /// A track is loaded and not paused.
    fn is_active(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Tear the output down. Stops anything still playing.
    fn release(&self) {
        self.stop();
    }
}

/// Acquires outputs for sessions.
pub trait OutputFactory: Send + Sync {
    /// Connect an output for `key` to the caller's voice channel.
    fn open(&self, key: &SessionKey, channel: &str) -> Result<Arc<dyn OutputChannel>, OutputError>;
}
