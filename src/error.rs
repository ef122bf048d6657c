//! Crate-wide error types.
//!
//! The playback core reports [`PlaybackError`], a small set of
//! caller-recoverable kinds. Everything around it (configuration, catalog
//! files, the CLI) reports [`Error`], which wraps those kinds alongside I/O
//! and parse failures. The binary uses `anyhow` on top.
//!
//! # Example
//!
//! ```ignore
//! use jukebox::error::{Error, Result, ResultExt};
//!
//! fn load_catalog(path: &Path) -> Result<CatalogResolver> {
//!     let text = std::fs::read_to_string(path).with_context("reading catalog")?;
//!     CatalogResolver::from_toml(&text)
//! }
//! ```

use crate::player::PlaybackError;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A playback operation was rejected
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Catalog file could not be parsed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Unusable config file
    #[error("Config error: {0}")]
    Config(String),

    /// Another error, annotated with what was being attempted
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap with a description of the operation that failed.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Attach a description of what was being attempted to any error that
/// converts into [`Error`].
pub trait ResultExt<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}
