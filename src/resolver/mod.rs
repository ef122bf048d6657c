//! Turning search terms and URLs into playable resources.
//!
//! The [`Resolver`] trait is the seam between the playback core and whatever
//! knows where audio lives. Production code plugs in a network-backed
//! implementation; the bundled [`CatalogResolver`] serves a fixed catalog,
//! and tests substitute mocks.
//!
//! # Example
//!
//! ```ignore
//! use jukebox::resolver::{OpenOptions, Resolver};
//!
//! let track = resolver.lookup("africa toto").await?;
//! let resource = resolver.open(&track.source_ref, &OpenOptions::default())?;
//! ```

mod catalog;

pub use catalog::{CatalogResolver, CatalogTrack};

use std::time::Duration;

use async_trait::async_trait;

use crate::player::AudioResource;

/// What a lookup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    /// Stable reference used to (re)open the audio
    pub source_ref: String,
    /// Display title
    pub title: String,
    /// Human-facing link, if any
    pub page_url: Option<String>,
    /// Track length, if known
    pub duration: Option<Duration>,
}

/// Options for materialising a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    /// Offset into the track to start from
    pub start_at: Duration,
}

impl OpenOptions {
    pub fn at(start_at: Duration) -> Self {
        Self { start_at }
    }
}

/// Resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No result found for {0:?}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cannot open {source_ref}: {message}")]
    Open { source_ref: String, message: String },
}

/// Resolves queries and materialises single-use audio resources.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Find the best match for a search term or URL. May be slow.
    async fn lookup(&self, query: &str) -> Result<ResolvedTrack, ResolveError>;

    /// Open a fresh resource for a previously resolved `source_ref`.
    fn open(&self, source_ref: &str, options: &OpenOptions) -> Result<AudioResource, ResolveError>;
}
