//! A resolver backed by a fixed, TOML-described catalog.
//!
//! Catalog files look like:
//!
//! ```toml
//! [[tracks]]
//! title = "Africa"
//! artist = "Toto"
//! source_ref = "sim://toto/africa"
//! page_url = "https://example.com/watch?v=africa"
//! duration_secs = 295
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{OpenOptions, ResolveError, ResolvedTrack, Resolver};
use crate::error::{Error, Result, ResultExt};
use crate::player::AudioResource;

/// One catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub source_ref: String,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

impl CatalogTrack {
    /// "Artist - Title", or just the title.
    pub fn display_title(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    fn matches_terms(&self, terms: &[String]) -> bool {
        let haystack = self.display_title().to_lowercase();
        terms.iter().all(|t| haystack.contains(t.as_str()))
    }

    fn resolved(&self) -> ResolvedTrack {
        ResolvedTrack {
            source_ref: self.source_ref.clone(),
            title: self.display_title(),
            page_url: self.page_url.clone(),
            duration: self.duration(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    tracks: Vec<CatalogTrack>,
}

/// Serves lookups from an in-memory track list.
#[derive(Debug, Clone, Default)]
pub struct CatalogResolver {
    tracks: Vec<CatalogTrack>,
}

impl CatalogResolver {
    pub fn new(tracks: Vec<CatalogTrack>) -> Self {
        Self { tracks }
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(contents).map_err(|e| Error::catalog(e.to_string()))?;
        Ok(Self::new(file.tracks))
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(format!("reading catalog {}", path.display()))?;
        let resolver =
            Self::from_toml(&contents).with_context(format!("parsing catalog {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            tracks = resolver.tracks.len(),
            "Loaded catalog"
        );
        Ok(resolver)
    }

    pub fn tracks(&self) -> &[CatalogTrack] {
        &self.tracks
    }

    fn find_by_ref(&self, source_ref: &str) -> Option<&CatalogTrack> {
        self.tracks.iter().find(|t| t.source_ref == source_ref)
    }

    /// Exact reference/URL match first, then every search term must
    /// appear in "artist - title".
    fn search(&self, query: &str) -> Option<&CatalogTrack> {
        let query = query.trim();
        if let Some(track) = self
            .tracks
            .iter()
            .find(|t| t.source_ref == query || t.page_url.as_deref() == Some(query))
        {
            return Some(track);
        }

        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return None;
        }
        self.tracks.iter().find(|t| t.matches_terms(&terms))
    }
}

#[async_trait]
impl Resolver for CatalogResolver {
    async fn lookup(&self, query: &str) -> std::result::Result<ResolvedTrack, ResolveError> {
        let track = self
            .search(query)
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;
        tracing::debug!(query, source_ref = %track.source_ref, "Catalog match");
        Ok(track.resolved())
    }

    fn open(
        &self,
        source_ref: &str,
        options: &OpenOptions,
    ) -> std::result::Result<AudioResource, ResolveError> {
        let track = self.find_by_ref(source_ref).ok_or_else(|| ResolveError::Open {
            source_ref: source_ref.to_string(),
            message: "not in catalog".to_string(),
        })?;

        let resource = AudioResource::new(source_ref, options.start_at);
        match track.duration() {
            Some(length) if options.start_at >= length => Err(ResolveError::Open {
                source_ref: source_ref.to_string(),
                message: format!(
                    "offset {}s is past the end of the track",
                    options.start_at.as_secs()
                ),
            }),
            Some(length) => Ok(resource.with_duration(length)),
            None => Ok(resource),
        }
    }
}
