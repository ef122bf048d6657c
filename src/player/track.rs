//! Queue records and the single-use audio handles they carry.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a queue entry.
///
/// Positions shift whenever the queue is mutated; the id does not. It is
/// what lets `skip_to` follow "the entry that was at position N".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whoever asked for a track to be queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requester {
    pub id: u64,
    pub name: String,
}

impl Requester {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// An opaque, single-use playable handle.
///
/// Not `Clone`: an output consumes it by value, so a resource can never be
/// handed out twice. Repositioning means opening a fresh one.
#[derive(Debug)]
pub struct AudioResource {
    source_ref: String,
    start_at: Duration,
    duration: Option<Duration>,
}

impl AudioResource {
    /// Create a resource for `source_ref` starting `start_at` into the track.
    pub fn new(source_ref: impl Into<String>, start_at: Duration) -> Self {
        Self {
            source_ref: source_ref.into(),
            start_at,
            duration: None,
        }
    }

    /// Attach the full track length, if the backend knows it.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn start_at(&self) -> Duration {
        self.start_at
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Time left to play from the start offset, if the length is known.
    pub fn remaining(&self) -> Option<Duration> {
        self.duration.map(|d| d.saturating_sub(self.start_at))
    }
}

/// A queued track.
///
/// Everything except the resource is fixed at creation. The resource is
/// materialised lazily and taken exactly once when the entry starts playing.
#[derive(Debug)]
pub struct TrackEntry {
    id: EntryId,
    requester: Requester,
    source_ref: String,
    title: String,
    resource: Option<AudioResource>,
}

impl TrackEntry {
    /// Create an entry whose resource will be opened when it first plays.
    pub fn new(requester: Requester, source_ref: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: EntryId::next(),
            requester,
            source_ref: source_ref.into(),
            title: title.into(),
            resource: None,
        }
    }

    /// Create an entry that already owns a materialised resource.
    pub fn with_resource(
        requester: Requester,
        source_ref: impl Into<String>,
        title: impl Into<String>,
        resource: AudioResource,
    ) -> Self {
        Self {
            resource: Some(resource),
            ..Self::new(requester, source_ref, title)
        }
    }

    /// A new entry for the same track, with its own id and resource.
    pub fn replay_with(&self, resource: AudioResource) -> Self {
        Self::with_resource(
            self.requester.clone(),
            self.source_ref.clone(),
            self.title.clone(),
            resource,
        )
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Whether a resource has been materialised and not yet consumed.
    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    /// Take the resource for playback, leaving the entry without one.
    pub fn take_resource(&mut self) -> Option<AudioResource> {
        self.resource.take()
    }
}
