//! Session snapshots and event types handed to the presentation layer.

use std::time::Duration;

use serde::Serialize;

use super::queue::LoopMode;
use super::track::{EntryId, Requester, TrackEntry};

/// Current playback status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    /// The session was disconnected and must be recreated.
    Closed,
}

/// One pending queue entry as seen by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSlot {
    /// 1-based position at the time of the snapshot
    pub position: usize,
    pub entry: EntryId,
    pub title: String,
    pub source_ref: String,
    pub requester: String,
}

impl QueueSlot {
    pub(crate) fn from_entry(position: usize, entry: &TrackEntry) -> Self {
        Self {
            position,
            entry: entry.id(),
            title: entry.title().to_string(),
            source_ref: entry.source_ref().to_string(),
            requester: entry.requester().name.clone(),
        }
    }
}

/// The track in the current slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub entry: EntryId,
    pub title: String,
    pub source_ref: String,
    pub requester: Requester,
    pub loop_mode: LoopMode,
}

impl NowPlaying {
    pub(crate) fn from_entry(entry: &TrackEntry, loop_mode: LoopMode) -> Self {
        Self {
            entry: entry.id(),
            title: entry.title().to_string(),
            source_ref: entry.source_ref().to_string(),
            requester: entry.requester().clone(),
            loop_mode,
        }
    }
}

/// Result of queueing a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The session was idle and the track started immediately.
    NowPlaying { title: String },
    /// The track was queued at this 1-based position.
    Queued { title: String, position: usize },
}

impl EnqueueOutcome {
    pub fn title(&self) -> &str {
        match self {
            EnqueueOutcome::NowPlaying { title } | EnqueueOutcome::Queued { title, .. } => title,
        }
    }
}

/// Notifications broadcast by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A track was handed to the output.
    NowPlaying { entry: EntryId, title: String },
    /// The queue ran dry.
    Idle,
    /// Starting a track failed and the session fell back to idle.
    StartFailed { title: String, reason: String },
    /// The session was torn down.
    Disconnected,
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn test_enqueue_outcome_title() {
        let queued = EnqueueOutcome::Queued {
            title: "B".into(),
            position: 2,
        };
        assert_eq!(queued.title(), "B");
        assert_eq!(EnqueueOutcome::NowPlaying { title: "A".into() }.title(), "A");
    }

    #[test]
    fn test_slot_serializes() {
        let entry = TrackEntry::new(Requester::new(3, "cy"), "url://a", "A");
        let slot = QueueSlot::from_entry(1, &entry);
        let json = serde_json::to_string(&slot).unwrap();
        assert!(json.contains("\"position\":1"));
        assert!(json.contains("\"requester\":\"cy\""));
    }
}
