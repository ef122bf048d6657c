//! Pending-track queue management.
//!
//! Positions handed to and accepted from callers are 1-based and always
//! describe the queue as it is at the moment of the call. The queue holds
//! only *pending* entries; the track being played lives in the session's
//! current slot.

use std::collections::{HashSet, VecDeque};

use rand::seq::SliceRandom;

use super::PlaybackError;
use super::state::QueueSlot;
use super::track::{EntryId, TrackEntry};

/// Repeat behaviour applied when the current track ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Off,
    /// Replay the current track
    RepeatCurrent,
    /// Send finished tracks to the back of the queue
    RepeatQueue,
}

impl LoopMode {
    /// Short label for display.
    pub fn label(self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::RepeatCurrent => "track",
            LoopMode::RepeatQueue => "queue",
        }
    }
}

/// Ordered sequence of pending entries.
#[derive(Debug, Default)]
pub struct PlayQueue {
    items: VecDeque<TrackEntry>,
}

impl PlayQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get queue length.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate entries in play order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackEntry> {
        self.items.iter()
    }

    /// Entry at a 1-based position.
    pub fn get(&self, position: usize) -> Option<&TrackEntry> {
        position.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Add an entry at the tail. Returns its 1-based position.
    pub fn push_back(&mut self, entry: TrackEntry) -> usize {
        self.items.push_back(entry);
        self.items.len()
    }

    /// Add an entry at position 1.
    pub fn push_front(&mut self, entry: TrackEntry) -> usize {
        self.items.push_front(entry);
        1
    }

    /// Take the head entry.
    pub fn pop_front(&mut self) -> Option<TrackEntry> {
        self.items.pop_front()
    }

    /// Remove the entry at a 1-based position.
    pub fn remove(&mut self, position: usize) -> Result<TrackEntry, PlaybackError> {
        let index = self.index_of_position(position)?;
        self.items
            .remove(index)
            .ok_or(PlaybackError::InvalidIndex {
                position,
                len: self.items.len(),
            })
    }

    /// Move the entry at `from` so that it ends up at `to` (default 1).
    ///
    /// Both positions must lie in `[1, len]`. Returns the final position.
    pub fn move_entry(&mut self, from: usize, to: Option<usize>) -> Result<usize, PlaybackError> {
        let to = to.unwrap_or(1);
        let from_index = self.index_of_position(from)?;
        let to_index = self.index_of_position(to)?;
        if from_index != to_index
            && let Some(entry) = self.items.remove(from_index)
        {
            self.items.insert(to_index, entry);
        }
        Ok(to)
    }

    /// Current 1-based position of an entry, if it is still queued.
    pub fn position_of(&self, id: EntryId) -> Option<usize> {
        self.items.iter().position(|e| e.id() == id).map(|i| i + 1)
    }

    /// Drop every pending entry. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }

    /// Remove entries whose source reference was already seen earlier in
    /// the queue. Returns how many were removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.items.len();
        let mut seen = HashSet::new();
        self.items.retain(|e| seen.insert(e.source_ref().to_owned()));
        before - self.items.len()
    }

    /// Randomly permute the pending entries.
    pub fn shuffle(&mut self) {
        let mut rng = rand::rng();
        self.items.make_contiguous().shuffle(&mut rng);
    }

    /// Keep only entries requested by someone in `present`.
    /// Returns how many were removed.
    pub fn retain_requesters(&mut self, present: &HashSet<u64>) -> usize {
        let before = self.items.len();
        self.items.retain(|e| present.contains(&e.requester().id));
        before - self.items.len()
    }

    /// Presentation snapshot with 1-based positions.
    pub fn slots(&self) -> Vec<QueueSlot> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, e)| QueueSlot::from_entry(i + 1, e))
            .collect()
    }

    fn index_of_position(&self, position: usize) -> Result<usize, PlaybackError> {
        if position == 0 || position > self.items.len() {
            return Err(PlaybackError::InvalidIndex {
                position,
                len: self.items.len(),
            });
        }
        Ok(position - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::track::Requester;

    fn make_item(name: &str) -> TrackEntry {
        TrackEntry::new(Requester::new(1, "ana"), format!("url://{name}"), name)
    }

    fn queue_of(names: &[&str]) -> PlayQueue {
        let mut queue = PlayQueue::new();
        for name in names {
            queue.push_back(make_item(name));
        }
        queue
    }

    fn titles(queue: &PlayQueue) -> Vec<String> {
        queue.iter().map(|e| e.title().to_string()).collect()
    }

    #[test]
    fn test_queue_basic() {
        let mut queue = PlayQueue::new();
        assert!(queue.is_empty());

        assert_eq!(queue.push_back(make_item("a")), 1);
        assert_eq!(queue.push_back(make_item("b")), 2);
        assert_eq!(queue.push_front(make_item("c")), 1);

        assert_eq!(titles(&queue), ["c", "a", "b"]);
        assert_eq!(queue.pop_front().unwrap().title(), "c");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove_renumbers() {
        let mut queue = queue_of(&["a", "b", "c"]);
        let removed = queue.remove(2).unwrap();
        assert_eq!(removed.title(), "b");

        let slots = queue.slots();
        assert_eq!(slots.len(), 2);
        assert_eq!((slots[0].position, slots[0].title.as_str()), (1, "a"));
        assert_eq!((slots[1].position, slots[1].title.as_str()), (2, "c"));
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = queue_of(&["a", "b"]);
        assert_eq!(
            queue.remove(0).unwrap_err(),
            PlaybackError::InvalidIndex { position: 0, len: 2 }
        );
        assert!(matches!(queue.remove(3), Err(PlaybackError::InvalidIndex { .. })));

        let mut empty = PlayQueue::new();
        assert!(matches!(empty.remove(1), Err(PlaybackError::InvalidIndex { .. })));
    }

    #[test]
    fn test_move_to_front() {
        let mut queue = queue_of(&["a", "b", "c"]);
        assert_eq!(queue.move_entry(3, Some(1)).unwrap(), 1);
        assert_eq!(titles(&queue), ["c", "a", "b"]);
    }

    #[test]
    fn test_move_defaults_to_front() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.move_entry(2, None).unwrap();
        assert_eq!(titles(&queue), ["b", "a", "c"]);
    }

    #[test]
    fn test_move_same_position_is_noop() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.move_entry(1, Some(1)).unwrap();
        assert_eq!(titles(&queue), ["a", "b", "c"]);
    }

    #[test]
    fn test_move_down() {
        let mut queue = queue_of(&["a", "b", "c"]);
        queue.move_entry(1, Some(3)).unwrap();
        assert_eq!(titles(&queue), ["b", "c", "a"]);
    }

    #[test]
    fn test_move_invalid() {
        let mut queue = queue_of(&["a", "b"]);
        assert!(queue.move_entry(3, Some(1)).is_err());
        assert!(queue.move_entry(1, Some(3)).is_err());
        assert!(queue.move_entry(0, None).is_err());
        assert_eq!(titles(&queue), ["a", "b"]);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let mut queue = PlayQueue::new();
        for name in ["a", "b", "a", "c", "b"] {
            queue.push_back(make_item(name));
        }
        let first_a = queue.get(1).unwrap().id();
        assert_eq!(queue.dedupe(), 2);
        assert_eq!(titles(&queue), ["a", "b", "c"]);
        assert_eq!(queue.get(1).unwrap().id(), first_a);
    }

    #[test]
    fn test_position_of_tracks_mutations() {
        let mut queue = queue_of(&["a", "b", "c"]);
        let c = queue.get(3).unwrap().id();
        queue.remove(1).unwrap();
        assert_eq!(queue.position_of(c), Some(2));
        queue.remove(2).unwrap();
        assert_eq!(queue.position_of(c), None);
    }

    #[test]
    fn test_shuffle_keeps_entries() {
        let mut queue = PlayQueue::new();
        for i in 0..20 {
            queue.push_back(make_item(&i.to_string()));
        }
        queue.shuffle();
        let mut seen = titles(&queue);
        seen.sort();
        let mut expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_retain_requesters() {
        let mut queue = PlayQueue::new();
        queue.push_back(TrackEntry::new(Requester::new(1, "ana"), "u1", "a"));
        queue.push_back(TrackEntry::new(Requester::new(2, "bo"), "u2", "b"));
        queue.push_back(TrackEntry::new(Requester::new(1, "ana"), "u3", "c"));

        let present = HashSet::from([1]);
        assert_eq!(queue.retain_requesters(&present), 1);
        assert_eq!(titles(&queue), ["a", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut queue = queue_of(&["a", "b"]);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
