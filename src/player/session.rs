//! The per-session playback state machine.
//!
//! A [`PlaybackSession`] owns the pending queue, the current slot and the
//! loop mode behind one mutex. Two kinds of callers mutate it: control
//! operations (any thread, any requester) and the output's completion
//! callback (the output's own thread). Both funnel through the same
//! critical sections, and only [`SessionInner::promote`] ever changes the
//! current slot.
//!
//! Calls into the output (`start`, `stop`, ...) and into the resolver are
//! made after the lock is released. Each track is started under a
//! *generation* number; completions that carry an old generation are
//! ignored, which is how work done outside the lock is re-validated.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

use super::PlaybackError;
use super::output::{CompletionCallback, OutputChannel, OutputError, OutputFactory};
use super::queue::{LoopMode, PlayQueue};
use super::registry::SessionKey;
use super::state::{EnqueueOutcome, NowPlaying, PlaybackStatus, QueueSlot, SessionEvent};
use super::track::{AudioResource, EntryId, Requester, TrackEntry};
use crate::config::PlaybackConfig;
use crate::resolver::{OpenOptions, Resolver};
use crate::timestamp::parse_timestamp;

type Result<T> = std::result::Result<T, PlaybackError>;

/// Tunables for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// How long `skip_to` waits for each advance
    pub advance_timeout: Duration,
    /// Event channel capacity
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for SessionSettings {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            advance_timeout: config.advance_timeout(),
            event_capacity: config.event_capacity.max(1),
        }
    }
}

/// Result of [`PlaybackSession::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requested {
    pub outcome: EnqueueOutcome,
    pub page_url: Option<String>,
}

struct SessionState {
    queue: PlayQueue,
    current: Option<TrackEntry>,
    loop_mode: LoopMode,
    output: Option<Arc<dyn OutputChannel>>,
    /// Bumped on every change of the current slot
    generation: u64,
    /// The next advance promotes the queue head unconditionally
    seek_pending: bool,
    /// `current` was promoted but the output hasn't accepted it yet
    starting: bool,
    /// A stop arrived while `starting`; `launch` applies it
    stop_requested: bool,
    closed: bool,
}

/// Everything needed to hand a track to the output once the lock is gone.
struct StartPlan {
    output: Arc<dyn OutputChannel>,
    generation: u64,
    entry: EntryId,
    source_ref: String,
    title: String,
    resource: Option<AudioResource>,
}

struct SessionInner {
    key: SessionKey,
    resolver: Arc<dyn Resolver>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    advanced: watch::Sender<u64>,
    events: broadcast::Sender<SessionEvent>,
}

/// Handle to one session. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    /// Create a disconnected, idle session.
    pub fn new(key: SessionKey, resolver: Arc<dyn Resolver>, settings: SessionSettings) -> Self {
        let (advanced, _) = watch::channel(0);
        let (events, _) = broadcast::channel(settings.event_capacity);
        Self {
            inner: Arc::new(SessionInner {
                key,
                resolver,
                settings,
                state: Mutex::new(SessionState {
                    queue: PlayQueue::new(),
                    current: None,
                    loop_mode: LoopMode::Off,
                    output: None,
                    generation: 0,
                    seek_pending: false,
                    starting: false,
                    stop_requested: false,
                    closed: false,
                }),
                advanced,
                events,
            }),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.inner.key
    }

    /// Receive now-playing / idle / disconnect notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Acquire an output for this session.
    ///
    /// `channel` is the caller's voice channel; `None` means the caller
    /// isn't in one. Returns `Ok(false)` if already connected.
    pub fn connect(&self, channel: Option<&str>, factory: &dyn OutputFactory) -> Result<bool> {
        let channel = channel.ok_or(PlaybackError::NotInVoiceContext)?;
        {
            let state = self.inner.lock_open()?;
            if state.output.is_some() {
                return Ok(false);
            }
        }

        let output = factory.open(&self.inner.key, channel).map_err(|e| {
            tracing::warn!(session = %self.inner.key, channel, error = %e, "Output connect failed");
            PlaybackError::NotInVoiceContext
        })?;

        let mut state = self.inner.state.lock();
        if state.closed || state.output.is_some() {
            let closed = state.closed;
            drop(state);
            output.release();
            return if closed {
                Err(PlaybackError::NotInVoiceContext)
            } else {
                Ok(false)
            };
        }
        state.output = Some(output);
        tracing::info!(session = %self.inner.key, channel, "Connected");
        Ok(true)
    }

    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closed && state.output.is_some()
    }

    /// Stop playback, drop the queue and release the output.
    ///
    /// The session is terminal afterwards. Safe to call mid-track and more
    /// than once.
    pub fn disconnect(&self) {
        let output = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let dropped = state.queue.clear();
            state.current = None;
            state.loop_mode = LoopMode::Off;
            state.seek_pending = false;
            state.starting = false;
            state.stop_requested = false;
            state.generation += 1;
            self.inner.advanced.send_replace(state.generation);
            tracing::info!(session = %self.inner.key, dropped, "Disconnecting");
            state.output.take()
        };

        // Any completion fired by this stop carries a stale generation.
        if let Some(output) = output {
            output.release();
        }
        self.inner.emit(SessionEvent::Disconnected);
    }

    // ------------------------------------------------------------------
    // Queueing
    // ------------------------------------------------------------------

    /// Queue a track, or start it right away if nothing is playing.
    pub fn enqueue(&self, entry: TrackEntry, at_front: bool) -> Result<EnqueueOutcome> {
        let title = entry.title().to_string();
        let plan = {
            let mut state = self.inner.lock_connected()?;
            if state.current.is_some() {
                let position = if at_front {
                    state.queue.push_front(entry)
                } else {
                    state.queue.push_back(entry)
                };
                tracing::debug!(session = %self.inner.key, %title, position, "Queued");
                return Ok(EnqueueOutcome::Queued { title, position });
            }
            self.inner.promote(&mut state, Some(entry))
        };

        if let Some(plan) = plan {
            self.launch(plan)?;
        }
        Ok(EnqueueOutcome::NowPlaying { title })
    }

    /// Resolve a search term or URL and queue the result.
    pub async fn request(
        &self,
        requester: Requester,
        query: &str,
        at_front: bool,
    ) -> Result<Requested> {
        drop(self.inner.lock_connected()?);

        let track = self.inner.resolver.lookup(query).await.map_err(|e| {
            tracing::debug!(session = %self.inner.key, query, error = %e, "Lookup failed");
            PlaybackError::from(e)
        })?;
        let entry = TrackEntry::new(requester, track.source_ref, track.title);
        let outcome = self.enqueue(entry, at_front)?;
        Ok(Requested {
            outcome,
            page_url: track.page_url,
        })
    }

    /// Queue at the front and skip straight to it.
    pub fn play_skip(&self, entry: TrackEntry) -> Result<EnqueueOutcome> {
        let outcome = self.enqueue(entry, true)?;
        if matches!(outcome, EnqueueOutcome::Queued { .. }) {
            match self.skip() {
                Ok(_) | Err(PlaybackError::NothingPlaying) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Transport control
    // ------------------------------------------------------------------

    /// Stop the current track; the advance picks what plays next.
    ///
    /// Returns the title of the track that was stopped.
    pub fn skip(&self) -> Result<String> {
        let (output, title) = {
            let mut state = self.inner.lock_connected()?;
            let title = state
                .current
                .as_ref()
                .map(|c| c.title().to_string())
                .ok_or(PlaybackError::NothingPlaying)?;
            (self.inner.stop_target(&mut state), title)
        };
        tracing::debug!(session = %self.inner.key, %title, deferred = output.is_none(), "Skipping");
        if let Some(output) = output {
            output.stop();
        }
        Ok(title)
    }

    /// Skip until the entry currently at `position` is playing.
    ///
    /// Each step is its own critical section, so concurrent queue edits can
    /// move the target. If it disappears, stops getting closer, or an
    /// advance doesn't arrive in time, this gives up with `InvalidIndex`.
    pub async fn skip_to(&self, position: usize) -> Result<String> {
        let target = {
            let state = self.inner.lock_connected()?;
            state
                .queue
                .get(position)
                .map(TrackEntry::id)
                .ok_or(PlaybackError::InvalidIndex {
                    position,
                    len: state.queue.len(),
                })?
        };

        let mut advanced = self.inner.advanced.subscribe();
        let mut remaining = position;
        for _ in 0..position {
            advanced.mark_unchanged();
            self.skip()?;

            let arrived = tokio::time::timeout(self.inner.settings.advance_timeout, advanced.changed())
                .await
                .is_ok_and(|changed| changed.is_ok());

            let state = self.inner.state.lock();
            let len = state.queue.len();
            if let Some(current) = state.current.as_ref().filter(|c| c.id() == target) {
                return Ok(current.title().to_string());
            }
            if !arrived {
                tracing::warn!(session = %self.inner.key, entry = %target, "Advance timed out during skip_to");
                return Err(PlaybackError::InvalidIndex { position, len });
            }
            match state.queue.position_of(target) {
                Some(now) if now < remaining => remaining = now,
                _ => {
                    tracing::debug!(session = %self.inner.key, entry = %target, "skip_to target lost");
                    return Err(PlaybackError::InvalidIndex { position, len });
                }
            }
        }

        let state = self.inner.state.lock();
        Err(PlaybackError::InvalidIndex {
            position,
            len: state.queue.len(),
        })
    }

    /// Restart the current track at a human-readable offset.
    pub fn seek(&self, timestamp: &str) -> Result<Duration> {
        drop(self.inner.lock_playing()?);
        let offset = parse_timestamp(timestamp)?;
        self.seek_to(offset)
    }

    /// Restart the current track at `offset`.
    ///
    /// A fresh resource is opened at the offset and queued at the front;
    /// stopping the output then promotes it regardless of loop mode.
    pub fn seek_to(&self, offset: Duration) -> Result<Duration> {
        let (generation, source_ref) = {
            let state = self.inner.lock_playing()?;
            let current = state.current.as_ref().ok_or(PlaybackError::NothingPlaying)?;
            (state.generation, current.source_ref().to_string())
        };

        let resource = self
            .inner
            .resolver
            .open(&source_ref, &OpenOptions::at(offset))?;

        let output = {
            let mut state = self.inner.lock_connected()?;
            if state.generation != generation {
                // The track changed while the resource was being opened.
                return Err(PlaybackError::NothingPlaying);
            }
            let replay = match state.current.as_ref() {
                Some(current) => current.replay_with(resource),
                None => return Err(PlaybackError::NothingPlaying),
            };
            state.queue.push_front(replay);
            state.seek_pending = true;
            self.inner.stop_target(&mut state)
        };

        tracing::debug!(session = %self.inner.key, offset = ?offset, deferred = output.is_none(), "Seeking");
        if let Some(output) = output {
            output.stop();
        }
        Ok(offset)
    }

    /// Restart the current track from the beginning.
    pub fn replay(&self) -> Result<()> {
        self.seek_to(Duration::ZERO).map(|_| ())
    }

    pub fn pause(&self) -> Result<()> {
        let output = {
            let state = self.inner.lock_playing()?;
            state.output.clone().ok_or(PlaybackError::NotInVoiceContext)?
        };
        if !output.is_active() {
            return Err(PlaybackError::NothingPlaying);
        }
        output.pause().map_err(|e| match e {
            OutputError::Released | OutputError::Transport(_) => PlaybackError::NotInVoiceContext,
            _ => PlaybackError::NothingPlaying,
        })
    }

    pub fn resume(&self) -> Result<()> {
        let output = {
            let state = self.inner.lock_connected()?;
            if state.current.is_none() {
                return Err(PlaybackError::NotPaused);
            }
            state.output.clone().ok_or(PlaybackError::NotInVoiceContext)?
        };
        if !output.is_paused() {
            return Err(PlaybackError::NotPaused);
        }
        output.resume().map_err(|e| match e {
            OutputError::Released | OutputError::Transport(_) => PlaybackError::NotInVoiceContext,
            _ => PlaybackError::NotPaused,
        })
    }

    pub fn set_loop_mode(&self, mode: LoopMode) -> Result<()> {
        let mut state = self.inner.lock_open()?;
        if mode == LoopMode::RepeatCurrent && state.current.is_none() {
            return Err(PlaybackError::NothingPlaying);
        }
        state.loop_mode = mode;
        tracing::debug!(session = %self.inner.key, mode = mode.label(), "Loop mode set");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queue editing
    // ------------------------------------------------------------------

    /// Remove the entry at a 1-based position. Returns its title.
    pub fn remove(&self, position: usize) -> Result<String> {
        let mut state = self.inner.lock_open()?;
        let entry = state.queue.remove(position)?;
        tracing::debug!(session = %self.inner.key, position, title = entry.title(), "Removed");
        Ok(entry.title().to_string())
    }

    /// Move an entry; `to` defaults to the front.
    pub fn move_entry(&self, from: usize, to: Option<usize>) -> Result<QueueSlot> {
        let mut state = self.inner.lock_open()?;
        let to = state.queue.move_entry(from, to)?;
        let entry = state.queue.get(to).ok_or(PlaybackError::InvalidIndex {
            position: to,
            len: state.queue.len(),
        })?;
        tracing::debug!(session = %self.inner.key, from, to, "Moved");
        Ok(QueueSlot::from_entry(to, entry))
    }

    /// Drop every pending entry. The current track keeps playing.
    pub fn clear(&self) -> Result<usize> {
        let mut state = self.inner.lock_open()?;
        Ok(state.queue.clear())
    }

    /// Remove entries with a source already queued earlier.
    pub fn dedupe(&self) -> Result<usize> {
        let mut state = self.inner.lock_open()?;
        let removed = state.queue.dedupe();
        tracing::debug!(session = %self.inner.key, removed, "Deduplicated queue");
        Ok(removed)
    }

    pub fn shuffle(&self) -> Result<()> {
        let mut state = self.inner.lock_open()?;
        if state.queue.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        state.queue.shuffle();
        Ok(())
    }

    /// Drop tracks requested by anyone not in `present`, skipping the
    /// current track too if its requester left. Returns how many queued
    /// entries were removed.
    pub fn cleanup_absent(&self, present: &HashSet<u64>) -> Result<usize> {
        let (removed, skip_current) = {
            let mut state = self.inner.lock_open()?;
            let removed = state.queue.retain_requesters(present);
            let skip_current = state
                .current
                .as_ref()
                .is_some_and(|c| !present.contains(&c.requester().id));
            (removed, skip_current)
        };

        if skip_current {
            match self.skip() {
                Ok(_) | Err(PlaybackError::NothingPlaying) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn now_playing(&self) -> Option<NowPlaying> {
        let state = self.inner.state.lock();
        state
            .current
            .as_ref()
            .map(|c| NowPlaying::from_entry(c, state.loop_mode))
    }

    pub fn queue_snapshot(&self) -> Vec<QueueSlot> {
        self.inner.state.lock().queue.slots()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.inner.state.lock().loop_mode
    }

    pub fn status(&self) -> PlaybackStatus {
        let output = {
            let state = self.inner.state.lock();
            if state.closed {
                return PlaybackStatus::Closed;
            }
            if state.current.is_none() {
                return PlaybackStatus::Idle;
            }
            state.output.clone()
        };
        match output {
            Some(output) if output.is_paused() => PlaybackStatus::Paused,
            Some(_) => PlaybackStatus::Playing,
            None => PlaybackStatus::Idle,
        }
    }

    // ------------------------------------------------------------------
    // Advance
    // ------------------------------------------------------------------

    /// Completion handler for the track started under `generation`.
    fn on_track_end(&self, generation: u64, error: Option<OutputError>) {
        let plan = {
            let mut state = self.inner.state.lock();
            if state.closed || state.generation != generation {
                tracing::debug!(
                    session = %self.inner.key,
                    generation,
                    current = state.generation,
                    "Ignoring stale completion"
                );
                return;
            }
            if let Some(ref e) = error {
                tracing::warn!(session = %self.inner.key, generation, error = %e, "Track ended with error");
            }
            self.inner.advance(&mut state)
        };

        match plan {
            Some(plan) => {
                // Failure already dropped the session to idle and was logged.
                let _ = self.launch(plan);
            }
            None => {
                tracing::info!(session = %self.inner.key, "Queue finished");
                self.inner.emit(SessionEvent::Idle);
            }
        }
    }

    /// Hand a promoted entry to the output. Runs without the session lock.
    fn launch(&self, plan: StartPlan) -> Result<()> {
        let resource = match plan.resource {
            Some(resource) => resource,
            None => match self.inner.resolver.open(&plan.source_ref, &OpenOptions::default()) {
                Ok(resource) => resource,
                Err(e) => {
                    let err = PlaybackError::from(e);
                    self.inner.start_failed(plan.generation, &plan.title, &err);
                    return Err(err);
                }
            },
        };

        let on_complete = self.completion(plan.generation);
        if let Err(e) = plan.output.start(resource, on_complete) {
            let err = PlaybackError::from(e);
            self.inner.start_failed(plan.generation, &plan.title, &err);
            return Err(err);
        }

        let deferred_stop = {
            let mut state = self.inner.state.lock();
            if state.closed {
                drop(state);
                // Disconnected while starting; don't leave the output running.
                plan.output.stop();
                return Err(PlaybackError::NotInVoiceContext);
            }
            if state.generation == plan.generation {
                state.starting = false;
                std::mem::take(&mut state.stop_requested)
            } else {
                false
            }
        };

        tracing::info!(
            session = %self.inner.key,
            entry = %plan.entry,
            generation = plan.generation,
            title = %plan.title,
            "Now playing"
        );
        self.inner.emit(SessionEvent::NowPlaying {
            entry: plan.entry,
            title: plan.title,
        });

        if deferred_stop {
            // A skip or seek landed while the output was still starting.
            tracing::debug!(session = %self.inner.key, generation = plan.generation, "Applying deferred stop");
            plan.output.stop();
        }
        Ok(())
    }

    fn completion(&self, generation: u64) -> CompletionCallback {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        Box::new(move |error| {
            if let Some(inner) = weak.upgrade() {
                PlaybackSession { inner }.on_track_end(generation, error);
            }
        })
    }
}

impl SessionInner {
    fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if state.closed {
            return Err(PlaybackError::NotInVoiceContext);
        }
        Ok(state)
    }

    fn lock_connected(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.lock_open()?;
        if state.output.is_none() {
            return Err(PlaybackError::NotInVoiceContext);
        }
        Ok(state)
    }

    fn lock_playing(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.lock_connected()?;
        if state.current.is_none() {
            return Err(PlaybackError::NothingPlaying);
        }
        Ok(state)
    }

    /// The output to stop right now, or `None` if the current track is
    /// still starting, in which case the stop is applied once it has.
    fn stop_target(&self, state: &mut SessionState) -> Option<Arc<dyn OutputChannel>> {
        if state.starting {
            state.stop_requested = true;
            return None;
        }
        state.output.clone()
    }

    /// Pick the next track after the current one ends or is stopped.
    fn advance(&self, state: &mut SessionState) -> Option<StartPlan> {
        let finished = state.current.take();
        let seek = std::mem::take(&mut state.seek_pending);

        let next = match (finished, state.loop_mode) {
            // The re-seeked copy at the head replaces the finished track.
            (_, _) if seek => state.queue.pop_front(),
            // Resource was consumed; `launch` opens a fresh one.
            (Some(entry), LoopMode::RepeatCurrent) => Some(entry),
            (Some(entry), LoopMode::RepeatQueue) => {
                state.queue.push_back(entry);
                state.queue.pop_front()
            }
            _ => state.queue.pop_front(),
        };

        tracing::debug!(
            session = %self.key,
            mode = state.loop_mode.label(),
            seek,
            next = next.as_ref().map(TrackEntry::title),
            "Advancing"
        );
        self.promote(state, next)
    }

    /// The only place the current slot changes.
    fn promote(&self, state: &mut SessionState, next: Option<TrackEntry>) -> Option<StartPlan> {
        state.generation += 1;
        self.advanced.send_replace(state.generation);
        state.starting = false;
        state.stop_requested = false;

        let (Some(mut entry), Some(output)) = (next, state.output.clone()) else {
            state.current = None;
            return None;
        };
        tracing::trace!(
            session = %self.key,
            entry = %entry.id(),
            generation = state.generation,
            materialized = entry.has_resource(),
            "Promoting"
        );
        let plan = StartPlan {
            output,
            generation: state.generation,
            entry: entry.id(),
            source_ref: entry.source_ref().to_string(),
            title: entry.title().to_string(),
            resource: entry.take_resource(),
        };
        state.current = Some(entry);
        state.starting = true;
        Some(plan)
    }

    /// Fall back to idle after a failed start, unless something newer
    /// already took over.
    fn start_failed(&self, generation: u64, title: &str, err: &PlaybackError) {
        {
            let mut state = self.state.lock();
            if state.closed || state.generation != generation {
                return;
            }
            state.current = None;
            state.seek_pending = false;
            state.starting = false;
            state.stop_requested = false;
            state.generation += 1;
            self.advanced.send_replace(state.generation);
        }
        tracing::warn!(session = %self.key, title, error = %err, "Failed to start track");
        self.emit(SessionEvent::StartFailed {
            title: title.to_string(),
            reason: err.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
