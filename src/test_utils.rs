//! Test utilities and fixtures.
//!
//! Mock outputs and resolvers that record what the session asks of them,
//! so state-machine tests can run without threads or timers.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{connected_session, entry};
//!
//! #[test]
//! fn test_something() {
//!     let (session, output, _resolver) = connected_session();
//!     session.enqueue(entry("A"), false).unwrap();
//!     output.finish();
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::player::{
    AudioResource, CompletionCallback, OutputChannel, OutputError, OutputFactory, PlaybackSession,
    Requester, SessionKey, SessionSettings, TrackEntry,
};
use crate::resolver::{OpenOptions, ResolveError, ResolvedTrack, Resolver};

#[derive(Default)]
struct MockOutputState {
    pending: Option<CompletionCallback>,
    started: Vec<(String, Duration)>,
    paused: bool,
    released: bool,
    stops: usize,
    fail_starts: usize,
    hold: bool,
}

/// Output that plays nothing and completes only when told to.
///
/// `stop` fires the completion callback synchronously, the way a real
/// transport may. Callbacks always run outside the mock's own lock.
#[derive(Default)]
pub struct MockOutput {
    state: Mutex<MockOutputState>,
}

impl MockOutput {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Source refs of every successfully started resource, in order.
    pub fn started(&self) -> Vec<String> {
        self.state.lock().started.iter().map(|(s, _)| s.clone()).collect()
    }

    /// Start offsets of every started resource, in order.
    pub fn started_at(&self) -> Vec<Duration> {
        self.state.lock().started.iter().map(|(_, at)| *at).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    /// Make the next `n` starts fail.
    pub fn fail_next_starts(&self, n: usize) {
        self.state.lock().fail_starts = n;
    }

    /// While set, `stop` swallows the completion instead of firing it.
    pub fn hold_completions(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// The active track runs out naturally.
    pub fn finish(&self) {
        self.complete(None);
    }

    pub fn finish_with_error(&self, error: OutputError) {
        self.complete(Some(error));
    }

    fn complete(&self, error: Option<OutputError>) {
        let callback = {
            let mut state = self.state.lock();
            state.paused = false;
            state.pending.take()
        };
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

impl OutputChannel for MockOutput {
    fn start(&self, resource: AudioResource, on_complete: CompletionCallback) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if state.released {
            return Err(OutputError::Released);
        }
        if state.fail_starts > 0 {
            state.fail_starts -= 1;
            return Err(OutputError::Unplayable("mock failure".into()));
        }
        if state.pending.is_some() {
            return Err(OutputError::Busy);
        }
        state
            .started
            .push((resource.source_ref().to_string(), resource.start_at()));
        state.pending = Some(on_complete);
        state.paused = false;
        Ok(())
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            state.stops += 1;
            if state.hold {
                return;
            }
        }
        self.complete(None);
    }

    fn pause(&self) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if state.pending.is_none() {
            return Err(OutputError::Unplayable("idle".into()));
        }
        state.paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<(), OutputError> {
        let mut state = self.state.lock();
        if !state.paused {
            return Err(OutputError::Unplayable("not paused".into()));
        }
        state.paused = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_some() && !state.paused
    }

    fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_some() && state.paused
    }

    fn release(&self) {
        self.state.lock().released = true;
        self.complete(None);
    }
}

/// Hands out the same mock output to every session that connects.
pub struct MockFactory {
    output: Option<Arc<MockOutput>>,
    opened: AtomicUsize,
}

impl MockFactory {
    pub fn new(output: Arc<MockOutput>) -> Self {
        Self {
            output: Some(output),
            opened: AtomicUsize::new(0),
        }
    }

    /// A factory whose `open` always fails.
    pub fn failing() -> Self {
        Self {
            output: None,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl OutputFactory for MockFactory {
    fn open(&self, _key: &SessionKey, _channel: &str) -> Result<Arc<dyn OutputChannel>, OutputError> {
        let output = self
            .output
            .clone()
            .ok_or_else(|| OutputError::Transport("no route to voice server".into()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(output)
    }
}

/// Resolves any query to `url://{query}`.
#[derive(Default)]
pub struct MockResolver {
    missing: Mutex<HashSet<String>>,
    fail_opens: Mutex<bool>,
    lookups: AtomicUsize,
    opens: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `query` resolve to nothing.
    pub fn add_missing(&self, query: &str) {
        self.missing.lock().insert(query.to_string());
    }

    pub fn fail_opens(&self, fail: bool) {
        *self.fail_opens.lock() = fail;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Successful opens only.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn lookup(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.missing.lock().contains(query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }
        Ok(ResolvedTrack {
            source_ref: format!("url://{query}"),
            title: query.to_string(),
            page_url: Some(format!("https://example.com/{query}")),
            duration: None,
        })
    }

    fn open(&self, source_ref: &str, options: &OpenOptions) -> Result<AudioResource, ResolveError> {
        if *self.fail_opens.lock() {
            return Err(ResolveError::Open {
                source_ref: source_ref.to_string(),
                message: "stream expired".into(),
            });
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(AudioResource::new(source_ref, options.start_at))
    }
}

/// Test side of a [`GatedResolver`].
pub struct Gate {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl Gate {
    /// Block until the gated `open` is parked.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("open never reached the gate");
    }

    /// Let the parked `open` finish.
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// Like [`MockResolver`], but the first `open` parks until
/// [`Gate::release`], holding a freshly promoted track in its
/// not-yet-started window. Later opens go straight through.
pub struct GatedResolver {
    inner: MockResolver,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl GatedResolver {
    pub fn new() -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let resolver = Arc::new(Self {
            inner: MockResolver::new(),
            gate: Mutex::new(Some((entered_tx, release_rx))),
        });
        let gate = Gate {
            entered: entered_rx,
            release: release_tx,
        };
        (resolver, gate)
    }
}

#[async_trait]
impl Resolver for GatedResolver {
    async fn lookup(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        self.inner.lookup(query).await
    }

    fn open(&self, source_ref: &str, options: &OpenOptions) -> Result<AudioResource, ResolveError> {
        // Taken out first so the mock's lock isn't held while parked.
        let gate = self.gate.lock().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        self.inner.open(source_ref, options)
    }
}

/// A track requested by a fixed test user, without a resource.
pub fn entry(name: &str) -> TrackEntry {
    TrackEntry::new(Requester::new(1, "tester"), format!("url://{name}"), name)
}

/// A session already connected to a fresh [`MockOutput`].
pub fn connected_session() -> (PlaybackSession, Arc<MockOutput>, Arc<MockResolver>) {
    let resolver = Arc::new(MockResolver::new());
    let output = MockOutput::shared();
    let session = PlaybackSession::new(
        SessionKey::from("guild-test"),
        resolver.clone(),
        SessionSettings::default(),
    );
    session
        .connect(Some("lounge"), &MockFactory::new(output.clone()))
        .unwrap();
    (session, output, resolver)
}

/// A connected session whose first track open is gated.
pub fn gated_session() -> (PlaybackSession, Arc<MockOutput>, Gate) {
    let (resolver, gate) = GatedResolver::new();
    let output = MockOutput::shared();
    let session = PlaybackSession::new(
        SessionKey::from("guild-gated"),
        resolver,
        SessionSettings::default(),
    );
    session
        .connect(Some("lounge"), &MockFactory::new(output.clone()))
        .unwrap();
    (session, output, gate)
}
