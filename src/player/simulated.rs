//! An output that "plays" resources by waiting out their length.
//!
//! Used by the CLI and by anything that wants real threading and timing
//! without a voice transport. A worker thread owns the active track; the
//! handle talks to it over a command channel and shares a small status
//! block for synchronous queries.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::RwLock;

use super::output::{CompletionCallback, OutputChannel, OutputError, OutputFactory};
use super::registry::SessionKey;
use super::track::AudioResource;
use crate::config::SimulatorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SimStatus {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Default)]
struct SimState {
    status: SimStatus,
    released: bool,
}

enum SimCommand {
    Start {
        length: Duration,
        on_complete: CompletionCallback,
    },
    Stop,
    Pause,
    Resume,
    Shutdown,
}

/// Simulated single-track output backed by a worker thread.
pub struct SimulatedOutput {
    state: Arc<RwLock<SimState>>,
    command_tx: Sender<SimCommand>,
    config: SimulatorConfig,
    _worker: JoinHandle<()>,
}

impl SimulatedOutput {
    /// Spawn the worker thread.
    pub fn spawn(name: &str, config: SimulatorConfig) -> Result<Self, OutputError> {
        let state = Arc::new(RwLock::new(SimState::default()));
        let (command_tx, command_rx) = unbounded();

        let state_for_thread = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(format!("sim-output-{name}"))
            .spawn(move || sim_thread_main(state_for_thread, command_rx))
            .map_err(|e| OutputError::Transport(e.to_string()))?;

        tracing::debug!(name, time_scale = config.time_scale, "Simulated output started");
        Ok(Self {
            state,
            command_tx,
            config,
            _worker: worker,
        })
    }

    fn send(&self, command: SimCommand) -> Result<(), OutputError> {
        self.command_tx.send(command).map_err(|_| OutputError::Released)
    }
}

impl OutputChannel for SimulatedOutput {
    fn start(&self, resource: AudioResource, on_complete: CompletionCallback) -> Result<(), OutputError> {
        let length = resource
            .remaining()
            .unwrap_or_else(|| self.config.default_track_len().saturating_sub(resource.start_at()));
        let length = self.config.scaled(length);

        {
            let mut state = self.state.write();
            if state.released {
                return Err(OutputError::Released);
            }
            if state.status != SimStatus::Idle {
                return Err(OutputError::Busy);
            }
            state.status = SimStatus::Playing;
        }

        tracing::trace!(source = resource.source_ref(), ?length, "Simulating track");
        self.send(SimCommand::Start { length, on_complete }).inspect_err(|_| {
            self.state.write().status = SimStatus::Idle;
        })
    }

    fn stop(&self) {
        let _ = self.send(SimCommand::Stop);
    }

    fn pause(&self) -> Result<(), OutputError> {
        {
            let mut state = self.state.write();
            if state.released {
                return Err(OutputError::Released);
            }
            if state.status != SimStatus::Playing {
                return Err(OutputError::Unplayable("nothing to pause".into()));
            }
            state.status = SimStatus::Paused;
        }
        self.send(SimCommand::Pause)
    }

    fn resume(&self) -> Result<(), OutputError> {
        {
            let mut state = self.state.write();
            if state.released {
                return Err(OutputError::Released);
            }
            if state.status != SimStatus::Paused {
                return Err(OutputError::Unplayable("not paused".into()));
            }
            state.status = SimStatus::Playing;
        }
        self.send(SimCommand::Resume)
    }

    fn is_active(&self) -> bool {
        self.state.read().status == SimStatus::Playing
    }

    fn is_paused(&self) -> bool {
        self.state.read().status == SimStatus::Paused
    }

    fn release(&self) {
        self.state.write().released = true;
        let _ = self.send(SimCommand::Shutdown);
    }
}

impl Drop for SimulatedOutput {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SimCommand::Shutdown);
    }
}

/// Opens a [`SimulatedOutput`] per session.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutputFactory {
    config: SimulatorConfig,
}

impl SimulatedOutputFactory {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }
}

impl OutputFactory for SimulatedOutputFactory {
    fn open(&self, key: &SessionKey, channel: &str) -> Result<Arc<dyn OutputChannel>, OutputError> {
        let output = SimulatedOutput::spawn(&format!("{key}-{channel}"), self.config.clone())?;
        Ok(Arc::new(output))
    }
}

/// The track the worker is currently timing.
struct ActiveTrack {
    remaining: Duration,
    /// Set while playing; `None` while paused
    resumed_at: Option<Instant>,
    on_complete: CompletionCallback,
}

impl ActiveTrack {
    fn time_left(&self) -> Option<Duration> {
        self.resumed_at
            .map(|at| self.remaining.saturating_sub(at.elapsed()))
    }
}

/// Worker thread state.
struct SimThreadContext {
    active: Option<ActiveTrack>,
}

impl SimThreadContext {
    /// Handle a command, returning whether to keep running.
    fn handle_command(&mut self, cmd: SimCommand, state: &RwLock<SimState>) -> bool {
        match cmd {
            SimCommand::Start { length, on_complete } => {
                // Start is only accepted while idle, so this is normally empty.
                self.finish(state, None);
                self.active = Some(ActiveTrack {
                    remaining: length,
                    resumed_at: Some(Instant::now()),
                    on_complete,
                });
            }
            SimCommand::Stop => self.finish(state, None),
            SimCommand::Pause => {
                if let Some(track) = self.active.as_mut()
                    && let Some(left) = track.time_left()
                {
                    track.remaining = left;
                    track.resumed_at = None;
                }
            }
            SimCommand::Resume => {
                if let Some(track) = self.active.as_mut()
                    && track.resumed_at.is_none()
                {
                    track.resumed_at = Some(Instant::now());
                }
            }
            SimCommand::Shutdown => {
                self.finish(state, Some(OutputError::Released));
                return false;
            }
        }
        true
    }

    /// End the active track and fire its callback.
    fn finish(&mut self, state: &RwLock<SimState>, error: Option<OutputError>) {
        let Some(track) = self.active.take() else {
            return;
        };
        // Idle before the callback so it can start the next track.
        state.write().status = SimStatus::Idle;
        (track.on_complete)(error);
    }
}

fn sim_thread_main(state: Arc<RwLock<SimState>>, command_rx: Receiver<SimCommand>) {
    let mut ctx = SimThreadContext { active: None };

    loop {
        let deadline = ctx.active.as_ref().and_then(ActiveTrack::time_left);

        // Block on commands when idle or paused, wait out the track otherwise
        let command = match deadline {
            Some(left) => match command_rx.recv_timeout(left) {
                Ok(cmd) => Some(cmd),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => Some(SimCommand::Shutdown),
            },
            None => Some(command_rx.recv().unwrap_or(SimCommand::Shutdown)),
        };

        match command {
            Some(cmd) => {
                if !ctx.handle_command(cmd, &state) {
                    break;
                }
            }
            None => {
                tracing::trace!("Simulated track finished");
                ctx.finish(&state, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn output() -> SimulatedOutput {
        SimulatedOutput::spawn("test", SimulatorConfig::default()).unwrap()
    }

    fn resource(millis: u64) -> AudioResource {
        AudioResource::new("sim://track", Duration::ZERO).with_duration(Duration::from_millis(millis))
    }

    fn callback() -> (CompletionCallback, mpsc::Receiver<Option<OutputError>>) {
        let (tx, rx) = mpsc::channel();
        (
            Box::new(move |err| {
                let _ = tx.send(err);
            }),
            rx,
        )
    }

    #[test]
    fn test_track_completes_on_its_own() {
        let out = output();
        let (cb, rx) = callback();
        out.start(resource(20), cb).unwrap();
        assert!(out.is_active());

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), None);
        assert!(!out.is_active());
    }

    #[test]
    fn test_stop_fires_callback_once() {
        let out = output();
        let (cb, rx) = callback();
        out.start(resource(60_000), cb).unwrap();
        out.stop();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), None);

        out.stop();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_busy_while_playing() {
        let out = output();
        let (cb, _rx) = callback();
        out.start(resource(60_000), cb).unwrap();
        let (cb2, _rx2) = callback();
        assert_eq!(out.start(resource(10), cb2), Err(OutputError::Busy));
    }

    #[test]
    fn test_pause_and_resume() {
        let out = output();
        let (cb, rx) = callback();
        out.start(resource(40), cb).unwrap();
        out.pause().unwrap();
        assert!(out.is_paused());
        assert!(!out.is_active());

        // Paused tracks don't run out.
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        out.resume().unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), None);
        assert!(out.resume().is_err());
    }

    #[test]
    fn test_release() {
        let out = output();
        let (cb, rx) = callback();
        out.start(resource(60_000), cb).unwrap();
        out.release();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(OutputError::Released));

        let (cb2, _rx2) = callback();
        assert_eq!(out.start(resource(10), cb2), Err(OutputError::Released));
    }

    #[test]
    fn test_time_scale_shortens_default_length() {
        let out = SimulatedOutput::spawn(
            "fast",
            SimulatorConfig {
                default_track_secs: 1,
                time_scale: 100.0,
            },
        )
        .unwrap();
        let (cb, rx) = callback();
        out.start(AudioResource::new("sim://unknown-length", Duration::ZERO), cb)
            .unwrap();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), None);
    }

    #[test]
    fn test_factory_opens_independent_outputs() {
        let factory = SimulatedOutputFactory::default();
        let a = factory.open(&SessionKey::from("a"), "lounge").unwrap();
        let b = factory.open(&SessionKey::from("b"), "lounge").unwrap();
        let (cb, _rx) = callback();
        a.start(resource(60_000), cb).unwrap();
        assert!(a.is_active());
        assert!(!b.is_active());
    }
}
