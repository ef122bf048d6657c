//! Play catalog tracks through a simulated output.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;
use crate::player::{
    EnqueueOutcome, LoopMode, PlaybackError, PlaybackSession, Requester, SessionEvent,
    SessionRegistry, SessionSettings, SimulatedOutputFactory,
};
use crate::resolver::CatalogResolver;

/// Flags for `jukebox play`.
#[derive(Debug, Clone, Default)]
pub struct PlayOptions {
    pub loop_queue: bool,
    pub loop_track: bool,
    pub shuffle: bool,
    pub time_scale: Option<f64>,
}

impl PlayOptions {
    fn loop_mode(&self) -> LoopMode {
        if self.loop_track {
            LoopMode::RepeatCurrent
        } else if self.loop_queue {
            LoopMode::RepeatQueue
        } else {
            LoopMode::Off
        }
    }
}

/// Queue every query into one session and play until the queue runs dry
/// or Ctrl+C.
pub fn cmd_play(
    rt: &Runtime,
    config: &Config,
    catalog: &Path,
    queries: &[String],
    options: &PlayOptions,
) -> anyhow::Result<()> {
    let resolver = CatalogResolver::load(catalog)?;
    println!("Catalog: {} tracks from {:?}", resolver.tracks().len(), catalog);

    let mut simulator = config.simulator.clone();
    if let Some(scale) = options.time_scale {
        simulator.time_scale = scale;
    }

    let registry = SessionRegistry::new(Arc::new(resolver), SessionSettings::from(&config.playback));
    let session = registry.get("cli");
    session.connect(Some("local"), &SimulatedOutputFactory::new(simulator))?;

    let result = rt.block_on(play_session(&session, queries, options));
    registry.shutdown();
    result
}

async fn play_session(
    session: &PlaybackSession,
    queries: &[String],
    options: &PlayOptions,
) -> anyhow::Result<()> {
    let mut events = session.subscribe();
    let requester = Requester::new(0, whoami());

    let mut queued = 0;
    for query in queries {
        match session.request(requester.clone(), query, false).await {
            Ok(requested) => {
                queued += 1;
                if let EnqueueOutcome::Queued { title, position } = &requested.outcome {
                    println!("  #{position:<3} {title}");
                }
            }
            Err(e) => eprintln!("  {query:?}: {e}"),
        }
    }

    if queued == 0 {
        anyhow::bail!("Nothing to play");
    }

    if options.shuffle {
        match session.shuffle() {
            Ok(()) | Err(PlaybackError::QueueEmpty) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let mode = options.loop_mode();
    if mode != LoopMode::Off {
        match session.set_loop_mode(mode) {
            Ok(()) => println!("Loop: {}", mode.label()),
            Err(e) => eprintln!("Loop not set: {e}"),
        }
    }

    if session.now_playing().is_none() {
        // Either everything already finished or every start failed.
        if drain_events(session, &mut events) {
            return Ok(());
        }
        anyhow::bail!("Nothing could be started");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !print_event(session, &event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// Print one event. Returns false once playback is over.
fn print_event(session: &PlaybackSession, event: &SessionEvent) -> bool {
    match event {
        SessionEvent::NowPlaying { title, .. } => {
            println!("▶ {title} ({} queued)", session.queue_len());
            true
        }
        SessionEvent::StartFailed { title, reason } => {
            eprintln!("✗ {title}: {reason}");
            true
        }
        SessionEvent::Idle if session.now_playing().is_some() => true,
        SessionEvent::Idle => {
            println!("Queue finished");
            false
        }
        SessionEvent::Disconnected => false,
    }
}

/// Print whatever is already buffered. Returns true if anything played.
fn drain_events(
    session: &PlaybackSession,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
) -> bool {
    let mut played = false;
    while let Ok(event) = events.try_recv() {
        played |= matches!(event, SessionEvent::NowPlaying { .. });
        print_event(session, &event);
    }
    played
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;

    const CATALOG: &str = r#"
[[tracks]]
title = "Africa"
artist = "Toto"
source_ref = "file://africa.flac"
duration_secs = 2

[[tracks]]
title = "Take On Me"
artist = "a-ha"
source_ref = "file://take-on-me.flac"
duration_secs = 2
"#;

    fn fast_config() -> Config {
        Config {
            simulator: SimulatorConfig {
                default_track_secs: 1,
                time_scale: 200.0,
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_loop_mode_from_flags() {
        let mut options = PlayOptions::default();
        assert_eq!(options.loop_mode(), LoopMode::Off);
        options.loop_queue = true;
        assert_eq!(options.loop_mode(), LoopMode::RepeatQueue);
        options.loop_track = true;
        assert_eq!(options.loop_mode(), LoopMode::RepeatCurrent);
    }

    #[test]
    fn test_play_runs_queue_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, CATALOG).unwrap();

        let rt = Runtime::new().unwrap();
        let queries = vec!["africa".to_string(), "take on me".to_string()];
        cmd_play(&rt, &fast_config(), &path, &queries, &PlayOptions::default()).unwrap();
    }

    #[test]
    fn test_play_with_no_matches_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, CATALOG).unwrap();

        let rt = Runtime::new().unwrap();
        let queries = vec!["nothing like this".to_string()];
        assert!(cmd_play(&rt, &fast_config(), &path, &queries, &PlayOptions::default()).is_err());
    }
}
