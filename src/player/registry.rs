//! Process-wide map from session key to session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::session::{PlaybackSession, SessionSettings};
use super::state::PlaybackStatus;
use crate::resolver::Resolver;

/// Identifies one playback session (one guild, room, etc).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<u64> for SessionKey {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Lazily creates one [`PlaybackSession`] per key.
///
/// Lookups and creation are safe from any thread; two callers asking for
/// the same new key get the same session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionKey, PlaybackSession>>,
    resolver: Arc<dyn Resolver>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<dyn Resolver>, settings: SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            resolver,
            settings,
        }
    }

    /// The session for `key`, created on first use.
    ///
    /// A session that was disconnected is replaced with a fresh one.
    pub fn get(&self, key: impl Into<SessionKey>) -> PlaybackSession {
        let key = key.into();

        {
            let sessions = self.sessions.read();
            if let Some(session) = sessions.get(&key)
                && session.status() != PlaybackStatus::Closed
            {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write();
        match sessions.get(&key) {
            Some(session) if session.status() != PlaybackStatus::Closed => session.clone(),
            _ => {
                tracing::debug!(session = %key, "Creating session");
                let session = PlaybackSession::new(key.clone(), self.resolver.clone(), self.settings);
                sessions.insert(key, session.clone());
                session
            }
        }
    }

    /// Look up without creating.
    pub fn find(&self, key: &SessionKey) -> Option<PlaybackSession> {
        self.sessions.read().get(key).cloned()
    }

    /// Forget a session without touching its output.
    pub fn remove(&self, key: &SessionKey) -> Option<PlaybackSession> {
        self.sessions.write().remove(key)
    }

    /// Disconnect and forget a session. Returns false if it didn't exist.
    pub fn disconnect(&self, key: &SessionKey) -> bool {
        // Map lock is released before the session does any output I/O.
        match self.remove(key) {
            Some(session) => {
                session.disconnect();
                true
            }
            None => false,
        }
    }

    /// Disconnect every session.
    pub fn shutdown(&self) {
        let sessions: Vec<PlaybackSession> = self.sessions.write().drain().map(|(_, s)| s).collect();
        tracing::info!(count = sessions.len(), "Shutting down sessions");
        for session in sessions {
            session.disconnect();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Keys of all known sessions, sorted.
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.sessions.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}
