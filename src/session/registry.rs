//! Process-wide registry of live shell sessions.
//!
//! Purely diagnostic: sessions register on spawn and deregister when
//! closed, so leaked shells show up in [`live_session_count`].

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use super::SessionId;

/// Snapshot of one live session.
#[derive(Debug, Clone)]
pub struct LiveSession {
    /// Session identifier.
    pub id: SessionId,
    /// Shell process id (also its process group id).
    pub pid: u32,
    /// Execution context that owns the session, if any.
    pub owner: Option<String>,
    /// Time the session was spawned.
    pub created_at: Instant,
}

impl LiveSession {
    /// Time since the session was spawned.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

static LIVE: RwLock<BTreeMap<SessionId, LiveSession>> = RwLock::new(BTreeMap::new());

pub(crate) fn register(entry: LiveSession) {
    let mut live = LIVE.write().unwrap_or_else(|e| e.into_inner());
    live.insert(entry.id, entry);
}

pub(crate) fn deregister(id: SessionId) -> bool {
    let mut live = LIVE.write().unwrap_or_else(|e| e.into_inner());
    live.remove(&id).is_some()
}

/// Number of sessions spawned and not yet closed.
pub fn live_session_count() -> usize {
    LIVE.read().map(|live| live.len()).unwrap_or(0)
}

/// Snapshot of all live sessions, ordered by id.
pub fn live_sessions() -> Vec<LiveSession> {
    LIVE.read()
        .map(|live| live.values().cloned().collect())
        .unwrap_or_default()
}

/// Whether the given session is still registered.
pub fn is_live(id: SessionId) -> bool {
    LIVE.read().map(|live| live.contains_key(&id)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: SessionId) -> LiveSession {
        LiveSession {
            id,
            pid: 1,
            owner: Some("test".into()),
            created_at: Instant::now(),
        }
    }

    #[test]
    fn test_register_and_deregister() {
        let id = SessionId::new();
        register(entry(id));
        assert!(is_live(id));
        assert!(live_sessions().iter().any(|s| s.id == id));

        assert!(deregister(id));
        assert!(!is_live(id));
        assert!(!deregister(id));
    }
}
