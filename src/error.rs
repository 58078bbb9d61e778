//! Error types for shell-tether.

use thiserror::Error;

use crate::session::SessionState;

/// Main error type for shell-tether operations.
#[derive(Error, Debug)]
pub enum ShellTetherError {
    /// The shell process could not be started.
    #[error("failed to spawn shell `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `run()` was called while the session was busy or closed.
    #[error("session not ready: current state is {0:?}")]
    SessionNotReady(SessionState),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },

    /// Strict-mode validation rejected the command before execution.
    #[error("command blocked by validation:\n{0}")]
    ValidationBlocked(String),

    /// Background job with the given id does not exist in this context.
    #[error("background job not found: {0}")]
    JobNotFound(u64),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

/// Convenience Result type for shell-tether operations.
pub type Result<T> = std::result::Result<T, ShellTetherError>;
