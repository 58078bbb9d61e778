//! Execution result types.

use std::time::Duration;

/// Return code reported for an interrupted command.
pub const INTERRUPTED_RETURNCODE: i32 = 130;

/// Return code reported when a command exceeds its timeout.
pub const TIMED_OUT_RETURNCODE: i32 = -124;

/// Return code reported when the shell could not be talked to.
pub const ERROR_RETURNCODE: i32 = -1;

/// Result of running a command in a shell session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit status of the last statement, if one was observed.
    pub returncode: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the command was stopped by an interrupt.
    pub interrupted: bool,
    /// Whether the command was stopped by its timeout.
    pub timed_out: bool,
    /// Wall-clock execution time.
    pub duration: Duration,
}

impl CommandResult {
    /// Create a result for a command that ran to completion.
    pub fn new(returncode: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            returncode,
            stdout,
            stderr,
            ..Default::default()
        }
    }

    /// Create a result for an interrupted command, keeping partial output.
    pub fn interrupted(stdout: String, stderr: String) -> Self {
        Self {
            returncode: Some(INTERRUPTED_RETURNCODE),
            stdout,
            stderr,
            interrupted: true,
            ..Default::default()
        }
    }

    /// Create a result for a command that hit its timeout.
    pub fn timed_out(stdout: String, stderr: String) -> Self {
        Self {
            returncode: Some(TIMED_OUT_RETURNCODE),
            stdout,
            stderr,
            timed_out: true,
            ..Default::default()
        }
    }

    /// Create a result for a transient failure talking to the shell.
    pub fn error(stdout: String, stderr: String) -> Self {
        Self::new(Some(ERROR_RETURNCODE), stdout, stderr)
    }

    /// Set the execution duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Check if command succeeded (return code 0).
    pub fn success(&self) -> bool {
        self.returncode == Some(0)
    }

    /// Check if command failed (non-zero return code, interrupt, or timeout).
    pub fn failed(&self) -> bool {
        self.interrupted || self.timed_out || matches!(self.returncode, Some(c) if c != 0)
    }

    /// Get stdout trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}
