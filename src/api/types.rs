//! API request and response types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::execution::Execution;
use crate::jobs::BackgroundJob;
use crate::session::{LiveSession, SessionState};
use crate::validation::ValidationFinding;

/// Request to split a script into commands.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitRequest {
    pub script: String,
}

/// Top-level commands of a script, in order.
#[derive(Debug, Clone, Serialize)]
pub struct SplitResponse {
    pub count: usize,
    pub commands: Vec<String>,
}

/// Request to run a command in a conversation's shell.
#[derive(Debug, Clone, Deserialize)]
pub struct RunCommandRequest {
    /// The command line or script to run.
    pub command: String,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Hide raw output; the server default applies when unset.
    #[serde(default)]
    pub quiet: Option<bool>,
}

impl RunCommandRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Response for a command run.
#[derive(Debug, Clone, Serialize)]
pub struct RunCommandResponse {
    /// Rendered text for the agent.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    pub interrupted: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    /// Warn-mode findings.
    pub findings: Vec<ValidationFinding>,
    /// The command was a pipeline of read-only inspection commands.
    pub read_only: bool,
}

impl RunCommandResponse {
    pub fn from_execution(execution: Execution) -> Self {
        Self {
            output: execution.output,
            returncode: execution.result.returncode,
            interrupted: execution.result.interrupted,
            timed_out: execution.result.timed_out,
            duration_ms: execution.result.duration.as_millis() as u64,
            findings: execution.findings,
            read_only: execution.read_only,
        }
    }
}

/// Status of a conversation and its shell.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStatusResponse {
    pub conversation_id: String,
    /// The bound session, if one has been started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionStatus>,
    pub background_jobs: usize,
}

/// A live session as seen by the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub pid: u32,
    pub state: String,
    /// Working directory; only reported while the shell is idle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    pub age_seconds: f64,
}

impl SessionStatus {
    pub fn new(
        session_id: impl ToString,
        pid: u32,
        state: SessionState,
        cwd: Option<String>,
        age: Duration,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            pid,
            state: format!("{:?}", state),
            cwd,
            age_seconds: age.as_secs_f64(),
        }
    }
}

/// Response for an interrupt request.
#[derive(Debug, Clone, Serialize)]
pub struct InterruptResponse {
    /// Whether a running command was signalled.
    pub interrupted: bool,
}

/// Request to start a background job.
#[derive(Debug, Clone, Deserialize)]
pub struct StartJobRequest {
    pub command: String,
}

/// A background job and, optionally, its output so far.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub job_id: u64,
    pub command: String,
    pub pid: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
    pub running: bool,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl JobResponse {
    pub fn from_job(job: &BackgroundJob) -> Self {
        Self {
            job_id: job.id(),
            command: job.command().to_string(),
            pid: job.pid(),
            status: job.status().to_string(),
            returncode: job.returncode(),
            running: job.is_running(),
            elapsed_seconds: job.started_at().elapsed().as_secs_f64(),
            stdout: None,
            stderr: None,
        }
    }

    /// Include the captured output.
    pub fn with_output(mut self, job: &BackgroundJob) -> Self {
        let output = job.get_output();
        self.stdout = Some(output.stdout);
        self.stderr = Some(output.stderr);
        self
    }
}

/// List jobs response.
#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub count: usize,
    pub jobs: Vec<JobResponse>,
}

/// Response for a job table reset.
#[derive(Debug, Clone, Serialize)]
pub struct ResetJobsResponse {
    /// Jobs that were still running and got killed.
    pub killed: usize,
}

/// Process-wide live session diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub live_sessions: usize,
    pub conversations: usize,
    pub sessions: Vec<LiveSessionSummary>,
}

/// Brief live session summary.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSessionSummary {
    pub session_id: String,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub age_seconds: f64,
}

impl From<&LiveSession> for LiveSessionSummary {
    fn from(live: &LiveSession) -> Self {
        Self {
            session_id: live.id.to_string(),
            pid: live.pid,
            owner: live.owner.clone(),
            age_seconds: live.age().as_secs_f64(),
        }
    }
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "CONVERSATION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn conversation_not_found(id: &str) -> Self {
        Self::new(
            "CONVERSATION_NOT_FOUND",
            format!("Conversation '{}' not found", id),
        )
    }

    pub fn job_not_found(id: u64) -> Self {
        Self::new("JOB_NOT_FOUND", format!("Background job {} not found", id))
    }

    pub fn not_ready(state: SessionState) -> Self {
        Self::new(
            "SESSION_NOT_READY",
            format!("Session is in {:?} state and cannot run commands", state),
        )
    }

    /// Strict-mode rejection; `advisory` lists the findings.
    pub fn validation_blocked(advisory: impl Into<String>) -> Self {
        Self::new("VALIDATION_BLOCKED", "Command blocked by strict validation")
            .with_details(advisory)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_defaults() {
        let req: RunCommandRequest = serde_json::from_str(r#"{"command": "ls"}"#).unwrap();
        assert_eq!(req.command, "ls");
        assert!(req.timeout().is_none());
        assert!(req.quiet.is_none());
    }

    #[test]
    fn test_run_request_with_fields() {
        let json = r#"{"command": "make", "timeout_secs": 30, "quiet": true}"#;
        let req: RunCommandRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(req.quiet, Some(true));
    }

    #[test]
    fn test_error_response_serialization() {
        let err = ErrorResponse::new("TEST_ERROR", "Test message");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("TEST_ERROR"));
        assert!(json.contains("Test message"));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_validation_blocked_carries_advisory() {
        let err = ErrorResponse::validation_blocked("- [python_invocation] use python3");
        assert_eq!(err.code, "VALIDATION_BLOCKED");
        assert_eq!(
            err.details.as_deref(),
            Some("- [python_invocation] use python3")
        );
    }

    #[test]
    fn test_session_status_state_name() {
        let status = SessionStatus::new(
            "shell-00000001",
            42,
            SessionState::Ready,
            None,
            Duration::from_millis(1500),
        );
        assert_eq!(status.state, "Ready");
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("cwd"));
        assert!(json.contains("1.5"));
    }
}
