//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::types::{
    ConversationStatusResponse, DiagnosticsResponse, ErrorResponse, InterruptResponse,
    JobResponse, ListJobsResponse, LiveSessionSummary, ResetJobsResponse, RunCommandRequest,
    RunCommandResponse, SessionStatus, SplitRequest, SplitResponse, StartJobRequest,
};
use crate::context::{hooks, ConversationRegistry};
use crate::error::ShellTetherError;
use crate::execution::{CommandExecutor, ShellCommand};
use crate::script::split_commands;
use crate::session::live_sessions;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConversationRegistry>,
    pub executor: Arc<CommandExecutor>,
    /// Quiet mode for run requests that do not choose.
    pub quiet_default: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_parts(ConversationRegistry::default(), CommandExecutor::default())
    }

    pub fn with_parts(registry: ConversationRegistry, executor: CommandExecutor) -> Self {
        Self {
            registry: Arc::new(registry),
            executor: Arc::new(executor),
            quiet_default: false,
        }
    }

    pub fn with_quiet_default(mut self, quiet: bool) -> Self {
        self.quiet_default = quiet;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error(e: ShellTetherError) -> ApiError {
    match e {
        ShellTetherError::ValidationBlocked(advisory) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::validation_blocked(advisory)),
        ),
        ShellTetherError::SessionNotReady(state) => {
            (StatusCode::CONFLICT, Json(ErrorResponse::not_ready(state)))
        }
        ShellTetherError::JobNotFound(id) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::job_not_found(id)))
        }
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal_error(other.to_string())),
        ),
    }
}

fn not_found(conversation_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::conversation_not_found(conversation_id)),
    )
}

/// Run session work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
        })?
        .map_err(api_error)
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "shell-tether",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Split a script into top-level commands.
pub async fn split_script(Json(req): Json<SplitRequest>) -> Json<SplitResponse> {
    let commands = split_commands(&req.script);
    Json(SplitResponse {
        count: commands.len(),
        commands,
    })
}

/// Run a command in the conversation's shell, creating it on first use.
pub async fn run_command(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<RunCommandRequest>,
) -> Result<Json<RunCommandResponse>, ApiError> {
    let mut cmd = ShellCommand::new(&req.command).quiet(req.quiet.unwrap_or(state.quiet_default));
    if let Some(timeout) = req.timeout() {
        cmd = cmd.timeout(timeout);
    }

    let ctx = state
        .registry
        .get_or_create(&conversation_id)
        .map_err(api_error)?;
    let executor = Arc::clone(&state.executor);
    let execution = blocking(move || executor.execute(&ctx, &cmd)).await?;

    Ok(Json(RunCommandResponse::from_execution(execution)))
}

/// Interrupt the conversation's running command.
pub async fn interrupt(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<InterruptResponse>, ApiError> {
    let ctx = state
        .registry
        .get(&conversation_id)
        .map_err(api_error)?
        .ok_or_else(|| not_found(&conversation_id))?;
    let interrupted = ctx.current_shell().is_some_and(|shell| shell.interrupt());
    Ok(Json(InterruptResponse { interrupted }))
}

/// Conversation status: bound session and job count.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationStatusResponse>, ApiError> {
    let ctx = state
        .registry
        .get(&conversation_id)
        .map_err(api_error)?
        .ok_or_else(|| not_found(&conversation_id))?;

    let response = blocking(move || {
        let session = ctx.current_shell().map(|shell| {
            let cwd = shell.cwd().map(|p| p.display().to_string());
            SessionStatus::new(shell.id(), shell.pid(), shell.state(), cwd, shell.age())
        });
        Ok(ConversationStatusResponse {
            conversation_id: ctx.key().to_string(),
            session,
            background_jobs: ctx.list_background_jobs()?.len(),
        })
    })
    .await?;

    Ok(Json(response))
}

/// Conversation ended: close its shell and background jobs.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let registry = Arc::clone(&state.registry);
    let id = conversation_id.clone();
    let removed = blocking(move || hooks::session_end(&registry, &id)).await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&conversation_id))
    }
}

/// Start a background job.
pub async fn start_job(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Json(req): Json<StartJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), ApiError> {
    let ctx = state
        .registry
        .get_or_create(&conversation_id)
        .map_err(api_error)?;
    let job = blocking(move || ctx.start_background_job(&req.command)).await?;
    Ok((StatusCode::CREATED, Json(JobResponse::from_job(&job))))
}

/// List the conversation's background jobs.
pub async fn list_jobs(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let jobs = match state.registry.get(&conversation_id).map_err(api_error)? {
        Some(ctx) => ctx.list_background_jobs().map_err(api_error)?,
        None => Vec::new(),
    };
    let jobs: Vec<JobResponse> = jobs.iter().map(|job| JobResponse::from_job(job)).collect();
    Ok(Json(ListJobsResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// One background job with its output so far.
pub async fn get_job(
    State(state): State<AppState>,
    Path((conversation_id, job_id)): Path<(String, u64)>,
) -> Result<Json<JobResponse>, ApiError> {
    let ctx = state
        .registry
        .get(&conversation_id)
        .map_err(api_error)?
        .ok_or_else(|| not_found(&conversation_id))?;
    let job = ctx.get_background_job(job_id).map_err(api_error)?;
    Ok(Json(JobResponse::from_job(&job).with_output(&job)))
}

/// Kill and forget every background job of the conversation.
pub async fn reset_jobs(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ResetJobsResponse>, ApiError> {
    let Some(ctx) = state.registry.get(&conversation_id).map_err(api_error)? else {
        return Ok(Json(ResetJobsResponse { killed: 0 }));
    };
    let killed = blocking(move || ctx.reset_background_jobs()).await?;
    Ok(Json(ResetJobsResponse { killed }))
}

/// Live sessions across the whole process.
pub async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let sessions: Vec<LiveSessionSummary> =
        live_sessions().iter().map(LiveSessionSummary::from).collect();
    Json(DiagnosticsResponse {
        live_sessions: sessions.len(),
        conversations: state.registry.count(),
        sessions,
    })
}
