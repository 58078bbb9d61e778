//! HTTP API for shell-tether.
//!
//! Each conversation id maps to one execution context: a persistent shell
//! plus its background jobs.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information
//! - `GET /api/v1/diagnostics` - Live sessions across the process
//!
//! ### Scripts
//! - `POST /api/v1/split` - Split a script into top-level commands
//!
//! ### Conversations
//! - `GET /api/v1/conversations/{id}` - Session status
//! - `DELETE /api/v1/conversations/{id}` - Close shell and jobs
//! - `POST /api/v1/conversations/{id}/run` - Run a command
//! - `POST /api/v1/conversations/{id}/interrupt` - Interrupt the running command
//!
//! ### Background jobs
//! - `GET /api/v1/conversations/{id}/jobs` - List jobs
//! - `POST /api/v1/conversations/{id}/jobs` - Start a job
//! - `DELETE /api/v1/conversations/{id}/jobs` - Kill and forget all jobs
//! - `GET /api/v1/conversations/{id}/jobs/{job_id}` - Job status and output
//!
//! ## Example
//!
//! ```no_run
//! use shell_tether::api::{ServerConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> shell_tether::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 3000);
//!     serve(config).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::AppState;
pub use router::{create_router, create_router_with_state, serve, serve_with_state, ServerConfig};
pub use types::{
    ConversationStatusResponse, DiagnosticsResponse, ErrorResponse, JobResponse,
    ListJobsResponse, RunCommandRequest, RunCommandResponse, SessionStatus, SplitRequest,
    SplitResponse, StartJobRequest,
};
