//! # shell-tether
//!
//! Persistent shell sessions for AI coding agents.
//!
//! An agent's commands run in one long-lived shell per execution context,
//! so `cd`, exported variables and shell functions carry over between
//! calls. Output is captured per command with separate stdout and stderr,
//! commands can be interrupted or time out without losing the session,
//! and everything is released when the context ends.
//!
//! ## Features
//!
//! - **Persistent sessions**: one shell per context, replaced if it dies
//! - **Interrupt and timeout**: partial output is kept, the shell survives
//! - **Script splitting**: heredoc and block aware top-level command split
//! - **Background jobs**: per-context numbered `<shell> -c` processes
//! - **Command validation**: advisory or blocking checks before execution
//! - **HTTP API**: one context per conversation id
//!
//! ## Quick Start
//!
//! ```no_run
//! use shell_tether::context::get_shell;
//!
//! fn main() -> shell_tether::Result<()> {
//!     let shell = get_shell()?;
//!     shell.run("cd /tmp", None)?;
//!     let result = shell.run("pwd", None)?;
//!     assert_eq!(result.stdout_trimmed(), "/tmp");
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("shell-tether requires a Unix platform");

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod jobs;
pub mod logging;
pub mod output;
pub mod script;
pub mod session;
pub mod validation;

// Re-export commonly used types
pub use context::{ConversationRegistry, ExecutionContext};
pub use error::{Result, ShellTetherError};
pub use execution::{CommandExecutor, CommandResult, Execution, ShellCommand};
pub use jobs::{BackgroundJob, JobStatus};
pub use output::{OutputPresenter, OutputSanitizer};
pub use script::split_commands;
pub use session::{SessionId, SessionState, ShellConfig, ShellSession};
pub use validation::{CommandValidator, ValidationMode};
