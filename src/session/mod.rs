//! Session management module.
//!
//! A [`ShellSession`] owns one long-lived shell process and its three
//! pipes. Sessions are tracked in a process-wide registry for leak
//! diagnostics.

mod drain;
mod id;
mod process;
mod registry;
mod shell;
mod state;

pub use id::SessionId;
pub use process::{ShellConfig, DEFAULT_SHELL};
pub use registry::{is_live, live_session_count, live_sessions, LiveSession};
pub use shell::ShellSession;
pub use state::SessionState;

pub(crate) use process::{exit_code, signal_group, spawn_oneshot, terminate};
