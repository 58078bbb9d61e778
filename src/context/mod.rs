//! Execution contexts and their shell bindings.
//!
//! Every context owns at most one live session. Library callers use the
//! thread-bound free functions ([`get_shell`], [`start_background_job`],
//! ...); the server keeps one context per conversation in a
//! [`ConversationRegistry`].

mod current;
mod execution;
pub mod hooks;
mod registry;

pub use current::{
    bind_context, cleanup_shell, current_context, get_background_job, get_shell,
    list_background_jobs, reset_background_jobs, set_default_shell_config, set_shell,
    start_background_job, unbind_context,
};
pub use execution::ExecutionContext;
pub use registry::ConversationRegistry;
