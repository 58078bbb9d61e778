//! The calling thread's execution context.
//!
//! Each thread lazily gets its own [`ExecutionContext`]; the free
//! functions here operate on it, so two threads never share a shell.
//! The context is torn down when the thread exits.

use std::cell::RefCell;
use std::sync::{Arc, RwLock};

use super::ExecutionContext;
use crate::jobs::BackgroundJob;
use crate::session::{ShellConfig, ShellSession};
use crate::Result;

thread_local! {
    static CURRENT: RefCell<Option<Arc<ExecutionContext>>> = const { RefCell::new(None) };
}

/// Shell settings for lazily created thread contexts.
static DEFAULT_CONFIG: RwLock<Option<ShellConfig>> = RwLock::new(None);

/// Set the shell settings used by contexts created after this call.
pub fn set_default_shell_config(config: ShellConfig) {
    let mut slot = DEFAULT_CONFIG.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(config);
}

fn default_config() -> ShellConfig {
    DEFAULT_CONFIG
        .read()
        .ok()
        .and_then(|c| c.clone())
        .unwrap_or_default()
}

/// The calling thread's context, created on first use.
pub fn current_context() -> Arc<ExecutionContext> {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        match current.as_ref() {
            Some(ctx) => Arc::clone(ctx),
            None => {
                let key = format!("{:?}", std::thread::current().id());
                let ctx = Arc::new(ExecutionContext::new(key, default_config()));
                *current = Some(Arc::clone(&ctx));
                ctx
            }
        }
    })
}

/// Make `ctx` the calling thread's context; returns the previous one.
pub fn bind_context(ctx: Arc<ExecutionContext>) -> Option<Arc<ExecutionContext>> {
    CURRENT.with(|current| current.borrow_mut().replace(ctx))
}

/// Detach the calling thread's context without tearing it down.
pub fn unbind_context() -> Option<Arc<ExecutionContext>> {
    CURRENT.with(|current| current.borrow_mut().take())
}

/// Session for the calling context, spawned on first use.
pub fn get_shell() -> Result<Arc<ShellSession>> {
    current_context().get_shell()
}

/// Bind an explicit session to the calling context.
pub fn set_shell(shell: Option<Arc<ShellSession>>) -> Result<()> {
    current_context().set_shell(shell)
}

/// Close the calling context's session.
pub fn cleanup_shell() -> Result<bool> {
    current_context().cleanup_shell()
}

pub fn start_background_job(command: &str) -> Result<Arc<BackgroundJob>> {
    current_context().start_background_job(command)
}

pub fn get_background_job(id: u64) -> Result<Arc<BackgroundJob>> {
    current_context().get_background_job(id)
}

pub fn list_background_jobs() -> Result<Vec<Arc<BackgroundJob>>> {
    current_context().list_background_jobs()
}

pub fn reset_background_jobs() -> Result<usize> {
    current_context().reset_background_jobs()
}
