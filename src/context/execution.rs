//! Execution context: the unit that owns at most one shell session.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::error::ShellTetherError;
use crate::jobs::{BackgroundJob, BackgroundJobsState};
use crate::session::{ShellConfig, ShellSession};
use crate::Result;

/// One independent line of work (a conversation, a thread, a test).
///
/// Owns at most one live [`ShellSession`], created lazily, and a table of
/// background jobs. Dropping the context closes both.
pub struct ExecutionContext {
    key: String,
    config: ShellConfig,
    shell: Mutex<Option<Arc<ShellSession>>>,
    jobs: Mutex<BackgroundJobsState>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("key", &self.key)
            .field("program", &self.config.program)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(key: impl Into<String>, config: ShellConfig) -> Self {
        Self {
            key: key.into(),
            config,
            shell: Mutex::new(None),
            jobs: Mutex::new(BackgroundJobsState::new()),
        }
    }

    /// Context key (conversation id, thread name, ...).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shell settings used for new sessions and background jobs.
    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    fn lock_shell(&self) -> Result<MutexGuard<'_, Option<Arc<ShellSession>>>> {
        self.shell.lock().map_err(|_| ShellTetherError::LockPoisoned)
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, BackgroundJobsState>> {
        self.jobs.lock().map_err(|_| ShellTetherError::LockPoisoned)
    }

    /// The context's session, spawning one if there is none or the
    /// previous shell has died.
    pub fn get_shell(&self) -> Result<Arc<ShellSession>> {
        let mut slot = self.lock_shell()?;
        if let Some(shell) = slot.as_ref() {
            if shell.is_alive() {
                return Ok(Arc::clone(shell));
            }
            debug!(context = %self.key, session = %shell.id(), "replacing dead shell");
            shell.close()?;
        }

        let shell = Arc::new(ShellSession::spawn_owned(
            &self.config,
            Some(self.key.clone()),
        )?);
        *slot = Some(Arc::clone(&shell));
        Ok(shell)
    }

    /// The bound session without spawning one.
    pub fn current_shell(&self) -> Option<Arc<ShellSession>> {
        self.shell.lock().ok().and_then(|slot| slot.clone())
    }

    /// Bind an explicit session, or unbind with `None`.
    ///
    /// A different session that was bound before is closed.
    pub fn set_shell(&self, shell: Option<Arc<ShellSession>>) -> Result<()> {
        let previous = {
            let mut slot = self.lock_shell()?;
            std::mem::replace(&mut *slot, shell.clone())
        };
        if let Some(previous) = previous {
            let rebound = shell.as_ref().is_some_and(|s| Arc::ptr_eq(s, &previous));
            if !rebound {
                previous.close()?;
            }
        }
        Ok(())
    }

    /// Close and unbind the session. Returns whether one was bound.
    pub fn cleanup_shell(&self) -> Result<bool> {
        let shell = self.lock_shell()?.take();
        match shell {
            Some(shell) => {
                shell.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn start_background_job(&self, command: &str) -> Result<Arc<BackgroundJob>> {
        self.lock_jobs()?.start(&self.config, command)
    }

    pub fn get_background_job(&self, id: u64) -> Result<Arc<BackgroundJob>> {
        self.lock_jobs()?
            .get(id)
            .ok_or(ShellTetherError::JobNotFound(id))
    }

    pub fn list_background_jobs(&self) -> Result<Vec<Arc<BackgroundJob>>> {
        Ok(self.lock_jobs()?.list())
    }

    /// Kill and forget every job; numbering restarts at 1.
    pub fn reset_background_jobs(&self) -> Result<usize> {
        Ok(self.lock_jobs()?.reset())
    }

    /// Close the session and reset background jobs.
    pub fn teardown(&self) -> Result<()> {
        let closed = self.cleanup_shell()?;
        let killed = self.reset_background_jobs()?;
        debug!(context = %self.key, closed, killed, "context torn down");
        Ok(())
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(context = %self.key, "failed to tear down context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn context() -> ExecutionContext {
        ExecutionContext::new("test", ShellConfig::default())
    }

    #[test]
    fn test_get_shell_is_lazy_and_stable() {
        let ctx = context();
        assert!(ctx.current_shell().is_none());
        let first = ctx.get_shell().unwrap();
        let second = ctx.get_shell().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_dead_shell_is_replaced() {
        let ctx = context();
        let first = ctx.get_shell().unwrap();
        first.run("exit 0", None).unwrap();
        let second = ctx.get_shell().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.is_alive());
    }

    #[test]
    fn test_set_shell_closes_previous() {
        let ctx = context();
        let old = ctx.get_shell().unwrap();
        let new = Arc::new(ShellSession::spawn(&ShellConfig::default()).unwrap());
        ctx.set_shell(Some(Arc::clone(&new))).unwrap();
        assert!(!old.is_alive());
        assert!(Arc::ptr_eq(&ctx.get_shell().unwrap(), &new));

        ctx.set_shell(Some(Arc::clone(&new))).unwrap();
        assert!(new.is_alive());
    }

    #[test]
    fn test_cleanup_shell() {
        let ctx = context();
        let shell = ctx.get_shell().unwrap();
        shell.run("cd /tmp", None).unwrap();
        assert!(ctx.cleanup_shell().unwrap());
        assert!(!shell.is_alive());
        assert!(!ctx.cleanup_shell().unwrap());

        let fresh = ctx.get_shell().unwrap();
        assert_ne!(fresh.cwd(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_job_lookup() {
        let ctx = context();
        let job = ctx.start_background_job("echo hi").unwrap();
        assert_eq!(job.id(), 1);
        assert_eq!(ctx.get_background_job(1).unwrap().id(), 1);
        assert!(matches!(
            ctx.get_background_job(7),
            Err(ShellTetherError::JobNotFound(7))
        ));
        assert_eq!(ctx.list_background_jobs().unwrap().len(), 1);
        ctx.reset_background_jobs().unwrap();
        assert!(ctx.list_background_jobs().unwrap().is_empty());
    }
}
