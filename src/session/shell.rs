//! A persistent shell process driven over pipes.

use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::drain::{drain_until, DrainEnd};
use super::process::{self, ShellConfig};
use super::registry::{self, LiveSession};
use super::{SessionId, SessionState};
use crate::error::ShellTetherError;
use crate::execution::CommandResult;
use crate::script::split_commands;
use crate::Result;

/// Sent once after spawn.
///
/// Statements run inside `__tether_run`, so an interrupt makes the trap
/// return from the whole statement while the shell itself survives.
const INIT_SCRIPT: &str = "trap 'return 130 2>/dev/null' INT\n\
                           __tether_run() { eval \"$__tether_cmd\"; }\n";

/// How long to wait for an abandoned statement's delimiter.
const RECOVERY_GRACE: Duration = Duration::from_millis(500);

/// How long processes left running get after each escalation signal.
const ESCALATION_GRACE: Duration = Duration::from_secs(1);

/// How long a closing shell gets between SIGTERM and SIGKILL.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Wrap one statement so its output ends with a delimiter on each stream.
///
/// The statement travels through a quoted heredoc, so it is never
/// expanded before `eval`, and a syntax error only fails the eval.
fn wrap_statement(statement: &str, marker: &str) -> String {
    format!(
        "__tether_cmd=$(cat <<'{marker}_IN'\n\
         {statement}\n\
         {marker}_IN\n\
         )\n\
         __tether_run < /dev/null\n\
         __tether_rc=$?\n\
         printf '%s:%s\\n' '{marker}' \"$__tether_rc\"\n\
         printf '%s\\n' '{marker}' >&2\n"
    )
}

struct SessionIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl SessionIo {
    fn send(&mut self, script: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "shell input closed"))?;
        stdin.write_all(script.as_bytes())?;
        stdin.flush()
    }

    fn is_running(&mut self) -> bool {
        self.stdout.is_some() && matches!(self.child.try_wait(), Ok(None))
    }

    fn is_released(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }

    fn raw_fds(&self) -> Vec<RawFd> {
        let mut fds = Vec::with_capacity(3);
        if let Some(stdin) = &self.stdin {
            fds.push(stdin.as_raw_fd());
        }
        if let Some(stdout) = &self.stdout {
            fds.push(stdout.as_raw_fd());
        }
        if let Some(stderr) = &self.stderr {
            fds.push(stderr.as_raw_fd());
        }
        fds
    }

    /// Stop the process, reap it, and close every pipe. Idempotent.
    fn release(&mut self, grace: Duration) {
        if self.is_released() {
            return;
        }
        drop(self.stdin.take());
        let status = process::terminate(&mut self.child, grace);
        drop(self.stdout.take());
        drop(self.stderr.take());
        debug!(pid = self.child.id(), ?status, "shell process released");
    }
}

/// A long-lived shell whose state (cwd, variables, functions) persists
/// across [`run`](Self::run) calls.
///
/// Sessions are shared behind an `Arc`: [`interrupt`](Self::interrupt)
/// and [`close`](Self::close) may be called from other threads while a
/// command runs.
pub struct ShellSession {
    id: SessionId,
    pid: u32,
    program: String,
    created_at: Instant,
    state: Mutex<SessionState>,
    cancel: AtomicBool,
    io: Mutex<SessionIo>,
    runs: AtomicU64,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("state", &self.state())
            .finish()
    }
}

impl ShellSession {
    /// Spawn a new shell session.
    pub fn spawn(config: &ShellConfig) -> Result<Self> {
        Self::spawn_owned(config, None)
    }

    /// Spawn a new shell session on behalf of `owner` (shown in diagnostics).
    pub fn spawn_owned(config: &ShellConfig, owner: Option<String>) -> Result<Self> {
        let id = SessionId::new();
        let mut state = SessionState::default();

        let mut child = process::spawn_interactive(config)?;
        let pid = child.id();
        let mut io = SessionIo {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
        };

        if io.stdin.is_none() || io.stdout.is_none() || io.stderr.is_none() {
            io.release(CLOSE_GRACE);
            return Err(ShellTetherError::Io(io::Error::other("shell pipes unavailable")));
        }
        if let Err(source) = io.send(INIT_SCRIPT) {
            io.release(CLOSE_GRACE);
            return Err(ShellTetherError::SpawnFailed {
                program: config.program.clone(),
                source,
            });
        }

        state.transition_to(SessionState::Ready)?;
        let created_at = Instant::now();
        registry::register(LiveSession {
            id,
            pid,
            owner,
            created_at,
        });
        info!(session = %id, pid, program = %config.program, "shell session started");

        Ok(Self {
            id,
            pid,
            program: config.program.clone(),
            created_at,
            state: Mutex::new(state),
            cancel: AtomicBool::new(false),
            io: Mutex::new(io),
            runs: AtomicU64::new(0),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Shell process id, which is also its process group id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Time since the session was spawned.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Closed)
    }

    /// Whether the shell process is still usable.
    pub fn is_alive(&self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        match self.io.try_lock() {
            Ok(mut io) => io.is_running(),
            // Held by a running command.
            Err(std::sync::TryLockError::WouldBlock) => true,
            Err(std::sync::TryLockError::Poisoned(_)) => false,
        }
    }

    /// Descriptors of the pipes this session currently holds open.
    pub fn raw_fds(&self) -> Vec<RawFd> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner).raw_fds()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>> {
        self.state.lock().map_err(|_| ShellTetherError::LockPoisoned)
    }

    fn set_state(&self, target: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            if let Err(e) = state.transition_to(target) {
                debug!(session = %self.id, "{}", e);
            }
        }
    }

    fn next_marker(&self) -> String {
        let seq = self.runs.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("__SHELL_TETHER_{}_{}_{}__", self.id.as_u64(), seq, nanos)
    }

    /// Run a command (possibly a multi-line script) and wait for it.
    ///
    /// Statements are sent one at a time; output of all statements is
    /// concatenated and the return code is that of the last one. Fails
    /// with [`ShellTetherError::SessionNotReady`] if another command is
    /// in flight or the session is closed.
    pub fn run(&self, command: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        {
            let mut state = self.lock_state()?;
            if !state.can_execute() {
                return Err(ShellTetherError::SessionNotReady(*state));
            }
            // Cleared under the lock so an interrupt seen as Executing sticks.
            self.cancel.store(false, Ordering::SeqCst);
            state.transition_to(SessionState::Executing)?;
        }

        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);
        debug!(session = %self.id, command, ?timeout, "running command");

        let mut io = match self.io.lock() {
            Ok(io) => io,
            Err(poisoned) => {
                warn!(session = %self.id, "session io lock poisoned, closing session");
                poisoned.into_inner().release(CLOSE_GRACE);
                registry::deregister(self.id);
                self.set_state(SessionState::Closed);
                return Err(ShellTetherError::LockPoisoned);
            }
        };
        let (result, alive) = self.execute(&mut io, command, deadline);
        if !alive {
            warn!(session = %self.id, "shell process exited, closing session");
            io.release(CLOSE_GRACE);
            registry::deregister(self.id);
        }
        drop(io);

        self.set_state(if alive {
            SessionState::Ready
        } else {
            SessionState::Closed
        });

        let result = result.with_duration(start.elapsed());
        debug!(
            session = %self.id,
            returncode = ?result.returncode,
            interrupted = result.interrupted,
            timed_out = result.timed_out,
            "command finished in {:?}",
            result.duration
        );
        Ok(result)
    }

    /// Returns the result and whether the shell survived.
    fn execute(
        &self,
        io: &mut SessionIo,
        command: &str,
        deadline: Option<Instant>,
    ) -> (CommandResult, bool) {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut returncode = Some(0);

        for statement in split_commands(command) {
            if self.cancel.load(Ordering::SeqCst) {
                self.set_state(SessionState::Interrupted);
                return (CommandResult::interrupted(stdout, stderr), true);
            }

            let marker = self.next_marker();
            if let Err(e) = io.send(&wrap_statement(&statement, &marker)) {
                warn!(session = %self.id, "failed to write to shell: {}", e);
                stderr.push_str(&format!("\nfailed to write to shell: {e}\n"));
                let alive = io.is_running();
                return (CommandResult::error(stdout, stderr), alive);
            }

            let (Some(out), Some(err)) = (io.stdout.as_mut(), io.stderr.as_mut()) else {
                return (CommandResult::error(stdout, stderr), false);
            };
            let drained = drain_until(out, err, &marker, deadline, Some(&self.cancel));
            stdout.push_str(&drained.stdout_text());
            stderr.push_str(&drained.stderr_text());

            match drained.end {
                DrainEnd::Delimiter(code) => returncode = code,
                DrainEnd::Cancelled => {
                    self.set_state(SessionState::Interrupted);
                    let alive = self.recover(io, &marker);
                    return (CommandResult::interrupted(stdout, stderr), alive);
                }
                DrainEnd::Deadline => {
                    process::signal_group(self.pid, libc::SIGINT);
                    self.set_state(SessionState::TimedOut);
                    let alive = self.recover(io, &marker);
                    return (CommandResult::timed_out(stdout, stderr), alive);
                }
                DrainEnd::Eof => {
                    let code = io.child.wait().ok().and_then(process::exit_code);
                    return (CommandResult::new(code, stdout, stderr), false);
                }
                DrainEnd::Error(e) => {
                    warn!(session = %self.id, "failed to read shell output: {}", e);
                    stderr.push_str(&format!("\nfailed to read shell output: {e}\n"));
                    let alive = io.is_running();
                    return (CommandResult::error(stdout, stderr), alive);
                }
            }
        }

        (CommandResult::new(returncode, stdout, stderr), true)
    }

    /// Wait for an abandoned statement's delimiter, discarding its output.
    ///
    /// Processes that outlive the interrupt are sent SIGTERM and then
    /// SIGKILL. Returns `false` if the shell never reached the delimiter,
    /// in which case the session must be closed.
    fn recover(&self, io: &mut SessionIo, marker: &str) -> bool {
        let steps = [
            (None, RECOVERY_GRACE),
            (Some(libc::SIGTERM), ESCALATION_GRACE),
            (Some(libc::SIGKILL), ESCALATION_GRACE),
        ];
        for (signal, grace) in steps {
            if let Some(signal) = signal {
                let signalled = process::signal_descendants(self.pid, signal);
                debug!(session = %self.id, signal, signalled, "escalating abandoned command");
            }
            let (Some(out), Some(err)) = (io.stdout.as_mut(), io.stderr.as_mut()) else {
                return false;
            };
            match drain_until(out, err, marker, Some(Instant::now() + grace), None).end {
                DrainEnd::Delimiter(_) => {
                    debug!(session = %self.id, "recovered after abandoned command");
                    return true;
                }
                DrainEnd::Deadline => {}
                end => {
                    debug!(session = %self.id, ?end, "shell lost while recovering");
                    return false;
                }
            }
        }
        warn!(session = %self.id, "shell stuck after abandoned command");
        false
    }

    /// Interrupt the running command, like Ctrl-C.
    ///
    /// Output captured so far is kept and remaining statements are not
    /// sent. Returns `false` if nothing was running.
    pub fn interrupt(&self) -> bool {
        let Ok(state) = self.state.lock() else {
            return false;
        };
        if *state != SessionState::Executing {
            return false;
        }
        self.cancel.store(true, Ordering::SeqCst);
        let delivered = process::signal_group(self.pid, libc::SIGINT);
        info!(session = %self.id, delivered, "interrupt requested");
        true
    }

    /// Terminate the shell and release every descriptor. Idempotent.
    ///
    /// A running command is interrupted first and its caller receives
    /// whatever output was captured.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if state.is_terminal() {
                return Ok(());
            }
            if *state != SessionState::Ready {
                self.cancel.store(true, Ordering::SeqCst);
                process::signal_group(self.pid, libc::SIGINT);
                process::signal_group(self.pid, libc::SIGTERM);
            }
            state.transition_to(SessionState::Closed)?;
        }

        self.io
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .release(CLOSE_GRACE);
        registry::deregister(self.id);
        info!(session = %self.id, "shell session closed");
        Ok(())
    }

    /// Working directory of the shell process.
    ///
    /// Read from the process table, so it never occupies the session and
    /// works while a command runs. `None` once the session is closed.
    pub fn cwd(&self) -> Option<PathBuf> {
        if self.state().is_terminal() {
            return None;
        }
        process::process_cwd(self.pid)
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(session = %self.id, "failed to close session on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn session() -> ShellSession {
        ShellSession::spawn(&ShellConfig::default()).unwrap()
    }

    #[test]
    fn test_wrap_statement_quotes_body() {
        let script = wrap_statement("echo $HOME", "MARK");
        assert!(script.contains("<<'MARK_IN'\necho $HOME\nMARK_IN\n"));
        assert!(script.contains("printf '%s:%s\\n' 'MARK'"));
        assert!(script.contains(">&2"));
    }

    #[test]
    fn test_run_echo() {
        let shell = session();
        let result = shell.run("echo hello", None).unwrap();
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.returncode, Some(0));
        assert_eq!(shell.state(), SessionState::Ready);
    }

    #[test]
    fn test_separate_streams_and_returncode() {
        let shell = session();
        let result = shell.run("echo out; echo err >&2; false", None).unwrap();
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.returncode, Some(1));
    }

    #[test]
    fn test_state_persists() {
        let shell = session();
        shell.run("cd /tmp && export TETHER_VAR=42", None).unwrap();
        let result = shell.run("pwd; echo $TETHER_VAR", None).unwrap();
        assert!(result.stdout.contains("/tmp"));
        assert!(result.stdout.contains("42"));
        assert_eq!(shell.cwd(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_syntax_error_keeps_session() {
        let shell = session();
        let result = shell.run("echo (", None).unwrap();
        assert_ne!(result.returncode, Some(0));
        assert!(shell.is_alive());
        assert_eq!(shell.run("echo ok", None).unwrap().stdout, "ok\n");
    }

    #[test]
    fn test_timeout() {
        let shell = session();
        let result = shell.run("sleep 5", Some(Duration::from_millis(300))).unwrap();
        assert!(result.timed_out);
        assert_eq!(result.returncode, Some(-124));
        assert!(result.duration < Duration::from_secs(4));
        assert_eq!(shell.run("echo after", None).unwrap().stdout, "after\n");
    }

    #[test]
    fn test_interrupt_keeps_partial_output() {
        let shell = Arc::new(session());
        let runner = {
            let shell = Arc::clone(&shell);
            std::thread::spawn(move || {
                shell
                    .run("echo Starting...\nsleep 5\necho 'Should not see this'", None)
                    .unwrap()
            })
        };

        std::thread::sleep(Duration::from_millis(500));
        assert!(shell.interrupt());

        let result = runner.join().unwrap();
        assert!(result.interrupted);
        assert_eq!(result.returncode, Some(130));
        assert!(result.stdout.contains("Starting..."));
        assert!(!result.stdout.contains("Should not see this"));

        let next = shell.run("echo next", None).unwrap();
        assert_eq!(next.stdout, "next\n");
    }

    #[test]
    fn test_interrupt_escalates_past_ignored_sigint() {
        let shell = Arc::new(session());
        let runner = {
            let shell = Arc::clone(&shell);
            std::thread::spawn(move || {
                shell
                    .run("bash -c 'trap \"\" INT; sleep 4; echo late'", None)
                    .unwrap()
            })
        };

        std::thread::sleep(Duration::from_millis(300));
        assert!(shell.interrupt());
        let result = runner.join().unwrap();
        assert!(result.interrupted);
        assert!(!result.stdout.contains("late"));

        let start = Instant::now();
        let next = shell.run("echo hi", None).unwrap();
        assert_eq!(next.stdout, "hi\n");
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_escalates_past_ignored_sigint() {
        let shell = session();
        let start = Instant::now();
        let result = shell
            .run("bash -c 'trap \"\" INT; sleep 6'", Some(Duration::from_millis(200)))
            .unwrap();
        assert!(result.timed_out);
        assert!(start.elapsed() < Duration::from_secs(4));
        assert_eq!(shell.state(), SessionState::Ready);
        assert_eq!(shell.run("echo ok", None).unwrap().stdout, "ok\n");
    }

    #[test]
    fn test_interrupt_right_after_start_is_kept() {
        let shell = Arc::new(session());
        let runner = {
            let shell = Arc::clone(&shell);
            std::thread::spawn(move || shell.run("sleep 5", None).unwrap())
        };

        // Fire as soon as the run is visible as Executing.
        let deadline = Instant::now() + Duration::from_secs(2);
        while !shell.interrupt() && Instant::now() < deadline {
            std::hint::spin_loop();
        }
        let result = runner.join().unwrap();
        assert!(result.interrupted);
        assert!(result.duration < Duration::from_secs(4));
    }

    #[test]
    fn test_cwd_does_not_occupy_session() {
        let shell = Arc::new(session());
        shell.run("cd /tmp", None).unwrap();
        let runner = {
            let shell = Arc::clone(&shell);
            std::thread::spawn(move || shell.run("sleep 0.5; echo done", None).unwrap())
        };

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(shell.state(), SessionState::Executing);
        assert_eq!(shell.cwd(), Some(PathBuf::from("/tmp")));

        let result = runner.join().unwrap();
        assert_eq!(result.stdout, "done\n");
        assert_eq!(result.returncode, Some(0));

        shell.close().unwrap();
        assert_eq!(shell.cwd(), None);
    }

    #[test]
    fn test_poisoned_io_closes_session() {
        let shell = Arc::new(session());
        let holder = Arc::clone(&shell);
        let _ = std::thread::spawn(move || {
            let _io = holder.io.lock().unwrap();
            panic!("panic while holding session io");
        })
        .join();

        let err = shell.run("echo x", None).unwrap_err();
        assert!(matches!(err, ShellTetherError::LockPoisoned));
        assert_eq!(shell.state(), SessionState::Closed);
        assert!(!registry::is_live(shell.id()));
        assert!(shell.raw_fds().is_empty());
    }

    #[test]
    fn test_interrupt_when_idle() {
        let shell = session();
        assert!(!shell.interrupt());
        assert_eq!(shell.run("echo fine", None).unwrap().stdout, "fine\n");
    }

    #[test]
    fn test_run_while_busy_rejected() {
        let shell = Arc::new(session());
        let runner = {
            let shell = Arc::clone(&shell);
            std::thread::spawn(move || shell.run("sleep 1", None).unwrap())
        };
        std::thread::sleep(Duration::from_millis(300));
        let err = shell.run("echo nope", None).unwrap_err();
        assert!(matches!(
            err,
            ShellTetherError::SessionNotReady(SessionState::Executing)
        ));
        runner.join().unwrap();
    }

    #[test]
    fn test_exit_closes_session() {
        let shell = session();
        let result = shell.run("exit 3", None).unwrap();
        assert_eq!(result.returncode, Some(3));
        assert!(!shell.is_alive());
        assert_eq!(shell.state(), SessionState::Closed);
        assert!(shell.raw_fds().is_empty());
        assert!(matches!(
            shell.run("echo x", None),
            Err(ShellTetherError::SessionNotReady(SessionState::Closed))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let shell = session();
        assert_eq!(shell.raw_fds().len(), 3);
        shell.close().unwrap();
        shell.close().unwrap();
        assert!(!shell.is_alive());
        assert!(shell.raw_fds().is_empty());
        assert!(!registry::is_live(shell.id()));
    }
}
