//! A single detached command.

use std::fmt;
use std::io::Read;
use std::process::{Child, ChildStderr, ChildStdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::ShellTetherError;
use crate::session::{exit_code, signal_group, spawn_oneshot, ShellConfig};
use crate::Result;

/// Lifecycle of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running.
    Running,
    /// Exited on its own with the given return code.
    Finished(Option<i32>),
    /// Stopped by [`BackgroundJob::kill`] or a reset.
    Killed,
}

impl JobStatus {
    /// Short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Finished(_) => "finished",
            JobStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output accumulated by a job so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

const READER_GRACE: Duration = Duration::from_secs(1);

fn spawn_reader<R: Read + Send + 'static>(mut reader: R, buffer: SharedBuffer) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut guard) = buffer.lock() {
                        guard.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

/// A command running detached from the interactive session.
///
/// Output is collected by reader threads, so [`get_output`](Self::get_output)
/// never blocks on the process.
pub struct BackgroundJob {
    id: u64,
    command: String,
    pid: u32,
    started_at: Instant,
    child: Mutex<Child>,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    readers: Mutex<Vec<JoinHandle<()>>>,
    killed: AtomicBool,
}

impl fmt::Debug for BackgroundJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundJob")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("status", &self.status())
            .finish()
    }
}

impl BackgroundJob {
    pub(crate) fn start(id: u64, config: &ShellConfig, command: &str) -> Result<Self> {
        let mut child = spawn_oneshot(config, command)?;
        let pid = child.id();

        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let mut readers = Vec::with_capacity(2);
        let pipes: (Option<ChildStdout>, Option<ChildStderr>) =
            (child.stdout.take(), child.stderr.take());
        match pipes {
            (Some(out), Some(err)) => {
                readers.push(spawn_reader(out, Arc::clone(&stdout)));
                readers.push(spawn_reader(err, Arc::clone(&stderr)));
            }
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ShellTetherError::Io(std::io::Error::other(
                    "background job pipes unavailable",
                )));
            }
        }

        debug!(job = id, pid, command, "background job started");
        Ok(Self {
            id,
            command: command.to_string(),
            pid,
            started_at: Instant::now(),
            child: Mutex::new(child),
            stdout,
            stderr,
            readers: Mutex::new(readers),
            killed: AtomicBool::new(false),
        })
    }

    /// Per-context job number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The command line as given.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Output so far. Never blocks, whether or not the job has finished.
    pub fn get_output(&self) -> JobOutput {
        let read = |buffer: &SharedBuffer| {
            buffer
                .lock()
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default()
        };
        JobOutput {
            stdout: read(&self.stdout),
            stderr: read(&self.stderr),
        }
    }

    /// Return code once the process has exited.
    pub fn returncode(&self) -> Option<i32> {
        let mut child = self.child.lock().ok()?;
        match child.try_wait() {
            Ok(Some(status)) => exit_code(status),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.killed.load(Ordering::SeqCst) {
            JobStatus::Killed
        } else if self.is_running() {
            JobStatus::Running
        } else {
            JobStatus::Finished(self.returncode())
        }
    }

    /// Wait up to `timeout` for the job to exit; returns its return code.
    pub fn wait(&self, timeout: Duration) -> Option<i32> {
        let deadline = Instant::now() + timeout;
        while self.is_running() {
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        self.join_readers(READER_GRACE);
        self.returncode()
    }

    /// Kill the job's whole process group. Returns `false` if it had
    /// already exited.
    pub fn kill(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.killed.store(true, Ordering::SeqCst);
        signal_group(self.pid, libc::SIGKILL);
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            if let Err(e) = child.wait() {
                warn!(job = self.id, "failed to reap background job: {}", e);
            }
        }
        self.join_readers(READER_GRACE);
        debug!(job = self.id, pid = self.pid, "background job killed");
        true
    }

    /// Give reader threads up to `timeout` to hit EOF, then join the ones
    /// that finished. A grandchild still holding a pipe keeps its reader
    /// alive; that thread is left to exit on its own.
    fn join_readers(&self, timeout: Duration) {
        let Ok(mut readers) = self.readers.lock() else {
            return;
        };
        let deadline = Instant::now() + timeout;
        while readers.iter().any(|h| !h.is_finished()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let (done, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *readers).into_iter().partition(|h| h.is_finished());
        *readers = pending;
        for handle in done {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundJob {
    fn drop(&mut self) {
        if !self.kill() {
            self.join_readers(READER_GRACE);
        }
    }
}
