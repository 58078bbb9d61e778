//! Shell process spawning and signalling.

use std::collections::{HashMap, HashSet, VecDeque};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::{debug, warn};

use crate::error::ShellTetherError;
use crate::Result;

/// Default shell program for sessions and background jobs.
pub const DEFAULT_SHELL: &str = "bash";

/// How to start a shell process.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Shell program (looked up in `PATH` when not absolute).
    pub program: String,
    /// Arguments passed before any command.
    pub args: Vec<String>,
    /// Initial working directory.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SHELL.to_string(),
            args: vec!["--noprofile".to_string(), "--norc".to_string()],
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl ShellConfig {
    /// Use the given program with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Set the initial working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the argument list.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("PAGER", "cat")
            .env("GIT_PAGER", "cat")
            .envs(&self.env)
            // Own process group so signals reach the whole pipeline.
            .process_group(0);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Spawn a long-lived shell reading commands from a pipe.
pub(crate) fn spawn_interactive(config: &ShellConfig) -> Result<Child> {
    let child = config
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ShellTetherError::SpawnFailed {
            program: config.program.clone(),
            source,
        })?;
    debug!(pid = child.id(), program = %config.program, "spawned shell");
    Ok(child)
}

/// Spawn `<shell> -c <command>` detached from any session input.
pub(crate) fn spawn_oneshot(config: &ShellConfig, command: &str) -> Result<Child> {
    let child = config
        .command()
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ShellTetherError::SpawnFailed {
            program: config.program.clone(),
            source,
        })?;
    debug!(pid = child.id(), command, "spawned background job");
    Ok(child)
}

/// Send `signal` to the process group led by `pid`.
pub(crate) fn signal_group(pid: u32, signal: libc::c_int) -> bool {
    // SAFETY: killpg has no memory-safety preconditions; the group id is
    // one of our own children, spawned as a group leader.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    rc == 0
}

/// Every process below `pid` in the process tree, nearest first.
pub(crate) fn descendants(pid: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (child, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*child);
        }
    }

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([Pid::from_u32(pid)]);
    while let Some(current) = queue.pop_front() {
        for kid in children.get(&current).into_iter().flatten() {
            if seen.insert(*kid) {
                found.push(kid.as_u32());
                queue.push_back(*kid);
            }
        }
    }
    found
}

/// Send `signal` to every descendant of `pid` but not to `pid` itself.
///
/// Returns how many processes the signal was delivered to.
pub(crate) fn signal_descendants(pid: u32, signal: libc::c_int) -> usize {
    descendants(pid)
        .into_iter()
        .filter(|&child| {
            // SAFETY: kill has no memory-safety preconditions.
            unsafe { libc::kill(child as libc::pid_t, signal) == 0 }
        })
        .count()
}

/// Working directory of a running process, read from the process table.
pub(crate) fn process_cwd(pid: u32) -> Option<PathBuf> {
    let pid = Pid::from_u32(pid);
    let refresh = ProcessRefreshKind::nothing().with_cwd(UpdateKind::Always);
    let mut system = System::new();
    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), true, refresh);
    system.process(pid)?.cwd().map(Path::to_path_buf)
}

/// Terminate a process group and reap its leader.
///
/// Sends SIGTERM, waits up to `grace`, then escalates to SIGKILL.
pub(crate) fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let pid = child.id();
    if let Ok(Some(status)) = child.try_wait() {
        // Leader already gone; take stragglers in the group with it.
        signal_group(pid, libc::SIGKILL);
        return Some(status);
    }

    signal_group(pid, libc::SIGTERM);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                warn!(pid, "failed to poll shell process: {}", e);
                break;
            }
        }
    }

    warn!(pid, "shell ignored SIGTERM, killing process group");
    signal_group(pid, libc::SIGKILL);
    let _ = child.kill();
    child.wait().ok()
}

/// Exit code of a finished process; signals map to `128 + signo`.
pub(crate) fn exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| 128 + sig))
}
