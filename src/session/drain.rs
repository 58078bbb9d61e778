//! Draining a session's stdout and stderr up to a completion delimiter.
//!
//! Both pipes are polled together so that a command producing a lot of
//! output on one stream can never block on the other. Each stream ends
//! at its own delimiter line; stdout additionally carries the exit code
//! (`<marker>:<code>`).

use std::io::{self, Read};
use std::os::fd::AsRawFd;
use std::process::{ChildStderr, ChildStdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on a single poll wait, so cancellation is seen promptly.
const POLL_SLICE: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 8192;

/// Why draining stopped.
#[derive(Debug)]
pub(crate) enum DrainEnd {
    /// Both delimiters seen; carries the exit code reported on stdout.
    Delimiter(Option<i32>),
    /// The cancel flag was raised.
    Cancelled,
    /// The deadline passed.
    Deadline,
    /// A stream closed before its delimiter: the shell is gone.
    Eof,
    /// Polling or reading failed.
    Error(io::Error),
}

/// Output collected up to the point draining stopped.
#[derive(Debug)]
pub(crate) struct Drained {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub end: DrainEnd,
}

impl Drained {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Per-stream accumulation and delimiter matching.
#[derive(Default)]
struct StreamBuffer {
    data: Vec<u8>,
    /// Position from which to resume scanning for the delimiter.
    scan_from: usize,
    /// Bytes of output that belong to the current command.
    found: Option<usize>,
    eof: bool,
}

impl StreamBuffer {
    fn finished(&self) -> bool {
        self.found.is_some() || self.eof
    }

    fn push(&mut self, bytes: &[u8], marker: &[u8]) {
        self.data.extend_from_slice(bytes);

        if self.found.is_none() {
            let start = self.scan_from;
            match find_line_end(&self.data, marker, start) {
                Some(_) => {
                    self.found = find_bytes(&self.data[start..], marker).map(|pos| start + pos);
                }
                None => {
                    self.scan_from = self.data.len().saturating_sub(marker.len() + 16);
                }
            }
        }
    }

    /// Bytes preceding the delimiter, or everything if it was never seen.
    fn output(&self) -> Vec<u8> {
        match self.found {
            Some(pos) => self.data[..pos].to_vec(),
            None => self.data.clone(),
        }
    }

    /// The text between the delimiter and the end of its line.
    fn delimiter_suffix(&self, marker: &[u8]) -> Option<&[u8]> {
        let start = self.found? + marker.len();
        let rest = &self.data[start..];
        let end = rest.iter().position(|&b| b == b'\n')?;
        Some(&rest[..end])
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Index just past the newline terminating the line that contains `needle`.
fn find_line_end(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    let pos = from + find_bytes(&haystack[from..], needle)?;
    let after = pos + needle.len();
    let newline = haystack[after..].iter().position(|&b| b == b'\n')?;
    Some(after + newline + 1)
}

fn parse_returncode(suffix: &[u8]) -> Option<i32> {
    std::str::from_utf8(suffix.strip_prefix(b":")?)
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Read both streams until each reaches `marker`, or draining is cut short.
pub(crate) fn drain_until(
    stdout: &mut ChildStdout,
    stderr: &mut ChildStderr,
    marker: &str,
    deadline: Option<Instant>,
    cancel: Option<&AtomicBool>,
) -> Drained {
    let marker_bytes = marker.as_bytes();
    let mut out = StreamBuffer::default();
    let mut err = StreamBuffer::default();
    let mut chunk = [0u8; READ_BUFFER_SIZE];

    let end = loop {
        if out.finished() && err.finished() {
            if out.found.is_some() && err.found.is_some() {
                break DrainEnd::Delimiter(
                    out.delimiter_suffix(marker_bytes).and_then(parse_returncode),
                );
            }
            break DrainEnd::Eof;
        }

        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            break DrainEnd::Cancelled;
        }

        let mut wait = POLL_SLICE;
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break DrainEnd::Deadline;
            }
            wait = wait.min(remaining);
        }

        let mut fds = Vec::with_capacity(2);
        if !out.finished() {
            fds.push(pollfd(stdout.as_raw_fd()));
        }
        if !err.finished() {
            fds.push(pollfd(stderr.as_raw_fd()));
        }

        // SAFETY: `fds` is a valid, initialized slice of pollfd for the
        // duration of the call.
        let rc = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                wait.as_millis().max(1) as libc::c_int,
            )
        };
        if rc < 0 {
            let e = io::Error::last_os_error();
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            break DrainEnd::Error(e);
        }
        if rc == 0 {
            continue;
        }

        let mut failure = None;
        for pfd in &fds {
            if pfd.revents == 0 {
                continue;
            }
            let (reader, buffer): (&mut dyn Read, &mut StreamBuffer) =
                if pfd.fd == stdout.as_raw_fd() {
                    (&mut *stdout, &mut out)
                } else {
                    (&mut *stderr, &mut err)
                };
            match reader.read(&mut chunk) {
                Ok(0) => buffer.eof = true,
                Ok(n) => buffer.push(&chunk[..n], marker_bytes),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => failure = Some(e),
            }
        }
        if let Some(e) = failure {
            break DrainEnd::Error(e);
        }
    };

    Drained {
        stdout: out.output(),
        stderr: err.output(),
        end,
    }
}

fn pollfd(fd: libc::c_int) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::{Command, Stdio};

    fn spawn(script: &str) -> std::process::Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    fn drain(child: &mut std::process::Child, marker: &str) -> Drained {
        let mut stdout = child.stdout.take().unwrap();
        let mut stderr = child.stderr.take().unwrap();
        let deadline = Some(Instant::now() + Duration::from_secs(10));
        drain_until(&mut stdout, &mut stderr, marker, deadline, None)
    }

    #[test]
    fn test_find_line_end() {
        assert_eq!(find_line_end(b"abc MARK:0\nrest", b"MARK", 0), Some(11));
        assert_eq!(find_line_end(b"abc MARK:0", b"MARK", 0), None);
        assert_eq!(find_line_end(b"abc", b"MARK", 0), None);
    }

    #[test]
    fn test_parse_returncode() {
        assert_eq!(parse_returncode(b":0"), Some(0));
        assert_eq!(parse_returncode(b":127"), Some(127));
        assert_eq!(parse_returncode(b"junk"), None);
    }

    #[test]
    fn test_splits_output_at_delimiter() {
        let mut child = spawn(
            "echo hello; echo oops >&2; printf 'MARK:3\\n'; printf 'MARK\\n' >&2; sleep 5",
        );
        let drained = drain(&mut child, "MARK");
        assert!(matches!(drained.end, DrainEnd::Delimiter(Some(3))));
        assert_eq!(drained.stdout_text(), "hello\n");
        assert_eq!(drained.stderr_text(), "oops\n");
        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn test_eof_before_delimiter() {
        let mut child = spawn("echo partial");
        let drained = drain(&mut child, "MARK");
        assert!(matches!(drained.end, DrainEnd::Eof));
        assert_eq!(drained.stdout_text(), "partial\n");
        let _ = child.wait();
    }

    #[test]
    fn test_deadline() {
        let mut child = spawn("echo started; sleep 5");
        let mut stdout = child.stdout.take().unwrap();
        let mut stderr = child.stderr.take().unwrap();
        let start = Instant::now();
        let deadline = Some(start + Duration::from_millis(300));
        let drained = drain_until(&mut stdout, &mut stderr, "MARK", deadline, None);
        assert!(matches!(drained.end, DrainEnd::Deadline));
        assert_eq!(drained.stdout_text(), "started\n");
        assert!(start.elapsed() < Duration::from_secs(3));
        let _ = child.kill();
        let _ = child.wait();
    }

    #[test]
    fn test_cancel_flag() {
        let mut child = spawn("sleep 5");
        let mut stdout = child.stdout.take().unwrap();
        let mut stderr = child.stderr.take().unwrap();
        let cancel = AtomicBool::new(true);
        let drained = drain_until(&mut stdout, &mut stderr, "MARK", None, Some(&cancel));
        assert!(matches!(drained.end, DrainEnd::Cancelled));
        let _ = child.kill();
        let _ = child.wait();
    }
}
