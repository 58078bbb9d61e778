//! Rendering command results for the agent.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Local;
use tracing::{debug, warn};

use super::{OutputSanitizer, Shortening};
use crate::execution::CommandResult;
use crate::validation::ValidationFinding;

/// Quiet-mode artifacts live here, relative to the log directory.
pub const QUIET_OUTPUT_DIR: &str = "tool-outputs/shell-quiet";

static QUIET_SEQ: AtomicU64 = AtomicU64::new(0);

/// Formats [`CommandResult`]s as text, offloading quiet output to files.
#[derive(Debug, Clone, Default)]
pub struct OutputPresenter {
    logdir: Option<PathBuf>,
    shortening: Shortening,
}

impl OutputPresenter {
    pub fn new(logdir: Option<PathBuf>) -> Self {
        Self {
            logdir,
            shortening: Shortening::default(),
        }
    }

    pub fn with_shortening(mut self, shortening: Shortening) -> Self {
        self.shortening = shortening;
        self
    }

    pub fn logdir(&self) -> Option<&Path> {
        self.logdir.as_deref()
    }

    pub fn shortening(&self) -> &Shortening {
        &self.shortening
    }

    /// Render a result.
    ///
    /// `timeout` is only used to word the timed-out notice.
    pub fn format(
        &self,
        result: &CommandResult,
        command: &str,
        quiet: bool,
        timeout: Option<Duration>,
    ) -> String {
        let stdout = OutputSanitizer::clean(&result.stdout);
        let stderr = OutputSanitizer::clean(&result.stderr);

        let mut out = ran_command(command);
        if quiet {
            match self.save_quiet_output(&stdout, &stderr) {
                Some(path) => {
                    let _ = write!(out, "\n\nOutput saved to: {} (quiet mode)", path.display());
                }
                None => out.push_str("\n\nOutput suppressed (quiet mode)."),
            }
        } else {
            let stdout = self.shortening.apply(stdout.trim_end());
            let stderr = self.shortening.apply(stderr.trim_end());
            if !stdout.is_empty() {
                let _ = write!(out, "\n\n```stdout\n{stdout}\n```");
            }
            if !stderr.is_empty() {
                let _ = write!(out, "\n\n```stderr\n{stderr}\n```");
            }
            if stdout.is_empty() && stderr.is_empty() {
                out.push_str("\n\nNo output");
            }
        }

        if let Some(status) = status_line(result, timeout, quiet) {
            let _ = write!(out, "\n\n{status}");
        }
        out
    }

    /// Write full output under `<logdir>/tool-outputs/shell-quiet/`.
    fn save_quiet_output(&self, stdout: &str, stderr: &str) -> Option<PathBuf> {
        let logdir = self.logdir.as_ref()?;
        match write_quiet_file(logdir, stdout, stderr) {
            Ok(path) => {
                debug!(path = %path.display(), "saved quiet output");
                Some(path)
            }
            Err(e) => {
                warn!(logdir = %logdir.display(), "failed to save quiet output: {}", e);
                None
            }
        }
    }
}

fn write_quiet_file(logdir: &Path, stdout: &str, stderr: &str) -> io::Result<PathBuf> {
    let dir = logdir.join(QUIET_OUTPUT_DIR);
    std::fs::create_dir_all(&dir)?;

    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let seq = QUIET_SEQ.fetch_add(1, Ordering::Relaxed);
    let path = dir.join(format!("output-{stamp}-{seq:04}.txt"));

    let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    write!(file, "=== stdout ===\n{stdout}")?;
    if !stdout.is_empty() && !stdout.ends_with('\n') {
        writeln!(file)?;
    }
    write!(file, "=== stderr ===\n{stderr}")?;
    file.flush()?;
    Ok(path)
}

fn ran_command(command: &str) -> String {
    let command = command.trim();
    if command.contains('\n') {
        format!("Ran command:\n```bash\n{command}\n```")
    } else {
        format!("Ran command: `{command}`")
    }
}

/// Return-code line; always present for interrupts, timeouts, failures
/// and quiet mode, where it is the only trace of the outcome.
fn status_line(result: &CommandResult, timeout: Option<Duration>, quiet: bool) -> Option<String> {
    let code = result
        .returncode
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if result.interrupted {
        return Some(format!(
            "Return code: {code} (interrupted)\nProcess interrupted; output after the interrupt was discarded."
        ));
    }
    if result.timed_out {
        let after = timeout.unwrap_or(result.duration);
        return Some(format!(
            "Return code: {code} (timed out after {}s)",
            format_secs(after)
        ));
    }
    match result.returncode {
        Some(0) if !quiet => None,
        _ => Some(format!("Return code: {code}")),
    }
}

fn format_secs(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", duration.as_secs())
    } else {
        format!("{secs:.1}")
    }
}

/// Render findings. `blocked` selects the strict-mode wording.
pub fn format_findings(findings: &[ValidationFinding], blocked: bool) -> String {
    let mut out = if blocked {
        String::from("Command blocked by strict validation:\n")
    } else {
        String::from("Validation warnings:\n")
    };
    for finding in findings {
        let _ = writeln!(out, "- [{}] {}", finding.rule_name, finding.message);
        if let Some(suggestion) = &finding.suggestion {
            let _ = writeln!(out, "  Suggestion: {suggestion}");
        }
        if let Some(lesson) = &finding.lesson {
            let _ = writeln!(out, "  See: {lesson}");
        }
    }
    if blocked {
        out.push_str("\nFix the issues above and run the command again.\n");
    }
    out
}
