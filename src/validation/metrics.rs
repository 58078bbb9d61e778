//! Validation effectiveness counters.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::Path;

use chrono::Local;
use serde::{Deserialize, Serialize};

use super::{Severity, ValidationFinding, ValidationMode};

fn now() -> String {
    Local::now().to_rfc3339()
}

/// Counts of validations, findings and blocked commands over a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationMetrics {
    pub total_validations: u64,
    pub total_warnings: u64,
    pub total_errors: u64,
    /// Commands rejected in strict mode.
    pub commands_blocked: u64,
    pub warnings_by_rule: BTreeMap<String, u64>,
    pub errors_by_rule: BTreeMap<String, u64>,
    pub session_start: String,
    pub last_updated: String,
}

impl Default for ValidationMetrics {
    fn default() -> Self {
        let now = now();
        Self {
            total_validations: 0,
            total_warnings: 0,
            total_errors: 0,
            commands_blocked: 0,
            warnings_by_rule: BTreeMap::new(),
            errors_by_rule: BTreeMap::new(),
            session_start: now.clone(),
            last_updated: now,
        }
    }
}

impl ValidationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one validation.
    pub fn record(&mut self, allowed: bool, findings: &[ValidationFinding], mode: ValidationMode) {
        self.total_validations += 1;
        if !allowed && mode == ValidationMode::Strict {
            self.commands_blocked += 1;
        }

        for finding in findings {
            let by_rule = match finding.severity {
                Severity::Warning => {
                    self.total_warnings += 1;
                    &mut self.warnings_by_rule
                }
                Severity::Error => {
                    self.total_errors += 1;
                    &mut self.errors_by_rule
                }
            };
            *by_rule.entry(finding.rule_name.clone()).or_default() += 1;
        }

        self.last_updated = now();
    }

    /// Add another session's counts into this one.
    pub fn merge(&mut self, other: &ValidationMetrics) {
        self.total_validations += other.total_validations;
        self.total_warnings += other.total_warnings;
        self.total_errors += other.total_errors;
        self.commands_blocked += other.commands_blocked;
        for (rule, count) in &other.warnings_by_rule {
            *self.warnings_by_rule.entry(rule.clone()).or_default() += count;
        }
        for (rule, count) in &other.errors_by_rule {
            *self.errors_by_rule.entry(rule.clone()).or_default() += count;
        }
        self.last_updated = now();
    }

    /// Markdown summary.
    pub fn report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Shell Validation Metrics Report");
        let _ = writeln!(out);
        let _ = writeln!(out, "Session: {} to {}", self.session_start, self.last_updated);
        let _ = writeln!(out);
        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out, "- Total validations: {}", self.total_validations);
        let _ = writeln!(out, "- Total warnings: {}", self.total_warnings);
        let _ = writeln!(out, "- Total errors: {}", self.total_errors);
        let _ = writeln!(out, "- Commands blocked: {}", self.commands_blocked);
        if self.total_validations > 0 {
            let rate = self.total_warnings as f64 / self.total_validations as f64 * 100.0;
            let _ = writeln!(out, "- Warning rate: {rate:.1}%");
        }

        for (title, counts, empty) in [
            ("Warnings by Rule", &self.warnings_by_rule, "No warnings recorded"),
            ("Errors by Rule", &self.errors_by_rule, "No errors recorded"),
        ] {
            let _ = writeln!(out);
            let _ = writeln!(out, "## {title}");
            if counts.is_empty() {
                let _ = writeln!(out, "- {empty}");
                continue;
            }
            let mut sorted: Vec<_> = counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (rule, count) in sorted {
                let _ = writeln!(out, "- {rule}: {count}");
            }
        }
        out
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::from)?;
        std::fs::write(path, json)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(io::Error::from)
    }
}
