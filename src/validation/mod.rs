//! Pre-execution command linting.
//!
//! A [`CommandValidator`] runs a set of [`ValidationRule`]s over a command
//! before it reaches the shell. In `warn` mode findings are advisory; in
//! `strict` mode any finding blocks the command.

mod metrics;
mod readonly;
mod rules;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use metrics::ValidationMetrics;
pub use readonly::{is_read_only_command, READ_ONLY_COMMANDS};
pub use rules::{
    BareVariables, DirectoryPaths, LayoutRewrite, PathQuoting, PythonFileExecution,
    PythonInvocation, ValidationRule, KNOWN_VARIABLES,
};

/// How findings affect execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Validation skipped entirely.
    Off,
    /// Findings are shown, the command still runs.
    #[default]
    Warn,
    /// Any finding blocks the command.
    Strict,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Off => "off",
            ValidationMode::Warn => "warn",
            ValidationMode::Strict => "strict",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "false" | "0" => Ok(ValidationMode::Off),
            "warn" => Ok(ValidationMode::Warn),
            "strict" => Ok(ValidationMode::Strict),
            other => Err(format!(
                "invalid validation mode '{other}' (expected off, warn or strict)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    /// Blocks the command even in warn mode.
    Error,
}

/// One problem a rule found in a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
    /// Documentation page explaining the convention behind the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
}

/// Outcome of validating one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the command may run.
    pub allowed: bool,
    pub findings: Vec<ValidationFinding>,
}

impl ValidationReport {
    fn pass() -> Self {
        Self {
            allowed: true,
            findings: Vec::new(),
        }
    }
}

/// Validator settings, as found in the `validation` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub mode: ValidationMode,
    /// Per-rule switches by rule name; rules not listed are enabled.
    pub rules: HashMap<String, bool>,
    /// Additional variable names for `bare_variables`.
    pub extra_known_variables: Vec<String>,
    /// Patterns for `directory_paths`.
    pub layout_rewrites: Vec<LayoutRewrite>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Warn,
            rules: HashMap::new(),
            extra_known_variables: Vec::new(),
            layout_rewrites: vec![LayoutRewrite::default()],
        }
    }
}

impl ValidatorConfig {
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable a rule by name.
    pub fn rule(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.rules.insert(name.into(), enabled);
        self
    }

    pub fn is_rule_enabled(&self, name: &str) -> bool {
        self.rules.get(name).copied().unwrap_or(true)
    }
}

/// Runs the enabled rules and keeps running metrics.
pub struct CommandValidator {
    mode: ValidationMode,
    rules: Vec<Box<dyn ValidationRule>>,
    metrics: Mutex<ValidationMetrics>,
}

impl fmt::Debug for CommandValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.rules.iter().map(|r| r.name()).collect();
        f.debug_struct("CommandValidator")
            .field("mode", &self.mode)
            .field("rules", &names)
            .finish()
    }
}

impl CommandValidator {
    /// Build a validator with the built-in rules enabled by `config`.
    pub fn new(config: &ValidatorConfig) -> Self {
        let candidates: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(BareVariables::new(config.extra_known_variables.iter().cloned())),
            Box::new(PythonInvocation),
            Box::new(PythonFileExecution),
            Box::new(PathQuoting),
            Box::new(DirectoryPaths::new(&config.layout_rewrites)),
        ];
        let rules = candidates
            .into_iter()
            .filter(|rule| config.is_rule_enabled(rule.name()))
            .collect();

        Self {
            mode: config.mode,
            rules,
            metrics: Mutex::new(ValidationMetrics::new()),
        }
    }

    /// Default rules in the given mode.
    pub fn with_mode(mode: ValidationMode) -> Self {
        Self::new(&ValidatorConfig::default().with_mode(mode))
    }

    /// Add a custom rule.
    pub fn add_rule(&mut self, rule: Box<dyn ValidationRule>) {
        self.rules.push(rule);
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Names of the active rules.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Validate a command.
    pub fn validate(&self, command: &str) -> ValidationReport {
        if self.mode == ValidationMode::Off {
            return ValidationReport::pass();
        }

        let findings: Vec<ValidationFinding> =
            self.rules.iter().flat_map(|rule| rule.check(command)).collect();

        let allowed = match self.mode {
            ValidationMode::Strict => findings.is_empty(),
            _ => !findings.iter().any(|f| f.severity == Severity::Error),
        };

        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record(allowed, &findings, self.mode);
        }
        if !findings.is_empty() {
            debug!(mode = %self.mode, allowed, count = findings.len(), "validation findings");
        }

        ValidationReport { allowed, findings }
    }

    /// Snapshot of metrics recorded so far.
    pub fn metrics(&self) -> ValidationMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}
