//! Built-in validation rules.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Severity, ValidationFinding};

/// A single heuristic check over a command string.
pub trait ValidationRule: Send + Sync {
    /// Stable rule name used in configuration and metrics.
    fn name(&self) -> &'static str;

    /// Findings for `command`; empty when the rule has nothing to say.
    fn check(&self, command: &str) -> Vec<ValidationFinding>;
}

/// Environment variable names commonly written without `$` by mistake.
pub const KNOWN_VARIABLES: &[&str] = &[
    "LLM_API_TIMEOUT",
    "NOT_GIVEN",
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "PWD",
    "OLDPWD",
    "LANG",
    "LC_ALL",
    "TERM",
    "DISPLAY",
    "PYTHONPATH",
    "VIRTUAL_ENV",
];

static UPPER_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][A-Z_]{2,})\b").expect("valid regex"));

static PYTHON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpython\b").expect("valid regex"));

static DOT_SLASH_PY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[;&|])\s*(\./[^\s;|&]+\.py)\b").expect("valid regex")
});

static BARE_PY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|[;&|])\s*([^\s/]+\.py)\b").expect("valid regex"));

static CD_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:cd|pushd)\s+([^"'\s$][^;|&\n]*\s[^;|&\n]*)"#).expect("valid regex")
});

/// Known variable names used as bare words.
pub struct BareVariables {
    known: HashSet<String>,
}

impl BareVariables {
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut known: HashSet<String> = KNOWN_VARIABLES.iter().map(|v| v.to_string()).collect();
        known.extend(extra.into_iter().map(Into::into));
        Self { known }
    }
}

impl Default for BareVariables {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ValidationRule for BareVariables {
    fn name(&self) -> &'static str {
        "bare_variables"
    }

    fn check(&self, command: &str) -> Vec<ValidationFinding> {
        let bytes = command.as_bytes();
        UPPER_IDENT
            .captures_iter(command)
            .filter_map(|caps| caps.get(1))
            .filter(|m| {
                let before = m.start().checked_sub(1).map(|i| bytes[i]);
                let after = bytes.get(m.end()).copied();
                !matches!(before, Some(b'$' | b'{')) && after != Some(b'=')
            })
            .filter(|m| self.known.contains(m.as_str()))
            .map(|m| {
                let var = m.as_str();
                ValidationFinding::warning(
                    self.name(),
                    format!("Possible bare variable '{var}' (missing $ prefix)"),
                    Some(format!("Use '${var}' if this is a variable reference")),
                )
                    .with_lesson("lessons/tools/shell-variable-syntax.md")
            })
            .collect()
    }
}

/// `python` where `python3` is the convention.
#[derive(Default)]
pub struct PythonInvocation;

impl ValidationRule for PythonInvocation {
    fn name(&self) -> &'static str {
        "python_invocation"
    }

    fn check(&self, command: &str) -> Vec<ValidationFinding> {
        PYTHON_WORD
            .find_iter(command)
            .filter(|m| !matches!(command.as_bytes().get(m.end()), Some(b'3' | b'-')))
            .map(|_| {
                ValidationFinding::warning(
                    self.name(),
                    "Using 'python' instead of 'python3'",
                    Some("Use 'python3' explicitly to avoid ambiguity".to_string()),
                )
                    .with_lesson("lessons/tools/python-invocation.md")
            })
            .collect()
    }
}

/// A `.py` file executed directly at command position.
#[derive(Default)]
pub struct PythonFileExecution;

const FILE_COMMANDS: &[&str] = &["python", "cat", "vim", "nano", "less", "grep", "chmod"];

impl ValidationRule for PythonFileExecution {
    fn name(&self) -> &'static str {
        "python_file_execution"
    }

    fn check(&self, command: &str) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for pattern in [&*DOT_SLASH_PY, &*BARE_PY] {
            for caps in pattern.captures_iter(command) {
                let (Some(whole), Some(file)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let pos = whole.start();
                if pos > 10 {
                    let prefix = command
                        .get(pos.saturating_sub(15)..pos)
                        .unwrap_or_default()
                        .to_lowercase();
                    if FILE_COMMANDS.iter().any(|word| prefix.contains(word)) {
                        continue;
                    }
                }
                let file = file.as_str();
                let finding = ValidationFinding::warning(
                    self.name(),
                    format!("Direct execution of Python file: {file}"),
                    Some(format!("Use 'python3 {file}' instead")),
                );
                findings.push(finding.with_lesson("lessons/tools/python-file-execution.md"));
            }
        }
        findings
    }
}

/// Unquoted `cd`/`pushd` argument containing whitespace.
#[derive(Default)]
pub struct PathQuoting;

impl ValidationRule for PathQuoting {
    fn name(&self) -> &'static str {
        "path_quoting"
    }

    fn check(&self, command: &str) -> Vec<ValidationFinding> {
        CD_ARGUMENT
            .captures_iter(command)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|path| path.contains(char::is_whitespace) && !path.contains("\\ "))
            .filter(|path| !path.contains(" 2>") && !path.contains(" >"))
            .map(|path| {
                ValidationFinding::warning(
                    self.name(),
                    format!("Path with spaces should be quoted: {path}"),
                    Some(format!("Use \"{path}\" with quotes")),
                )
                    .with_lesson("lessons/tools/shell-path-quoting.md")
            })
            .collect()
    }
}

/// A path layout correction: text matching `pattern` should be written
/// as `replacement` (`$1`-style capture references allowed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRewrite {
    pub pattern: String,
    pub replacement: String,
}

impl Default for LayoutRewrite {
    fn default() -> Self {
        Self {
            pattern: r"(/home/[^/\s]+)/Programming/([A-Za-z0-9_-]+)".to_string(),
            replacement: "$1/$2".to_string(),
        }
    }
}

/// Paths that do not follow the expected directory layout.
pub struct DirectoryPaths {
    rewrites: Vec<(Regex, String)>,
}

impl DirectoryPaths {
    /// Compile the rewrites. Invalid patterns are logged and skipped.
    pub fn new(rewrites: &[LayoutRewrite]) -> Self {
        let rewrites = rewrites
            .iter()
            .filter_map(|rw| match Regex::new(&rw.pattern) {
                Ok(re) => Some((re, rw.replacement.clone())),
                Err(e) => {
                    warn!(pattern = %rw.pattern, "ignoring invalid layout rewrite: {}", e);
                    None
                }
            })
            .collect();
        Self { rewrites }
    }
}

impl Default for DirectoryPaths {
    fn default() -> Self {
        Self::new(&[LayoutRewrite::default()])
    }
}

impl ValidationRule for DirectoryPaths {
    fn name(&self) -> &'static str {
        "directory_paths"
    }

    fn check(&self, command: &str) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        for (pattern, replacement) in &self.rewrites {
            for caps in pattern.captures_iter(command) {
                let Some(found) = caps.get(0) else {
                    continue;
                };
                let mut expected = String::new();
                caps.expand(replacement, &mut expected);
                let finding = ValidationFinding::warning(
                    self.name(),
                    format!("Incorrect path: {}", found.as_str()),
                    Some(format!("Use {expected} instead")),
                );
                let lesson = "lessons/workflow/directory-structure-awareness.md";
                findings.push(finding.with_lesson(lesson));
            }
        }
        findings
    }
}

impl ValidationFinding {
    pub(crate) fn warning(
        rule: &str,
        message: impl Into<String>,
        suggestion: Option<String>,
    ) -> Self {
        Self {
            rule_name: rule.to_string(),
            severity: Severity::Warning,
            message: message.into(),
            suggestion,
            lesson: None,
        }
    }

    pub(crate) fn with_lesson(mut self, lesson: &str) -> Self {
        self.lesson = Some(lesson.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_variable_detected() {
        let findings = BareVariables::default().check("echo LLM_API_TIMEOUT");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("LLM_API_TIMEOUT"));
        assert_eq!(findings[0].rule_name, "bare_variables");
    }

    #[test]
    fn test_bare_variable_skips_references_and_assignments() {
        let rule = BareVariables::default();
        assert!(rule.check("echo $PATH ${HOME}").is_empty());
        assert!(rule.check("PATH=/usr/bin ls").is_empty());
        assert!(rule.check("echo UNKNOWN_THING").is_empty());
    }

    #[test]
    fn test_bare_variable_extra_names() {
        let rule = BareVariables::new(["MY_TOKEN"]);
        assert_eq!(rule.check("curl -H MY_TOKEN").len(), 1);
    }

    #[test]
    fn test_python_invocation() {
        let rule = PythonInvocation;
        assert_eq!(rule.check("python script.py").len(), 1);
        assert!(rule.check("python3 script.py").is_empty());
        assert!(rule.check("python-config --libs").is_empty());
        assert!(rule.check("pip install cpython").is_empty());
    }

    #[test]
    fn test_findings_link_lessons() {
        let findings = PythonInvocation.check("python x");
        assert_eq!(
            findings[0].lesson.as_deref(),
            Some("lessons/tools/python-invocation.md")
        );
        let findings = PathQuoting.check("cd my dir");
        assert_eq!(
            findings[0].lesson.as_deref(),
            Some("lessons/tools/shell-path-quoting.md")
        );

        let json = serde_json::to_value(&findings[0]).unwrap();
        assert_eq!(json["lesson"], "lessons/tools/shell-path-quoting.md");
    }

    #[test]
    fn test_python_file_execution() {
        let rule = PythonFileExecution;
        let findings = rule.check("./script.py --flag");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("./script.py"));
        assert_eq!(rule.check("cd /tmp && setup.py").len(), 1);
        assert!(rule.check("python3 ./script.py").is_empty());
        assert!(rule.check("echo hi; chmod +x ./run.py").is_empty());
    }

    #[test]
    fn test_path_quoting() {
        let rule = PathQuoting;
        let findings = rule.check("cd /path with spaces && ls");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("/path with spaces"));
        assert!(rule.check("cd \"/path with spaces\"").is_empty());
        assert!(rule.check("cd /tmp && ls").is_empty());
        assert!(rule.check("cd $DIR").is_empty());
        assert!(rule.check("cat some file").is_empty());
    }

    #[test]
    fn test_directory_paths_default() {
        let findings = DirectoryPaths::default().check("cd /home/bob/Programming/gptme");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("/home/bob/Programming/gptme"));
        assert_eq!(
            findings[0].suggestion.as_deref(),
            Some("Use /home/bob/gptme instead")
        );
    }

    #[test]
    fn test_directory_paths_custom_and_invalid() {
        let rule = DirectoryPaths::new(&[
            LayoutRewrite {
                pattern: r"/srv/old/(\w+)".into(),
                replacement: "/srv/new/$1".into(),
            },
            LayoutRewrite {
                pattern: "([unclosed".into(),
                replacement: String::new(),
            },
        ]);
        let findings = rule.check("ls /srv/old/app");
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].suggestion.as_deref(),
            Some("Use /srv/new/app instead")
        );
    }
}
