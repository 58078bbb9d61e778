//! Command representation.

use std::time::Duration;

/// A command to be executed in a shell session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    /// The command line or multi-line script.
    pub command_line: String,
    /// Maximum execution time; the executor's default applies when unset.
    pub timeout: Option<Duration>,
    /// Keep raw output out of the rendered text.
    pub quiet: bool,
}

impl ShellCommand {
    /// Create a new command with the given command line.
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            timeout: None,
            quiet: false,
        }
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set quiet mode.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl From<&str> for ShellCommand {
    fn from(command_line: &str) -> Self {
        Self::new(command_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_new() {
        let cmd = ShellCommand::new("ls -la");
        assert_eq!(cmd.command_line, "ls -la");
        assert!(cmd.timeout.is_none());
        assert!(!cmd.quiet);
    }

    #[test]
    fn test_command_chain() {
        let cmd = ShellCommand::new("cargo build")
            .timeout(Duration::from_secs(60))
            .quiet(true);
        assert_eq!(cmd.timeout, Some(Duration::from_secs(60)));
        assert!(cmd.quiet);
    }

    #[test]
    fn test_from_str() {
        let cmd: ShellCommand = "pwd".into();
        assert_eq!(cmd, ShellCommand::new("pwd"));
    }
}
