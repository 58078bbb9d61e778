//! The validate, run, present pipeline behind the shell tool.

use std::time::Duration;

use tracing::debug;

use super::command::ShellCommand;
use super::result::CommandResult;
use crate::context::{current_context, ExecutionContext};
use crate::error::ShellTetherError;
use crate::output::{format_findings, OutputPresenter};
use crate::validation::{is_read_only_command, CommandValidator, ValidationFinding};
use crate::Result;

/// Rendered text plus the structured result of one tool call.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Text for the agent: advisories, command, output, status.
    pub output: String,
    pub result: CommandResult,
    /// Warn-mode findings, already included in `output`.
    pub findings: Vec<ValidationFinding>,
    /// The command only inspected files; see [`is_read_only_command`].
    pub read_only: bool,
}

/// Runs commands through the validator, a context's session and the
/// presenter.
#[derive(Debug, Default)]
pub struct CommandExecutor {
    validator: CommandValidator,
    presenter: OutputPresenter,
    default_timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(validator: CommandValidator, presenter: OutputPresenter) -> Self {
        Self {
            validator,
            presenter,
            default_timeout: None,
        }
    }

    /// Timeout for commands that do not set one.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn validator(&self) -> &CommandValidator {
        &self.validator
    }

    pub fn presenter(&self) -> &OutputPresenter {
        &self.presenter
    }

    /// Run `command` in `ctx`'s session.
    ///
    /// A strict-mode rejection is returned as
    /// [`ShellTetherError::ValidationBlocked`] carrying the advisory; the
    /// command never reaches the shell.
    pub fn execute(&self, ctx: &ExecutionContext, command: &ShellCommand) -> Result<Execution> {
        let report = self.validator.validate(&command.command_line);
        if !report.allowed {
            debug!(context = ctx.key(), "command blocked by validation");
            return Err(ShellTetherError::ValidationBlocked(format_findings(
                &report.findings,
                true,
            )));
        }

        let timeout = command.timeout.or(self.default_timeout);
        let shell = ctx.get_shell()?;
        let result = shell.run(&command.command_line, timeout)?;

        let mut output = String::new();
        if !report.findings.is_empty() {
            output.push_str(&format_findings(&report.findings, false));
            output.push('\n');
        }
        output.push_str(&self.presenter.format(
            &result,
            &command.command_line,
            command.quiet,
            timeout,
        ));

        Ok(Execution {
            output,
            result,
            findings: report.findings,
            read_only: is_read_only_command(&command.command_line),
        })
    }

    /// Run `command` in the calling thread's context.
    pub fn execute_current(&self, command: &ShellCommand) -> Result<Execution> {
        self.execute(&current_context(), command)
    }
}

/// Run a command in the calling thread's session without validation.
pub fn execute_simple(command: &str) -> Result<CommandResult> {
    current_context().get_shell()?.run(command, None)
}

/// Like [`execute_simple`], bounded by `timeout`.
pub fn execute_with_timeout(command: &str, timeout: Duration) -> Result<CommandResult> {
    current_context().get_shell()?.run(command, Some(timeout))
}
