//! Command execution pipeline.
//!
//! - [`CommandResult`]: structured outcome of one `run()`
//! - [`CommandExecutor`]: validation, execution and presentation in one call
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use shell_tether::execution::{CommandExecutor, ShellCommand};
//!
//! let executor = CommandExecutor::default();
//! let cmd = ShellCommand::new("cargo build").timeout(Duration::from_secs(60));
//! let execution = executor.execute_current(&cmd).unwrap();
//! println!("{}", execution.output);
//! ```

mod command;
mod executor;
mod result;

pub use command::ShellCommand;
pub use executor::{execute_simple, execute_with_timeout, CommandExecutor, Execution};
pub use result::{CommandResult, ERROR_RETURNCODE, INTERRUPTED_RETURNCODE, TIMED_OUT_RETURNCODE};
