//! Script handling.
//!
//! A multi-line script sent to a session is executed one top-level
//! statement at a time so that an interrupt can stop before the next
//! statement is ever written to the shell.
//!
//! # Example
//!
//! ```
//! use shell_tether::script::split_commands;
//!
//! let commands = split_commands("cd /tmp\nfor f in *; do\n  echo $f\ndone\n");
//! assert_eq!(commands.len(), 2);
//! ```

mod splitter;

pub use splitter::split_commands;
