//! Output processing and presentation.
//!
//! - ANSI escape code stripping
//! - Shortening long output (timestamps, shared line prefixes, head/tail)
//! - Result formatting, including quiet-mode offload to files
//!
//! # Example
//!
//! ```
//! use shell_tether::output::OutputSanitizer;
//!
//! let clean = OutputSanitizer::strip_ansi("\x1b[31mRed text\x1b[0m");
//! assert_eq!(clean, "Red text");
//! ```

mod presenter;
mod sanitizer;
mod shorten;

pub use presenter::{format_findings, OutputPresenter, QUIET_OUTPUT_DIR};
pub use sanitizer::OutputSanitizer;
pub use shorten::Shortening;
