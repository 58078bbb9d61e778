//! Background job management.
//!
//! Jobs are detached `<shell> -c <command>` processes, independent of the
//! interactive session, numbered per execution context.

mod job;
mod table;

pub use job::{BackgroundJob, JobOutput, JobStatus};
pub use table::BackgroundJobsState;
