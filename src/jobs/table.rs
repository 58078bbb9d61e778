//! Per-context job table.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::BackgroundJob;
use crate::session::ShellConfig;
use crate::Result;

/// Background jobs owned by one execution context.
///
/// Ids start at 1 and only go back to 1 after [`reset`](Self::reset).
/// Finished jobs stay queryable until then.
#[derive(Debug)]
pub struct BackgroundJobsState {
    jobs: BTreeMap<u64, Arc<BackgroundJob>>,
    next_job_id: u64,
}

impl Default for BackgroundJobsState {
    fn default() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_job_id: 1,
        }
    }
}

impl BackgroundJobsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `command` as the next job.
    pub fn start(&mut self, config: &ShellConfig, command: &str) -> Result<Arc<BackgroundJob>> {
        let id = self.next_job_id;
        let job = Arc::new(BackgroundJob::start(id, config, command)?);
        self.next_job_id += 1;
        self.jobs.insert(id, Arc::clone(&job));
        Ok(job)
    }

    pub fn get(&self, id: u64) -> Option<Arc<BackgroundJob>> {
        self.jobs.get(&id).cloned()
    }

    /// All jobs in id order.
    pub fn list(&self) -> Vec<Arc<BackgroundJob>> {
        self.jobs.values().cloned().collect()
    }

    /// Id the next job will receive.
    pub fn next_id(&self) -> u64 {
        self.next_job_id
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Kill running jobs, forget all of them and restart numbering.
    ///
    /// Returns how many jobs were still running.
    pub fn reset(&mut self) -> usize {
        let killed = self.jobs.values().filter(|job| job.kill()).count();
        let cleared = self.jobs.len();
        self.jobs.clear();
        self.next_job_id = 1;
        debug!(cleared, killed, "background jobs reset");
        killed
    }
}
