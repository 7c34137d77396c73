//! In-process registry of running jobs and their cancellation tokens.

use std::collections::HashMap;
use std::sync::Mutex;

use swatch_core::types::JobId;
use tokio_util::sync::CancellationToken;

/// Cancellation handles for the jobs this process is running.
///
/// Every token is a child of a root token, so shutdown can signal all
/// jobs at once.
#[derive(Debug, Default)]
pub struct JobRegistry {
    root: CancellationToken,
    running: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return the token its task must watch.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = self.root.child_token();
        self.lock().insert(job_id, token.clone());
        token
    }

    pub fn remove(&self, job_id: &JobId) {
        self.lock().remove(job_id);
    }

    /// Signal one job. Returns `false` if this process is not running it.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.lock().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal every running job.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn running_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        // A poisoned map still holds valid tokens.
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}
