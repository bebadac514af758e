#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    /// Aggregate job counts per state plus worker liveness.
    pub fn status(&self) -> Result<StatusReport, StoreError> {
        Ok(StatusReport {
            jobs: self.state_counts()?,
            workers: self.workers_list()?,
            shutdown_requested: self.shutdown_requested()?,
        })
    }
}
