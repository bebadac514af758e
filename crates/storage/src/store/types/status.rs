#![forbid(unsafe_code)]

use qc_core::{JobState, WorkerInfo};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
}

impl StateCounts {
    pub fn get(&self, state: JobState) -> u64 {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    pub fn total(&self) -> u64 {
        JobState::ALL.into_iter().map(|state| self.get(state)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub jobs: StateCounts,
    pub workers: Vec<WorkerInfo>,
    pub shutdown_requested: bool,
}
