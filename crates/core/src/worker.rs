#![forbid(unsafe_code)]

use crate::ValidationError;
use crate::ids::{JobId, WorkerId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            _ => Err(ValidationError::UnknownWorkerState(raw.to_string())),
        }
    }
}

/// A worker row: one per worker-loop lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub pid: u32,
    pub state: WorkerState,
    pub current_job_id: Option<JobId>,
    pub started_at_ms: i64,
    pub last_seen_at_ms: i64,
    pub stopped_at_ms: Option<i64>,
}
