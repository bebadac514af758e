#![forbid(unsafe_code)]

use crate::ValidationError;
use crate::ids::{JobId, WorkerId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    /// No automatic transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }

    /// States the claim predicate considers (subject to `next_run_at`).
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            _ => Err(ValidationError::UnknownState(raw.to_string())),
        }
    }
}

/// A job row as persisted. Timestamps are Unix milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_retries: u32,
    pub priority: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub next_run_at_ms: Option<i64>,
    pub locked_by: Option<WorkerId>,
    pub locked_at_ms: Option<i64>,
    pub last_error: Option<String>,
    pub return_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub duration_ms: Option<i64>,
}

impl Job {
    pub fn is_eligible_at(&self, now_ms: i64) -> bool {
        self.state.is_claimable() && self.next_run_at_ms.is_none_or(|at| at <= now_ms)
    }
}

/// Result metadata of one execution attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub return_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
    pub timed_out: bool,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.return_code == 0 && !self.timed_out
    }
}
