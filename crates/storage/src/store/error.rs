#![forbid(unsafe_code)]

use qc_core::{JobState, ValidationError};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("job {job_id} already exists")]
    JobAlreadyExists { job_id: String },

    #[error("job {job_id} not found")]
    UnknownJob { job_id: String },

    #[error("job {job_id} is not in the dead letter queue (state={state})")]
    JobNotDead { job_id: String, state: JobState },

    #[error("job {job_id} is not held by worker {worker_id}")]
    ClaimMismatch { job_id: String, worker_id: String },

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    /// True for transient lock contention; the caller should retry the whole operation.
    pub fn is_contention(&self) -> bool {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
