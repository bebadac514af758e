#![forbid(unsafe_code)]

use qc_core::ids::{JobId, WorkerId};
use qc_core::{Job, ValidationError, WorkerInfo};
use rusqlite::types::Type;

pub(in crate::store) const JOB_COLUMNS: &str = "id, command, state, attempts, max_retries, priority, \
     created_at_ms, updated_at_ms, next_run_at_ms, locked_by, locked_at_ms, last_error, \
     return_code, stdout, stderr, duration_ms";

pub(in crate::store) const WORKER_COLUMNS: &str =
    "worker_id, pid, state, current_job_id, started_at_ms, last_seen_at_ms, stopped_at_ms";

fn corrupt(index: usize, err: ValidationError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}

fn job_id_at(row: &rusqlite::Row<'_>, index: usize) -> Result<JobId, rusqlite::Error> {
    let raw: String = row.get(index)?;
    JobId::try_new(raw).map_err(|err| corrupt(index, ValidationError::InvalidJobId(err)))
}

fn worker_id_at(row: &rusqlite::Row<'_>, index: usize) -> Result<WorkerId, rusqlite::Error> {
    let raw: String = row.get(index)?;
    WorkerId::try_new(raw).map_err(|err| corrupt(index, ValidationError::InvalidWorkerId(err)))
}

/// Reads a row selected with [`JOB_COLUMNS`].
pub(in crate::store) fn read_job_row(row: &rusqlite::Row<'_>) -> Result<Job, rusqlite::Error> {
    let state: String = row.get(2)?;
    let locked_by = match row.get::<_, Option<String>>(9)? {
        Some(_) => Some(worker_id_at(row, 9)?),
        None => None,
    };
    Ok(Job {
        id: job_id_at(row, 0)?,
        command: row.get(1)?,
        state: state.parse().map_err(|err| corrupt(2, err))?,
        attempts: row.get(3)?,
        max_retries: row.get(4)?,
        priority: row.get(5)?,
        created_at_ms: row.get(6)?,
        updated_at_ms: row.get(7)?,
        next_run_at_ms: row.get(8)?,
        locked_by,
        locked_at_ms: row.get(10)?,
        last_error: row.get(11)?,
        return_code: row.get(12)?,
        stdout: row.get(13)?,
        stderr: row.get(14)?,
        duration_ms: row.get(15)?,
    })
}

/// Reads a row selected with [`WORKER_COLUMNS`].
pub(in crate::store) fn read_worker_row(
    row: &rusqlite::Row<'_>,
) -> Result<WorkerInfo, rusqlite::Error> {
    let state: String = row.get(2)?;
    let current_job_id = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(job_id_at(row, 3)?),
        None => None,
    };
    Ok(WorkerInfo {
        id: worker_id_at(row, 0)?,
        pid: row.get(1)?,
        state: state.parse().map_err(|err| corrupt(2, err))?,
        current_job_id,
        started_at_ms: row.get(4)?,
        last_seen_at_ms: row.get(5)?,
        stopped_at_ms: row.get(6)?,
    })
}
