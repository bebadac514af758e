#![forbid(unsafe_code)]

use qc_core::{Job, WorkerInfo};
use qc_storage::{ConfigEntry, StatusReport};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Unix milliseconds as RFC 3339. Out-of-range values fall back to the raw number.
pub(crate) fn timestamp(ms: i64) -> Value {
    let formatted = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|at| at.format(&Rfc3339).ok());
    match formatted {
        Some(text) => Value::String(text),
        None => json!(ms),
    }
}

fn opt_timestamp(ms: Option<i64>) -> Value {
    ms.map(timestamp).unwrap_or(Value::Null)
}

pub(crate) fn job(job: &Job) -> Value {
    json!({
        "id": job.id,
        "command": job.command,
        "state": job.state,
        "attempts": job.attempts,
        "max_retries": job.max_retries,
        "priority": job.priority,
        "created_at": timestamp(job.created_at_ms),
        "updated_at": timestamp(job.updated_at_ms),
        "next_run_at": opt_timestamp(job.next_run_at_ms),
        "locked_by": job.locked_by,
        "locked_at": opt_timestamp(job.locked_at_ms),
        "last_error": job.last_error,
        "return_code": job.return_code,
        "stdout": job.stdout,
        "stderr": job.stderr,
        "duration_ms": job.duration_ms,
    })
}

pub(crate) fn jobs(jobs: &[Job]) -> Value {
    Value::Array(jobs.iter().map(job).collect())
}

pub(crate) fn worker(worker: &WorkerInfo) -> Value {
    json!({
        "id": worker.id,
        "pid": worker.pid,
        "state": worker.state,
        "current_job_id": worker.current_job_id,
        "started_at": timestamp(worker.started_at_ms),
        "last_seen_at": timestamp(worker.last_seen_at_ms),
        "stopped_at": opt_timestamp(worker.stopped_at_ms),
    })
}

pub(crate) fn status(report: &StatusReport) -> Value {
    let mut counts = Map::new();
    for state in qc_core::JobState::ALL {
        counts.insert(state.as_str().to_string(), json!(report.jobs.get(state)));
    }
    counts.insert("total".to_string(), json!(report.jobs.total()));
    let active = report
        .workers
        .iter()
        .filter(|row| row.state != qc_core::WorkerState::Stopped)
        .count();

    json!({
        "jobs": counts,
        "workers": {
            "active": active,
            "rows": report.workers.iter().map(worker).collect::<Vec<_>>(),
        },
        "shutdown_requested": report.shutdown_requested,
    })
}

pub(crate) fn config(entries: &[ConfigEntry]) -> Value {
    let mut out = Map::new();
    for entry in entries {
        out.insert(entry.key.as_str().to_string(), json!(entry.value));
    }
    Value::Object(out)
}
