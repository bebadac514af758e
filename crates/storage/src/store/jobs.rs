#![forbid(unsafe_code)]

use super::config::read_queue_config;
use super::*;
use qc_core::ids::{JobId, WorkerId};
use qc_core::{Job, JobState, NewJob, Outcome, settle};
use rusqlite::params;
use tracing::debug;

pub(super) fn job_get_conn(conn: &Connection, id: &str) -> Result<Option<Job>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id=?1");
    Ok(conn
        .query_row(&sql, params![id], read_job_row)
        .optional()?)
}

impl SqliteStore {
    /// Inserts a new `pending` job. A duplicate id is a conflict, never an overwrite.
    pub fn enqueue(&mut self, new_job: &NewJob, now_ms: i64) -> Result<Job, StoreError> {
        let tx = self.immediate_tx()?;

        let max_retries = match new_job.max_retries {
            Some(value) => value,
            None => read_queue_config(&tx)?.max_retries_default,
        };

        let insert = tx.execute(
            r#"
            INSERT INTO jobs(id, command, state, attempts, max_retries, priority, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, 'pending', 0, ?3, ?4, ?5, ?5)
            "#,
            params![
                new_job.id.as_str(),
                new_job.command,
                max_retries,
                new_job.priority,
                now_ms
            ],
        );
        if let Err(err) = insert {
            return Err(map_insert_conflict(err, new_job.id.as_str()));
        }

        let job = job_get_conn(&tx, new_job.id.as_str())?.ok_or_else(|| StoreError::UnknownJob {
            job_id: new_job.id.to_string(),
        })?;
        tx.commit()?;
        debug!(job.id = %job.id, job.priority = job.priority, "job enqueued");
        Ok(job)
    }

    pub fn job_get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        job_get_conn(&self.conn, id.as_str())
    }

    /// Jobs in submission order, optionally filtered by state.
    pub fn jobs_list(&self, request: &JobsListRequest) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE (?1 IS NULL OR state=?1) \
             ORDER BY created_at_ms ASC, rowid ASC \
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let state = request.state.map(JobState::as_str);
        let rows = stmt.query_map(
            params![state, to_sqlite_limit(request.limit)],
            read_job_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn state_counts(&self) -> Result<StateCounts, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
              COALESCE(SUM(CASE WHEN state='pending' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN state='processing' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN state='completed' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN state='failed' THEN 1 ELSE 0 END), 0),
              COALESCE(SUM(CASE WHEN state='dead' THEN 1 ELSE 0 END), 0)
            FROM jobs
            "#,
        )?;
        let counts = stmt.query_row([], |row| {
            Ok(StateCounts {
                pending: row.get::<_, i64>(0)?.max(0) as u64,
                processing: row.get::<_, i64>(1)?.max(0) as u64,
                completed: row.get::<_, i64>(2)?.max(0) as u64,
                failed: row.get::<_, i64>(3)?.max(0) as u64,
                dead: row.get::<_, i64>(4)?.max(0) as u64,
            })
        })?;
        Ok(counts)
    }

    /// Atomically selects the best eligible job and marks it owned by `worker_id`.
    ///
    /// Eligible: `pending`/`failed` with `next_run_at` unset or due. Preference: priority
    /// descending, then `next_run_at` ascending with unset first, then submission order.
    /// The `BEGIN IMMEDIATE` write lock is what keeps two workers from selecting the same
    /// row. Contention surfaces as a busy error ([`StoreError::is_contention`]) and nothing
    /// is applied.
    pub fn claim(&mut self, worker_id: &WorkerId, now_ms: i64) -> Result<Option<Job>, StoreError> {
        let tx = self.immediate_tx()?;

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE state IN ('pending','failed') \
               AND (next_run_at_ms IS NULL OR next_run_at_ms <= ?1) \
             ORDER BY priority DESC, \
                      (next_run_at_ms IS NOT NULL) ASC, next_run_at_ms ASC, \
                      created_at_ms ASC, rowid ASC \
             LIMIT 1"
        );
        let candidate = tx
            .query_row(&sql, params![now_ms], read_job_row)
            .optional()?;
        let Some(candidate) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let changed = tx.execute(
            r#"
            UPDATE jobs
            SET state='processing', locked_by=?2, locked_at_ms=?3, updated_at_ms=?3
            WHERE id=?1 AND state IN ('pending','failed')
            "#,
            params![candidate.id.as_str(), worker_id.as_str(), now_ms],
        )?;
        if changed != 1 {
            tx.rollback()?;
            return Ok(None);
        }

        tx.execute(
            "UPDATE workers SET current_job_id=?2, last_seen_at_ms=?3 WHERE worker_id=?1",
            params![worker_id.as_str(), candidate.id.as_str(), now_ms],
        )?;

        let job = job_get_conn(&tx, candidate.id.as_str())?.ok_or_else(|| {
            StoreError::UnknownJob {
                job_id: candidate.id.to_string(),
            }
        })?;
        tx.commit()?;
        debug!(job.id = %job.id, worker.id = %worker_id, attempts = job.attempts, "job claimed");
        Ok(Some(job))
    }

    /// Records the outcome of the attempt `worker_id` just ran and moves the job to
    /// `completed`, `failed` (rescheduled with backoff) or `dead`, all in one transaction.
    pub fn settle(
        &mut self,
        job_id: &JobId,
        worker_id: &WorkerId,
        outcome: &Outcome,
        now_ms: i64,
    ) -> Result<Job, StoreError> {
        let tx = self.immediate_tx()?;

        let Some(job) = job_get_conn(&tx, job_id.as_str())? else {
            return Err(StoreError::UnknownJob {
                job_id: job_id.to_string(),
            });
        };
        if job.state != JobState::Processing || job.locked_by.as_ref() != Some(worker_id) {
            return Err(StoreError::ClaimMismatch {
                job_id: job_id.to_string(),
                worker_id: worker_id.to_string(),
            });
        }

        let config = read_queue_config(&tx)?;
        let update = settle(&job, outcome, now_ms, &config);

        let changed = tx.execute(
            r#"
            UPDATE jobs
            SET state=?3, attempts=?4, next_run_at_ms=?5, last_error=?6,
                return_code=?7, stdout=?8, stderr=?9, duration_ms=?10,
                locked_by=NULL, locked_at_ms=NULL, updated_at_ms=?11
            WHERE id=?1 AND state='processing' AND locked_by=?2
            "#,
            params![
                job_id.as_str(),
                worker_id.as_str(),
                update.state.as_str(),
                update.attempts,
                update.next_run_at_ms,
                update.last_error,
                outcome.return_code,
                outcome.stdout,
                outcome.stderr,
                outcome.duration_ms,
                now_ms,
            ],
        )?;
        if changed != 1 {
            return Err(StoreError::ClaimMismatch {
                job_id: job_id.to_string(),
                worker_id: worker_id.to_string(),
            });
        }

        tx.execute(
            r#"
            UPDATE workers
            SET current_job_id=NULL, last_seen_at_ms=?3
            WHERE worker_id=?1 AND current_job_id=?2
            "#,
            params![worker_id.as_str(), job_id.as_str(), now_ms],
        )?;

        let settled = job_get_conn(&tx, job_id.as_str())?.ok_or_else(|| StoreError::UnknownJob {
            job_id: job_id.to_string(),
        })?;
        tx.commit()?;
        Ok(settled)
    }
}
