#![forbid(unsafe_code)]

use super::jobs::job_get_conn;
use super::*;
use qc_core::ids::JobId;
use qc_core::{Job, JobState};
use rusqlite::params;
use tracing::{info, warn};

impl SqliteStore {
    /// Dead jobs, most recently dead first.
    pub fn dlq_list(&self, request: &DlqListRequest) -> Result<Vec<Job>, StoreError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE state='dead' \
             ORDER BY updated_at_ms DESC, id ASC \
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![to_sqlite_limit(request.limit)], read_job_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Returns a dead job to `pending`.
    ///
    /// `attempts` is left as-is: `max_retries` is a fixed budget that requeueing does not
    /// renew, so a job requeued without raising its budget dies again on its next failure.
    pub fn dlq_requeue(&mut self, id: &JobId, now_ms: i64) -> Result<Job, StoreError> {
        self.requeue_dead(id, None, now_ms)
    }

    /// Like [`Self::dlq_requeue`], but raises the job's retry budget in the same write.
    pub fn dlq_requeue_with_budget(
        &mut self,
        id: &JobId,
        max_retries: u32,
        now_ms: i64,
    ) -> Result<Job, StoreError> {
        self.requeue_dead(id, Some(max_retries), now_ms)
    }

    fn requeue_dead(
        &mut self,
        id: &JobId,
        max_retries: Option<u32>,
        now_ms: i64,
    ) -> Result<Job, StoreError> {
        let tx = self.immediate_tx()?;

        let Some(current) = job_get_conn(&tx, id.as_str())? else {
            return Err(StoreError::UnknownJob {
                job_id: id.to_string(),
            });
        };
        if current.state != JobState::Dead {
            return Err(StoreError::JobNotDead {
                job_id: id.to_string(),
                state: current.state,
            });
        }

        tx.execute(
            r#"
            UPDATE jobs
            SET state='pending', next_run_at_ms=NULL, last_error=NULL, updated_at_ms=?2,
                max_retries=COALESCE(?3, max_retries)
            WHERE id=?1 AND state='dead'
            "#,
            params![id.as_str(), now_ms, max_retries],
        )?;

        let job = job_get_conn(&tx, id.as_str())?.ok_or_else(|| StoreError::UnknownJob {
            job_id: id.to_string(),
        })?;
        tx.commit()?;

        if job.attempts > job.max_retries {
            warn!(
                job.id = %job.id,
                attempts = job.attempts,
                max_retries = job.max_retries,
                "requeued job has exhausted max_retries; its next failure returns it to the DLQ"
            );
        } else {
            info!(job.id = %job.id, attempts = job.attempts, "job moved from DLQ to pending");
        }
        Ok(job)
    }
}
