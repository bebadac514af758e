#![forbid(unsafe_code)]

use super::*;
use qc_core::ids::WorkerId;
use qc_core::{WorkerInfo, WorkerState};
use rusqlite::params;
use std::time::Duration;

impl SqliteStore {
    /// Inserts (or revives) the row for a worker loop that is starting up.
    pub fn worker_register(
        &mut self,
        worker_id: &WorkerId,
        pid: u32,
        now_ms: i64,
    ) -> Result<WorkerInfo, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO workers(worker_id, pid, state, current_job_id, started_at_ms, last_seen_at_ms, stopped_at_ms)
            VALUES (?1, ?2, 'running', NULL, ?3, ?3, NULL)
            ON CONFLICT(worker_id) DO UPDATE SET
              pid=excluded.pid, state='running', current_job_id=NULL,
              started_at_ms=excluded.started_at_ms, last_seen_at_ms=excluded.last_seen_at_ms,
              stopped_at_ms=NULL
            "#,
            params![worker_id.as_str(), pid, now_ms],
        )?;
        self.worker_get(worker_id)?
            .ok_or(StoreError::InvalidInput("worker row vanished after insert"))
    }

    pub fn worker_get(&self, worker_id: &WorkerId) -> Result<Option<WorkerInfo>, StoreError> {
        let sql = format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id=?1");
        Ok(self
            .conn
            .query_row(&sql, params![worker_id.as_str()], read_worker_row)
            .optional()?)
    }

    pub fn worker_heartbeat(&mut self, worker_id: &WorkerId, now_ms: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE workers SET last_seen_at_ms=?2 WHERE worker_id=?1",
            params![worker_id.as_str(), now_ms],
        )?;
        Ok(())
    }

    /// Heartbeat that waits at most `wait` for the write lock instead of the store-wide
    /// busy timeout. Used while a job runs, where a long lock wait would delay its timeout.
    pub fn worker_heartbeat_within(
        &mut self,
        worker_id: &WorkerId,
        now_ms: i64,
        wait: Duration,
    ) -> Result<(), StoreError> {
        self.conn.busy_timeout(wait)?;
        let result = self.worker_heartbeat(worker_id, now_ms);
        self.conn.busy_timeout(super::BUSY_TIMEOUT)?;
        result
    }

    pub fn worker_set_state(
        &mut self,
        worker_id: &WorkerId,
        state: WorkerState,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let stopped_at_ms = (state == WorkerState::Stopped).then_some(now_ms);
        self.conn.execute(
            r#"
            UPDATE workers
            SET state=?2, last_seen_at_ms=?3, stopped_at_ms=?4,
                current_job_id=CASE WHEN ?2='stopped' THEN NULL ELSE current_job_id END
            WHERE worker_id=?1
            "#,
            params![worker_id.as_str(), state.as_str(), now_ms, stopped_at_ms],
        )?;
        Ok(())
    }

    pub fn workers_list(&self) -> Result<Vec<WorkerInfo>, StoreError> {
        let sql = format!(
            "SELECT {WORKER_COLUMNS} FROM workers ORDER BY started_at_ms ASC, worker_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], read_worker_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
