#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- Worker liveness. A row is inserted when a worker loop starts and marked
        -- stopped on clean exit; it is never deleted automatically.
        CREATE TABLE IF NOT EXISTS workers (
          worker_id TEXT PRIMARY KEY,
          pid INTEGER NOT NULL,
          state TEXT NOT NULL CHECK(state IN ('running','stopping','stopped')),
          current_job_id TEXT,
          started_at_ms INTEGER NOT NULL,
          last_seen_at_ms INTEGER NOT NULL,
          stopped_at_ms INTEGER
        );
"#;
