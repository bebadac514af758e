#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        CREATE INDEX IF NOT EXISTS idx_jobs_state_next_run
          ON jobs(state, next_run_at_ms);

        CREATE INDEX IF NOT EXISTS idx_jobs_claim_order
          ON jobs(priority DESC, next_run_at_ms, created_at_ms);

        CREATE INDEX IF NOT EXISTS idx_jobs_state_updated
          ON jobs(state, updated_at_ms);
"#;
