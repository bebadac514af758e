#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- One row per submitted unit of work. Only the latest attempt's result is kept.
        CREATE TABLE IF NOT EXISTS jobs (
          id TEXT PRIMARY KEY,
          command TEXT NOT NULL,
          state TEXT NOT NULL
            CHECK(state IN ('pending','processing','completed','failed','dead')),
          attempts INTEGER NOT NULL DEFAULT 0 CHECK(attempts >= 0),
          max_retries INTEGER NOT NULL CHECK(max_retries >= 0),
          priority INTEGER NOT NULL DEFAULT 0,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          next_run_at_ms INTEGER,
          locked_by TEXT,
          locked_at_ms INTEGER,
          last_error TEXT,
          return_code INTEGER,
          stdout TEXT,
          stderr TEXT,
          duration_ms INTEGER,
          CHECK((state = 'processing') = (locked_by IS NOT NULL)),
          CHECK((locked_by IS NULL) = (locked_at_ms IS NULL))
        );
"#;
