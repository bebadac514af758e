#![forbid(unsafe_code)]

pub(super) const SQL: &str = r#"

        -- Process-wide control flags. `shutdown` is the only one today.
        CREATE TABLE IF NOT EXISTS control (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL DEFAULT 0
        );
"#;
