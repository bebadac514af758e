#![forbid(unsafe_code)]

use super::*;
use rusqlite::params;
use tracing::info;

const SHUTDOWN_KEY: &str = "shutdown";

impl SqliteStore {
    /// The durable shutdown flag every worker reads between jobs.
    pub fn shutdown_requested(&self) -> Result<bool, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM control WHERE key=?1",
                params![SHUTDOWN_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.as_deref() == Some("1"))
    }

    pub fn request_shutdown(&mut self, now_ms: i64) -> Result<(), StoreError> {
        self.write_shutdown_flag(true, now_ms)?;
        info!("shutdown flag set");
        Ok(())
    }

    /// Clears the shutdown flag. Never done implicitly by a worker loop.
    pub fn clear_shutdown(&mut self, now_ms: i64) -> Result<(), StoreError> {
        self.write_shutdown_flag(false, now_ms)
    }

    fn write_shutdown_flag(&mut self, value: bool, now_ms: i64) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO control(key, value, updated_at_ms) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms
            "#,
            params![SHUTDOWN_KEY, if value { "1" } else { "0" }, now_ms],
        )?;
        Ok(())
    }
}
