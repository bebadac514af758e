#![forbid(unsafe_code)]

use super::*;
use qc_core::{ConfigKey, QueueConfig};
use rusqlite::params;

fn read_value(conn: &Connection, key: ConfigKey) -> Result<u64, StoreError> {
    let raw = conn
        .query_row(
            "SELECT value FROM config WHERE key=?1",
            params![key.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    match raw {
        Some(raw) => key
            .validate(&raw)
            .map_err(|err| StoreError::CorruptRow(err.to_string())),
        None => Ok(key.default_value()),
    }
}

pub(super) fn read_queue_config(conn: &Connection) -> Result<QueueConfig, StoreError> {
    let narrow = |key: ConfigKey, value: u64| {
        u32::try_from(value)
            .map_err(|_| StoreError::CorruptRow(format!("{} is out of range", key.as_str())))
    };
    let backoff_base = read_value(conn, ConfigKey::BackoffBase)?;
    let max_retries_default = read_value(conn, ConfigKey::MaxRetriesDefault)?;
    Ok(QueueConfig {
        backoff_base: narrow(ConfigKey::BackoffBase, backoff_base)?,
        max_retries_default: narrow(ConfigKey::MaxRetriesDefault, max_retries_default)?,
        job_timeout_sec: read_value(conn, ConfigKey::JobTimeoutSec)?,
    })
}

impl SqliteStore {
    pub fn queue_config(&self) -> Result<QueueConfig, StoreError> {
        read_queue_config(&self.conn)
    }

    pub fn config_get(&self, key: ConfigKey) -> Result<u64, StoreError> {
        read_value(&self.conn, key)
    }

    pub fn config_list(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        ConfigKey::ALL
            .into_iter()
            .map(|key| {
                Ok(ConfigEntry {
                    key,
                    value: read_value(&self.conn, key)?,
                })
            })
            .collect()
    }

    /// Validates and persists a value. Workers pick it up before their next execution.
    pub fn config_set(&mut self, key: ConfigKey, raw: &str) -> Result<u64, StoreError> {
        let value = key.validate(raw)?;
        self.conn.execute(
            r#"
            INSERT INTO config(key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key.as_str(), value.to_string()],
        )?;
        Ok(value)
    }
}
