#![forbid(unsafe_code)]

mod sql;

use super::super::StoreError;
use qc_core::ConfigKey;
use rusqlite::{Connection, params};

const SCHEMA_VERSION: &str = "1";

pub(in crate::store) fn migrate_sqlite_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&sql::full_schema_sql())?;

    for key in ConfigKey::ALL {
        conn.execute(
            "INSERT OR IGNORE INTO config(key, value) VALUES (?1, ?2)",
            params![key.as_str(), key.default_value().to_string()],
        )?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO control(key, value, updated_at_ms) VALUES ('shutdown', '0', 0)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;

    Ok(())
}

pub(in crate::store) fn schema_version() -> &'static str {
    SCHEMA_VERSION
}
