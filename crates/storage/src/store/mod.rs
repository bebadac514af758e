#![forbid(unsafe_code)]

mod config;
mod control;
mod dlq;
mod error;
mod jobs;
mod status;
mod support;
mod types;
mod workers;

pub use error::StoreError;
pub use types::*;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use support::*;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_LIST_LIMIT: usize = 1000;

/// Durable job store backed by a single SQLite file.
///
/// Every worker (thread or process) opens its own `SqliteStore`; the database file is the
/// only shared state. Writes that must not interleave run inside `BEGIN IMMEDIATE`
/// transactions, which take SQLite's write lock up front.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        preflight_gate(&conn)?;
        migrate_sqlite_schema(&conn)?;

        Ok(Self { conn, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn immediate_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Refuses to run on top of a database that was not created by this store.
fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let known: BTreeSet<&str> = ["meta", "jobs", "workers", "config", "control"]
        .into_iter()
        .collect();
    if tables.iter().any(|table| !known.contains(table.as_str())) {
        return Err(StoreError::InvalidInput(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }
    if !tables.contains("meta") {
        return Ok(());
    }

    let version = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == schema_version() => Ok(()),
        Some(_) => Err(StoreError::InvalidInput(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Ok(()),
    }
}

fn map_insert_conflict(err: rusqlite::Error, job_id: &str) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::JobAlreadyExists {
            job_id: job_id.to_string(),
        };
    }
    StoreError::Sql(err)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            let unique = matches!(
                code.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            );
            unique
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn to_sqlite_limit(limit: usize) -> i64 {
    i64::try_from(limit.clamp(1, MAX_LIST_LIMIT)).unwrap_or(1)
}
