#![forbid(unsafe_code)]

mod rows;
mod schema;

pub(super) use rows::*;
pub(super) use schema::{migrate_sqlite_schema, schema_version};
