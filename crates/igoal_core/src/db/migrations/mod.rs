//! Graph schema versions.
//!
//! # Responsibility
//! - Bring `graph_nodes` / `graph_edges` and their unique indexes up to the
//!   version this binary queries against.
//!
//! # Invariants
//! - Versions start at 1 and increase by one; `PRAGMA user_version` holds the
//!   last applied one.
//! - All pending steps commit together or not at all.
//! - Uniqueness indexes (step 2) exist before any store writes a node, since
//!   identity upserts name them as their conflict target.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "graph_init",
        sql: include_str!("0001_graph_init.sql"),
    },
    SchemaStep {
        version: 2,
        name: "xid_uniqueness",
        sql: include_str!("0002_xid_uniqueness.sql"),
    },
];

/// Highest schema version this binary knows how to produce.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Applies every step newer than the connection's `user_version`.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] when the file was written by a
///   newer binary.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let pending: Vec<&SchemaStep> = pending_steps(from).collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={from} to={latest} steps={}",
        pending
            .iter()
            .map(|step| step.name)
            .collect::<Vec<_>>()
            .join(",")
    );
    Ok(())
}

/// Reads the schema version stored on the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn pending_steps(from: u32) -> impl Iterator<Item = &'static SchemaStep> {
    SCHEMA_STEPS.iter().filter(move |step| step.version > from)
}
