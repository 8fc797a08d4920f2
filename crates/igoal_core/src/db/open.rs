//! Connection bootstrap utilities for the graph database.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure pragmas the graph store relies on.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::GraphConfig;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Lock wait applied when the caller does not configure one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a graph database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when missing.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>, busy_timeout: Duration) -> DbResult<Connection> {
    open_with("file", busy_timeout, || Connection::open(path))
}

/// Opens an in-memory graph database and applies all pending migrations.
///
/// Each call returns an independent, empty graph.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", DEFAULT_BUSY_TIMEOUT, Connection::open_in_memory)
}

/// Opens the database named by `config.db_path`, or an in-memory one when unset.
pub fn open_db_from_config(config: &GraphConfig) -> DbResult<Connection> {
    match config.db_path.as_deref() {
        Some(path) => open_db(path, config.busy_timeout()),
        None => open_with("memory", config.busy_timeout(), Connection::open_in_memory),
    }
}

fn open_with(
    mode: &'static str,
    busy_timeout: Duration,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        err
    })?;

    if let Err(err) = bootstrap_connection(&mut conn, busy_timeout) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, busy_timeout: Duration) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
