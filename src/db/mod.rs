// src/db/mod.rs

//! SQLite connection helpers for the usage ledger.
//!
//! Connections are opened on demand (one per blocking task); WAL mode lets
//! the query path read while a scan commits.

pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// Open the ledger database, creating parent directories and applying any
/// pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    schema::migrate(&conn)?;

    Ok(conn)
}

/// Initialize the database at the given path. Equivalent to `open` but logs
/// the location; used by the `init` subcommand.
pub fn init(path: &Path) -> Result<()> {
    debug!("Initializing ledger database at {}", path.display());
    open(path)?;
    Ok(())
}
