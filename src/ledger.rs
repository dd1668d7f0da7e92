// src/ledger.rs

//! The usage ledger: durable first/last-seen bookkeeping per package.
//!
//! All mutation goes through `seed`, `touch`, `merge` and `mark_removed`;
//! `merge` and `commit_scan` wrap a whole scan's batch in one transaction so
//! readers see either the pre-scan or post-scan state, never an intermediate
//! one. Timestamps are stored as fixed-width RFC 3339 TEXT (millisecond
//! precision, `Z` suffix) so SQL `MAX()` on the column is chronological.

use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

/// One row of the usage ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub package_name: String,
    /// Set once, on first observation (by scan or catalog discovery).
    pub first_seen: DateTime<Utc>,
    /// Monotonically non-decreasing under normal operation.
    pub last_seen: DateTime<Utc>,
    /// Incremented once per scan in which the package was observed active.
    pub scan_count: i64,
    /// The package vanished from the catalog; the row is retained.
    pub removed: bool,
}

impl UsageRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            package_name: row.get(0)?,
            first_seen: parse_ts(1, &row.get::<_, String>(1)?)?,
            last_seen: parse_ts(2, &row.get::<_, String>(2)?)?,
            scan_count: row.get(3)?,
            removed: row.get::<_, i64>(4)? != 0,
        })
    }
}

/// Format a timestamp for storage. Fixed width keeps lexicographic order
/// equal to chronological order.
fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

const SELECT_COLUMNS: &str = "package_name, first_seen, last_seen, scan_count, removed";

/// Insert a record with `first_seen = last_seen = at` iff none exists.
///
/// This is the "new packages start as recently used" default: a package never
/// scanned before is seeded at discovery time, not at epoch zero. Returns
/// whether a new row was created.
pub fn seed(conn: &Connection, name: &str, at: DateTime<Utc>) -> Result<bool> {
    let rows = conn.execute(
        "INSERT OR IGNORE INTO usage_records (package_name, first_seen, last_seen, scan_count)
         VALUES (?1, ?2, ?2, 0)",
        params![name, fmt_ts(at)],
    )?;
    Ok(rows > 0)
}

/// Record an active observation: `last_seen = max(last_seen, at)` and
/// `scan_count += 1`. Creates the record with `seed` semantics if absent.
pub fn touch(conn: &Connection, name: &str, at: DateTime<Utc>) -> Result<()> {
    seed(conn, name, at)?;
    conn.execute(
        "UPDATE usage_records
         SET last_seen = MAX(last_seen, ?2), scan_count = scan_count + 1
         WHERE package_name = ?1",
        params![name, fmt_ts(at)],
    )?;
    Ok(())
}

/// Apply `touch` to every observed package in a single transaction.
///
/// On any error the transaction rolls back and previously committed state is
/// unaffected.
pub fn merge(conn: &mut Connection, observed: &BTreeSet<String>, at: DateTime<Utc>) -> Result<()> {
    let tx = conn.transaction()?;
    for name in observed {
        touch(&tx, name, at)?;
    }
    tx.commit()?;
    debug!("Merged scan batch of {} package(s)", observed.len());
    Ok(())
}

/// Flag ledger rows whose package is no longer in the catalog, and clear the
/// flag for packages that reappeared. Returns the number of newly flagged
/// rows.
pub fn mark_removed(conn: &Connection, installed: &BTreeSet<String>) -> Result<usize> {
    let mut flagged = 0;
    for record in get_all(conn)? {
        let gone = !installed.contains(&record.package_name);
        if gone != record.removed {
            conn.execute(
                "UPDATE usage_records SET removed = ?2 WHERE package_name = ?1",
                params![record.package_name, gone as i64],
            )?;
            if gone {
                flagged += 1;
            }
        }
    }
    Ok(flagged)
}

/// Commit one complete scan atomically: seed every catalog package, touch
/// every observed package, and reconcile the removed flags.
pub fn commit_scan(
    conn: &mut Connection,
    installed: &BTreeSet<String>,
    observed: &BTreeSet<String>,
    at: DateTime<Utc>,
) -> Result<()> {
    let tx = conn.transaction()?;
    for name in installed {
        seed(&tx, name, at)?;
    }
    for name in observed {
        touch(&tx, name, at)?;
    }
    mark_removed(&tx, installed)?;
    tx.commit()?;
    Ok(())
}

/// Startup reconciliation: seed any catalog package absent from the ledger
/// as "seen now", then refresh removed flags. Returns the number of packages
/// seeded.
pub fn reconcile(
    conn: &mut Connection,
    installed: &BTreeSet<String>,
    at: DateTime<Utc>,
) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut seeded = 0;
    for name in installed {
        if seed(&tx, name, at)? {
            seeded += 1;
        }
    }
    mark_removed(&tx, installed)?;
    tx.commit()?;
    Ok(seeded)
}

/// Snapshot read of the whole ledger, ordered by package name.
pub fn get_all(conn: &Connection) -> Result<Vec<UsageRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM usage_records ORDER BY package_name",
        SELECT_COLUMNS
    ))?;
    let records = stmt
        .query_map([], UsageRecord::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Look up a single record by package name.
pub fn get(conn: &Connection, name: &str) -> Result<Option<UsageRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM usage_records WHERE package_name = ?1",
        SELECT_COLUMNS
    ))?;
    let record = stmt.query_row([name], UsageRecord::from_row).optional()?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn set_of(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seed_sets_first_equal_last() {
        let (_temp, conn) = create_test_db();
        let t = ts(2024, 1, 1);

        assert!(seed(&conn, "firefox", t).unwrap());

        let record = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(record.first_seen, t);
        assert_eq!(record.last_seen, t);
        assert_eq!(record.scan_count, 0);
        assert!(!record.removed);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (_temp, conn) = create_test_db();
        let t1 = ts(2024, 1, 1);
        let t2 = ts(2024, 2, 1);

        assert!(seed(&conn, "firefox", t1).unwrap());
        assert!(!seed(&conn, "firefox", t2).unwrap());

        let record = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(record.first_seen, t1);
        assert_eq!(record.last_seen, t1);
    }

    #[test]
    fn test_touch_advances_last_seen_and_count() {
        let (_temp, conn) = create_test_db();
        let t1 = ts(2024, 1, 1);
        let t2 = ts(2024, 1, 15);

        touch(&conn, "firefox", t1).unwrap();
        touch(&conn, "firefox", t2).unwrap();

        let record = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(record.first_seen, t1);
        assert_eq!(record.last_seen, t2);
        assert_eq!(record.scan_count, 2);
    }

    #[test]
    fn test_touch_never_moves_last_seen_backwards() {
        let (_temp, conn) = create_test_db();
        let t1 = ts(2024, 3, 1);
        let stale = ts(2024, 1, 1);

        touch(&conn, "firefox", t1).unwrap();
        // A stale timestamp (clock skew) still counts the scan but keeps
        // last_seen monotonic.
        touch(&conn, "firefox", stale).unwrap();

        let record = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(record.last_seen, t1);
        assert_eq!(record.scan_count, 2);
    }

    #[test]
    fn test_merge_touches_whole_batch() {
        let (_temp, mut conn) = create_test_db();
        let t = ts(2024, 1, 1);

        merge(&mut conn, &set_of(&["firefox", "vim", "zsh"]), t).unwrap();

        let records = get_all(&conn).unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.scan_count, 1);
            assert_eq!(record.last_seen, t);
        }
        // get_all is ordered by name
        assert_eq!(records[0].package_name, "firefox");
        assert_eq!(records[2].package_name, "zsh");
    }

    #[test]
    fn test_merge_failure_leaves_committed_state_untouched() {
        let (_temp, mut conn) = create_test_db();
        let t1 = ts(2024, 1, 1);
        let t2 = ts(2024, 2, 1);

        merge(&mut conn, &set_of(&["firefox", "vim"]), t1).unwrap();
        let before = get_all(&conn).unwrap();

        // Simulate a storage failure mid-merge: the database rejects writes.
        conn.pragma_update(None, "query_only", true).unwrap();
        let result = merge(&mut conn, &set_of(&["firefox", "vim"]), t2);
        assert!(result.is_err());
        conn.pragma_update(None, "query_only", false).unwrap();

        let after = get_all(&conn).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_mark_removed_flags_and_unflags() {
        let (_temp, mut conn) = create_test_db();
        let t = ts(2024, 1, 1);

        merge(&mut conn, &set_of(&["firefox", "vim"]), t).unwrap();

        // vim disappears from the catalog
        let flagged = mark_removed(&conn, &set_of(&["firefox"])).unwrap();
        assert_eq!(flagged, 1);
        assert!(get(&conn, "vim").unwrap().unwrap().removed);
        assert!(!get(&conn, "firefox").unwrap().unwrap().removed);

        // vim is reinstalled
        let flagged = mark_removed(&conn, &set_of(&["firefox", "vim"])).unwrap();
        assert_eq!(flagged, 0);
        assert!(!get(&conn, "vim").unwrap().unwrap().removed);
    }

    #[test]
    fn test_reconcile_seeds_only_missing() {
        let (_temp, mut conn) = create_test_db();
        let t1 = ts(2024, 1, 1);
        let t2 = ts(2024, 2, 1);

        touch(&conn, "firefox", t1).unwrap();

        let seeded = reconcile(&mut conn, &set_of(&["firefox", "vim"]), t2).unwrap();
        assert_eq!(seeded, 1);

        // Pre-existing record is untouched by reconciliation
        let firefox = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(firefox.last_seen, t1);
        assert_eq!(firefox.scan_count, 1);

        // The new package starts as recently used
        let vim = get(&conn, "vim").unwrap().unwrap();
        assert_eq!(vim.first_seen, t2);
        assert_eq!(vim.last_seen, t2);
        assert_eq!(vim.scan_count, 0);
    }

    #[test]
    fn test_commit_scan_seeds_touches_and_flags() {
        let (_temp, mut conn) = create_test_db();
        let t1 = ts(2024, 1, 1);
        let t2 = ts(2024, 2, 1);

        commit_scan(&mut conn, &set_of(&["firefox", "vim"]), &set_of(&["firefox"]), t1).unwrap();

        let firefox = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(firefox.scan_count, 1);
        let vim = get(&conn, "vim").unwrap().unwrap();
        assert_eq!(vim.scan_count, 0);
        assert_eq!(vim.first_seen, t1);

        // Next scan: vim was uninstalled, firefox idle
        commit_scan(&mut conn, &set_of(&["firefox"]), &BTreeSet::new(), t2).unwrap();

        let firefox = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(firefox.last_seen, t1);
        assert_eq!(firefox.scan_count, 1);
        assert!(get(&conn, "vim").unwrap().unwrap().removed);
    }

    #[test]
    fn test_timestamp_roundtrip_is_lossless() {
        let (_temp, conn) = create_test_db();
        let t = Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(250);

        seed(&conn, "firefox", t).unwrap();
        let record = get(&conn, "firefox").unwrap().unwrap();
        assert_eq!(record.first_seen, t);
    }
}
