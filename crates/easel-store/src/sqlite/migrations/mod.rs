//! Embedded schema migrations.
//!
//! Each migration ships inside the binary via [`include_str!`] and carries a
//! version number. Applied versions are recorded in `schema_version`, so
//! running the migrator on an up-to-date database is a no-op. A migration
//! executes inside one transaction and either lands completely or not at all.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// One versioned schema step.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

impl Migration {
    /// Execute this step and record it, all in one transaction.
    fn apply(&self, conn: &Connection) -> Result<()> {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::migration(format_args!("begin v{}", self.version), e))?;
        tx.execute_batch(self.sql).map_err(|e| {
            StoreError::migration(format_args!("v{} ({})", self.version, self.description), e)
        })?;
        let _ = tx
            .execute(
                "INSERT INTO schema_version (version, applied_at, description)
                 VALUES (?1, datetime('now'), ?2)",
                rusqlite::params![self.version, self.description],
            )
            .map_err(|e| StoreError::migration(format_args!("record v{}", self.version), e))?;
        tx.commit()
            .map_err(|e| StoreError::migration(format_args!("commit v{}", self.version), e))
    }
}

/// All migrations, oldest first.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Operation log table and replay index",
    sql: include_str!("v001_ops.sql"),
}];

/// Bring the database up to the latest schema.
///
/// Returns how many steps were applied (0 when already current).
///
/// # Errors
///
/// Returns [`StoreError::Migration`] when a step fails; the failing step
/// rolls back and nothing after it runs.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let have = current_version(conn)?;

    let mut applied = 0;
    for step in MIGRATIONS.iter().filter(|m| m.version > have) {
        info!(
            version = step.version,
            description = step.description,
            "applying schema migration"
        );
        step.apply(conn)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = have, "schema up to date");
    } else {
        info!(applied, "schema migrated");
    }
    Ok(applied)
}

/// Highest version recorded in `schema_version`, 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT IFNULL(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::migration("read schema_version", e))
}

/// Version the code expects after a full run.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL,
            description TEXT
        )",
    )
    .map_err(|e| StoreError::migration("create schema_version", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
