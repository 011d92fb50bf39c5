//! `SQLite` connection pooling.
//!
//! One `r2d2` pool serves both populations of the store: the flush scheduler
//! writing batches and HTTP history readers. WAL mode keeps those readers off
//! the writer's lock; the remaining pragmas are applied through the manager's
//! init hook so every physical connection starts identically configured.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;

/// Pool handle shared by the store and its callers.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// One checked-out connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Tunables for the pool and per-connection pragmas.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Upper bound on open connections (default 8).
    pub pool_size: u32,
    /// How long a locked database is retried before erroring, in
    /// milliseconds (default 30000).
    pub busy_timeout_ms: u32,
    /// Page cache per connection, in KiB (default 8192).
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

impl ConnectionConfig {
    /// Pragma batch applied to every new connection.
    fn init_sql(&self) -> String {
        format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};
             PRAGMA cache_size = -{};
             PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms, self.cache_size_kib
        )
    }
}

fn pooled(manager: SqliteConnectionManager, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let init = config.init_sql();
    let manager = manager.with_init(move |conn| conn.execute_batch(&init));
    Ok(Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(5))
        .build(manager)?)
}

/// Open an in-memory pool for tests.
///
/// The manager hands every pooled connection the same shared-cache database,
/// so a write through one connection is readable through the rest.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    pooled(SqliteConnectionManager::memory(), config)
}

/// Open a file-backed pool, creating the database file if absent.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    pooled(SqliteConnectionManager::file(path), config)
}

/// Snapshot of the pragmas a connection is actually running with.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode reported by `SQLite` ("wal" for file databases,
    /// "memory" in-memory).
    pub journal_mode: String,
    /// Whether foreign key enforcement is on.
    pub foreign_keys_enabled: bool,
    /// Synchronous level (1 = NORMAL).
    pub synchronous: i64,
}

/// Read back the pragma state of one connection.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.pragma_query_value(None, "journal_mode", |row| row.get(0))?;
    let foreign_keys: i64 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    let synchronous: i64 = conn.pragma_query_value(None, "synchronous", |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
        synchronous,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
