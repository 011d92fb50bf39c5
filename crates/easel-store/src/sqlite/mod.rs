//! `SQLite` backend for the operation log.
//!
//! Split into four layers:
//!
//! - [`connection`]: pooled connections with WAL and friends preconfigured
//! - [`migrations`]: embedded, version-tracked schema steps
//! - [`row_types`]: structs that `rusqlite` row mapping decodes into
//! - [`repositories`]: the SQL itself, stateless, one method per query

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, PragmaState, new_file, new_in_memory,
    verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
