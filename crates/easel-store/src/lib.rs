//! # easel-store
//!
//! Durable operation log with `SQLite` backend for the Easel whiteboard.
//!
//! Responsible for:
//!
//! - **Op store**: Transactional batch append and ordered replay queries
//! - **`SQLite` backend**: `rusqlite` facade with a repository layer, `r2d2`
//!   connection pooling (WAL mode), and version-tracked migrations
//!
//! The flush scheduler in `easel-sync` is the sole writer; HTTP history
//! requests read concurrently through the same pool.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{Result, StoreError};
pub use sqlite::{ConnectionConfig, ConnectionPool, new_file, new_in_memory, run_migrations};
pub use store::OpStore;
