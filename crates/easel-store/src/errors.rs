//! Error type for the operation log.

use thiserror::Error;

/// Failures surfaced by the operation log.
///
/// Variants stay coarse: the flush scheduler only logs and retries, it never
/// branches on the cause. `#[from]` conversions let repository code apply `?`
/// directly to `rusqlite` and pool calls.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A statement or transaction failed inside `SQLite`.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No pooled connection became available in time.
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    /// A stored payload did not round-trip through JSON.
    #[error("payload encoding: {0}")]
    Serde(#[from] serde_json::Error),

    /// Applying an embedded schema migration failed.
    #[error("migration: {message}")]
    Migration {
        /// Which migration step and why.
        message: String,
    },
}

impl StoreError {
    /// Build a [`StoreError::Migration`] from a step description and cause.
    pub(crate) fn migration(step: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Self::Migration {
            message: format!("{step}: {cause}"),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
