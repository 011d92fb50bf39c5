//! High-level `OpStore` API.
//!
//! The [`OpStore`] provides a transactional, session-centric API built on top
//! of the repository layer. Batch writes execute within a single `SQLite`
//! transaction, so callers never see partial state.

mod op_store;

pub use op_store::*;
