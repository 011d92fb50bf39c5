//! # easel-core
//!
//! Foundation types for the Easel whiteboard backend.
//!
//! This crate provides the shared vocabulary that all other Easel crates
//! depend on:
//!
//! - **Identifiers**: `SessionId` (client-named rooms) and `ConnectionId`
//!   (server-minted per socket)
//! - **Wire frames**: `ClientFrame` / `ServerFrame`, the tagged JSON protocol
//! - **Pending operations**: `PendingOp`, the unit held in the flush buffer
//! - **Logging**: `init_subscriber` for the `tracing` stderr subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod op;
pub mod wire;

pub use ids::{ConnectionId, SessionId};
pub use op::PendingOp;
pub use wire::{ClientFrame, ServerFrame};
