//! # easel-sync
//!
//! Real-time synchronization core for the Easel whiteboard backend.
//!
//! Responsible for:
//!
//! - **Session registry**: which connections belong to which sessions
//! - **Fan-out bus**: non-blocking broadcast to session members with
//!   originator exclusion and per-member overflow drops
//! - **Relay**: pluggable cross-instance pub/sub (`Relay` trait) with an
//!   in-process `MemoryRelay` and a bridge that re-broadcasts relayed
//!   frames to local members
//! - **Pending buffer + flush scheduler**: accumulates drawing operations
//!   in memory and persists them in periodic transactional batches
//!
//! Broadcast never waits on persistence: the bus hands a frame to every
//! member queue and returns, while the scheduler drains the buffer on its
//! own cadence.

#![deny(unsafe_code)]

pub mod bridge;
pub mod buffer;
pub mod bus;
pub mod connection;
pub mod flush;
pub mod registry;
pub mod relay;

pub use bridge::RelayBridge;
pub use buffer::PendingBuffer;
pub use bus::FanoutBus;
pub use connection::ClientConnection;
pub use flush::{FlushConfig, FlushScheduler};
pub use registry::SessionRegistry;
pub use relay::{MemoryRelay, Relay, RelayEnvelope, RelayError};
