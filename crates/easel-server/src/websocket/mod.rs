//! The WebSocket gateway: upgrade checks, the per-socket session loop, and
//! frame dispatch.

pub mod handler;
pub mod session;
