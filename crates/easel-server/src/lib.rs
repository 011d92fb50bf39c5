//! # easel-server
//!
//! The whiteboard's network surface: an Axum app serving the `WebSocket`
//! gateway (join/op/state frame dispatch, heartbeats, bounded per-client
//! queues) next to plain HTTP for session creation, history replay, the
//! health check, and Prometheus metrics. A single [`ShutdownCoordinator`]
//! threads cancellation through all of it.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, EaselServer};
pub use shutdown::ShutdownCoordinator;
