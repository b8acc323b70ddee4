//! # relay-server
//!
//! The accepting side of the relay hub.
//!
//! - HTTP endpoints: WebSocket upgrade (`/ws?id=..`), `/health`, and
//!   `/metrics` when a Prometheus handle is attached
//! - Accept path: id assignment, duplicate-id reject or replace, registry,
//!   connection actor over the axum socket
//! - Server handlers (`JOIN`) and the default peer policy
//! - Graceful shutdown: finish every connection, drain the hub, run hooks

#![deny(unsafe_code)]

pub mod config;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, RelayServer};
pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownHook, run_shutdown_hooks};
