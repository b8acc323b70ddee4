//! # relay-client
//!
//! Initiating side of the relay hub.
//!
//! - **Dial**: [`RelayClient::connect`] upgrades to the server and runs the
//!   shared connection actor with [`Side::Client`](relay_hub::Side) roles
//! - **Handlers**: `JOIN` acknowledgments, and an `ERR` route that logs the
//!   server's reports instead of answering them
//! - **Join**: [`handlers::send_join`] announces the client's identity

#![deny(unsafe_code)]

pub mod adapter;
pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;

pub use client::RelayClient;
pub use config::ClientConfig;
pub use errors::{ClientError, Result};
