//! WebSocket accept path: transport adapter and per-socket session.

pub mod adapter;
pub mod session;

pub use adapter::{AxumSink, AxumStream};
pub use session::run_session;
