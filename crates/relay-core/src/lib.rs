//! # relay-core
//!
//! Foundation types shared by both sides of the relay hub.
//!
//! - **Kinds**: [`MessageKind`] newtype, the reserved `ERR` sentinel, error codes
//! - **Codec**: the length-prefixed binary frame format (simple and extended)
//! - **Join**: the `JOIN` request and acknowledgment payloads
//! - **Ids**: the [`IdGenerator`] capability used to mint connection ids
//! - **Deferred**: delayed actions with bounded retry and panic isolation
//! - **Logging**: `tracing` subscriber bootstrap and log capture for tests

#![deny(unsafe_code)]

pub mod codec;
pub mod deferred;
pub mod ids;
pub mod join;
pub mod kinds;
pub mod logging;

pub use codec::{CodecError, ExtendedFrame, Frame};
pub use deferred::{Deferred, DeferredError, safe_run, try_times};
pub use ids::{IdGenerator, SequenceGenerator, UuidGenerator};
pub use join::{JoinAck, JoinRequest};
pub use kinds::{ErrorBody, MessageKind, error_codes};
