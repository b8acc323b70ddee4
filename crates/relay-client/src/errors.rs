//! Client errors.

use relay_core::CodecError;
use relay_hub::ConnectionError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the dial entry point and its helpers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured URL cannot be dialed.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The handshake failed.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        /// The dialed URL.
        url: String,
        /// Underlying socket error.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// A payload could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The connection no longer accepts payloads.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
