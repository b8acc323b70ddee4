//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why the relay settings could not be produced.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but reading it failed.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The file, or the merged result, does not fit the settings shape.
    #[error("malformed settings{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    Malformed {
        /// Settings file, when the file itself is at fault.
        path: Option<PathBuf>,
        /// Parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A field holds a value the hub cannot run with.
    #[error("{key}: {reason}")]
    Invalid {
        /// camelCase path of the field, e.g. `hub.queueCapacity`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
