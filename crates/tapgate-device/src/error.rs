//! Error types for device-level operations.
//!
//! The controller catches every tick-level error at its supervisor,
//! logs it and keeps looping, so these variants exist to make log
//! output and retry decisions precise rather than to abort anything.

use tapgate_reader::ReaderError;
use tapgate_store::StoreError;

/// Result type alias for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that can occur while running the device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Device configuration could not be read or parsed.
    #[error("Config error: {detail}")]
    Config { detail: String },

    /// A reader-chip command failed.
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// An allow-list operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The web frontend failed to dispatch a request or rebuild its
    /// listener.
    #[error("Frontend error: {detail}")]
    Frontend { detail: String },

    /// The provisioning collaborator failed.
    #[error("Provisioning error: {detail}")]
    Provision { detail: String },

    /// The chat transport failed.
    #[error("Chat error: {detail}")]
    Bot { detail: String },
}

impl DeviceError {
    /// Create a new configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Create a new frontend error.
    pub fn frontend(detail: impl Into<String>) -> Self {
        Self::Frontend {
            detail: detail.into(),
        }
    }

    /// Create a new provisioning error.
    pub fn provision(detail: impl Into<String>) -> Self {
        Self::Provision {
            detail: detail.into(),
        }
    }

    /// Create a new chat error.
    pub fn bot(detail: impl Into<String>) -> Self {
        Self::Bot {
            detail: detail.into(),
        }
    }
}
