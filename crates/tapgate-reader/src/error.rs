//! Error types for reader operations.
//!
//! These errors cover the driver's view of the chip: bus transfers,
//! readiness timeouts, frame scanning and response validation. During
//! card polling the driver treats all of them as recoverable and
//! retries before reporting an empty field.

/// Result type alias for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

/// Errors that can occur while driving the reader chip.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Chip did not raise its ready status within the allotted time.
    #[error("Reader timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// No valid frame surfaced within the chunk scan budget.
    #[error("Framing error: {detail}")]
    Framing { detail: String },

    /// Response code does not acknowledge the issued command.
    #[error("Unexpected response: command {command:#04X} answered with {response:#04X}")]
    UnexpectedResponse { command: u8, response: u8 },

    /// Response too short to carry the expected fields.
    #[error("Short response: expected at least {expected} bytes, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    /// Underlying bus transfer failed.
    #[error("Bus error: {message}")]
    Bus { message: String },

    /// Frame construction or payload validation failed.
    #[error(transparent)]
    Data(#[from] tapgate_core::Error),
}

impl ReaderError {
    /// Create a new timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a new framing error.
    pub fn framing(detail: impl Into<String>) -> Self {
        Self::Framing {
            detail: detail.into(),
        }
    }

    /// Create a new unexpected-response error.
    pub fn unexpected_response(command: u8, response: u8) -> Self {
        Self::UnexpectedResponse { command, response }
    }

    /// Create a new short-response error.
    pub fn short_response(expected: usize, actual: usize) -> Self {
        Self::ShortResponse { expected, actual }
    }

    /// Create a new bus error.
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus {
            message: message.into(),
        }
    }
}
