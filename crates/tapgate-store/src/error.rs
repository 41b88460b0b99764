//! Error types for allow-list operations.
//!
//! Mutation errors double as operator-facing messages: their `Display`
//! output goes verbatim into command responses and event snapshots.

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while querying or mutating the allow list.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// UID string did not parse as hex.
    #[error(transparent)]
    BadUid(#[from] tapgate_core::Error),

    /// Card is not on the allow list.
    #[error("Not found")]
    NotFound,

    /// Writing the allow list to disk failed.
    #[error("Store persist failed: {0}")]
    Persist(#[from] std::io::Error),

    /// Encoding the allow list as JSON failed.
    #[error("Store encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}
