use gantry_store::StoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<SE: StoreError> {
    /// The underlying durable store call failed; retriable by the caller.
    #[error(transparent)]
    Store(SE),

    /// A persisted record could not be decoded.
    #[error("corrupt record at {key}: {source}")]
    Deserialize {
        /// The key holding the corrupt record.
        key: String,
        /// The decode failure.
        source: serde_json::Error,
    },

    /// A record could not be encoded for persistence.
    #[error("failed to encode record: {0}")]
    Serialize(#[source] serde_json::Error),
}
