//! Storage error types.

use thiserror::Error;

/// Errors from storage backends.
///
/// The in-memory store never fails; durable backends map their transport
/// and encoding failures here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying I/O or transaction failure.
    ///
    /// May be transient (timeouts) or fatal (corruption); the message
    /// carries the backend's detail. Read paths may retry a bounded number
    /// of times; write paths must re-read state instead of retrying
    /// blindly.
    #[error("I/O error: {0}")]
    Io(String),

    /// Record failed to encode or decode.
    ///
    /// Indicates a bug or on-disk corruption; never transient.
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        assert_eq!(StoreError::Io("timeout".to_string()).to_string(), "I/O error: timeout");
        assert_eq!(
            StoreError::Serialization("bad tag".to_string()).to_string(),
            "serialization error: bad tag"
        );
    }
}
