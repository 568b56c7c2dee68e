use thiserror::Error;

/// Error type for logcask.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Looking up a key that is not in the store.
    #[error("Key not found")]
    KeyNotFound,
    /// A record on disk declares a size inconsistent with its bytes.
    /// It indicates a corrupted data file or a program bug.
    #[error("corrupt record: {0}")]
    Corrupt(String),
    /// Key or value too large for the 32-bit record header fields.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Writing to a store after `close`.
    #[error("store is closed")]
    Closed,
}

/// Custom result type for StoreError
pub type Result<T> = std::result::Result<T, StoreError>;
