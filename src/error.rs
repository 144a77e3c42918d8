use thiserror::Error;

/// Errors returned by the crate.
///
/// Every variant is recoverable: the operation that produced it did not
/// mutate the receiver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A vector or matrix disagrees with a fixed shape (topology, first dataset entry, ...).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The dataset is full and replay memory is disabled.
    #[error("capacity exceeded: dataset already holds {max_examples} examples")]
    CapacityExceeded { max_examples: usize },

    /// A registry or name lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A codec record declares more bytes than the buffer holds.
    #[error("truncated buffer: need {needed} bytes at offset {offset}, only {available} available")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;
