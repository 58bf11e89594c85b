use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("key not found in the chunk")]
    KeyNotFound,
    #[error("chunk capacity must be an even number of at least two entries, got {0}")]
    InvalidCapacity(usize),
    #[error("key size must be nonzero")]
    ZeroKeySize,
    #[error(
        "value length field of {size_bytes} bytes exceeds the {index_bytes} byte offset field"
    )]
    ValueBoundExceedsCapacity { size_bytes: usize, index_bytes: usize },
}
