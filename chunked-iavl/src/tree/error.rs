use thiserror::Error;

use crate::chunk::ChunkError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("key not found in the tree")]
    KeyNotFound,
    #[error("no chunk at position {0}")]
    ChunkNotFound(usize),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("leaf stream is not a valid tree encoding: {0}")]
    InvalidLeafStream(&'static str),
}
