//! An authenticated, ordered key-value index.
//!
//! The index is an AVL tree whose leaves are not single keys but bounded chunks of many
//! key-value pairs, each chunk carrying its own Merkle heap over its entries. One SHA-256
//! root hash authenticates every key-value pair and every whole chunk in the store:
//!
//! - [`HeapChunk`] is a fixed-capacity, sorted, byte-packed key-value container backed by an
//!   implicit binary Merkle heap of `2 * capacity - 1` hashes.
//! - [`Iavl`] owns the tree of chunks: inserts descend by split keys, full leaves split in
//!   two, and AVL rotations keep the shape balanced while dirty hashes are recomputed
//!   incrementally.
//! - [`ElementProof`], [`LeafProof`] and [`ChunkProof`] are sibling-hash paths which fold a
//!   key-value pair (or a whole leaf) back up to the root hash.
//!
//! Leaves serialize to a deterministic wire format and a tree can be reconstructed from its
//! leaves streamed in key order, recovering the original root hash.

#![no_std]

#[macro_use]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod chunk;
pub mod hash;
pub mod tree;
pub mod utils;

mod path;

// RE-EXPORTS
// ================================================================================================

pub use chunk::{ChunkConfig, ChunkError, ChunkProof, HeapChunk};
pub use hash::{Sha256, Sha256Digest};
pub use path::SiblingPath;
pub use tree::{ElementProof, Iavl, Leaf, LeafProof, TreeConfig, TreeError};
