use super::{ChunkError, HeapChunk, parent, sibling};
use crate::{
    Sha256, Sha256Digest,
    path::SiblingPath,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// CHUNK PROOF
// ================================================================================================

/// A sibling-hash path from one key-value entry up to the root of a chunk's Merkle heap.
///
/// Validation does not return a yes/no answer: [`ChunkProof::compute_root`] folds the path
/// over the claimed entry, and the caller compares the result against the chunk root hash
/// it trusts. A mismatch means the proof, the key or the value is wrong.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ChunkProof {
    path: SiblingPath,
}

impl ChunkProof {
    pub(crate) fn new(path: SiblingPath) -> Self {
        Self { path }
    }

    /// Returns the underlying sibling path.
    pub fn path(&self) -> &SiblingPath {
        &self.path
    }

    /// Returns the number of path entries in the proof.
    pub fn len(&self) -> usize {
        self.path.len()
    }

    /// Returns true if the proof contains no path entries.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Folds the proof over the claimed key-value pair and returns the resulting heap root
    /// hash.
    pub fn compute_root(&self, key: &[u8], value: &[u8]) -> Sha256Digest {
        self.path.compute_root(Sha256::hash_entry(key, value))
    }
}

impl HeapChunk {
    /// Returns a proof for the entry stored under the given key.
    ///
    /// # Errors
    /// Returns an error if the key is not present in the chunk.
    pub fn prove(&self, key: &[u8]) -> Result<ChunkProof, ChunkError> {
        let index = self.index_of(key).ok_or(ChunkError::KeyNotFound)?;

        let mut path = SiblingPath::default();
        let mut current = self.heap_offset() + index;
        loop {
            let Some((sibling_index, on_left)) = sibling(current) else {
                break;
            };
            path.push(self.hashes[sibling_index], on_left);
            let up = parent(sibling_index, self.root);
            if up <= self.root {
                break;
            }
            current = up;
        }

        Ok(ChunkProof::new(path))
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for ChunkProof {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.path.write_into(target);
    }
}

impl Deserializable for ChunkProof {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        SiblingPath::read_from(source).map(Self::new)
    }
}
