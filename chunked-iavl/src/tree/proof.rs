use crate::{
    Sha256, Sha256Digest,
    chunk::ChunkProof,
    path::SiblingPath,
    utils::{ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable},
};

// LEAF PROOF
// ================================================================================================

/// A sibling-hash path from a leaf up to the root of the tree.
///
/// Folding the path over a leaf hash yields the root hash the tree had when the proof was
/// generated; the caller compares it against the root hash it trusts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LeafProof {
    path: SiblingPath,
}

impl LeafProof {
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

    /// Returns true if the proof contains no path entries; this is the case for a tree
    /// whose root is its only leaf.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Folds the proof over the given leaf hash and returns the resulting tree root hash.
    pub fn compute_root(&self, leaf_hash: Sha256Digest) -> Sha256Digest {
        self.path.compute_root(leaf_hash)
    }
}

impl Serializable for LeafProof {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.path.write_into(target);
    }
}

impl Deserializable for LeafProof {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        SiblingPath::read_from(source).map(Self::new)
    }
}

// ELEMENT PROOF
// ================================================================================================

/// A proof for a single key-value pair: the chunk-internal path composed with the path
/// from the owning leaf to the tree root, plus the height the leaf hangs at.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ElementProof {
    leaf_proof: LeafProof,
    chunk_proof: ChunkProof,
    key_height: u8,
}

impl ElementProof {
    pub(crate) fn new(leaf_proof: LeafProof, chunk_proof: ChunkProof, key_height: u8) -> Self {
        Self { leaf_proof, chunk_proof, key_height }
    }

    /// Returns the tree-level part of the proof.
    pub fn leaf_proof(&self) -> &LeafProof {
        &self.leaf_proof
    }

    /// Returns the chunk-level part of the proof.
    pub fn chunk_proof(&self) -> &ChunkProof {
        &self.chunk_proof
    }

    /// Returns the height the proven leaf hangs at.
    pub fn key_height(&self) -> u8 {
        self.key_height
    }

    /// Returns the total number of path entries across both proof layers.
    pub fn len(&self) -> usize {
        self.leaf_proof.len() + self.chunk_proof.len()
    }

    /// Returns true if both proof layers are empty.
    pub fn is_empty(&self) -> bool {
        self.leaf_proof.is_empty() && self.chunk_proof.is_empty()
    }

    /// Folds the proof over the claimed key-value pair and returns the resulting tree root
    /// hash: the chunk path yields the chunk root, the key height turns it into the leaf
    /// hash, and the leaf path carries it up to the root.
    pub fn compute_root(&self, key: &[u8], value: &[u8]) -> Sha256Digest {
        let chunk_root = self.chunk_proof.compute_root(key, value);
        let leaf_hash = Sha256::hash_leaf(self.key_height, Some(&chunk_root));
        self.leaf_proof.compute_root(leaf_hash)
    }
}

impl Serializable for ElementProof {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        self.leaf_proof.write_into(target);
        self.chunk_proof.write_into(target);
        target.write_u8(self.key_height);
    }
}

impl Deserializable for ElementProof {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let leaf_proof = LeafProof::read_from(source)?;
        let chunk_proof = ChunkProof::read_from(source)?;
        let key_height = source.read_u8()?;
        Ok(Self { leaf_proof, chunk_proof, key_height })
    }
}
