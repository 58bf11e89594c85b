use alloc::{boxed::Box, vec::Vec};

use crate::{
    Sha256, Sha256Digest,
    chunk::HeapChunk,
    utils::{
        ByteReader, ByteWriter, DeserializationError, Serializable, read_framed_uint,
        write_framed_uint,
    },
};

// LEAF ID
// ================================================================================================

/// Index of a leaf in the tree's leaf arena.
///
/// During normal operation handles coincide with the monotonically assigned wire ids; a
/// tree rebuilt from a leaf stream assigns handles in stream order while keeping the wire
/// ids the leaves were stored with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct LeafId(u32);

impl LeafId {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }

    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

// LEAF
// ================================================================================================

/// A leaf of the tree: a [HeapChunk] plus the metadata that ties it into the tree.
///
/// `key_height` is the AVL height at which the leaf currently hangs; it is mixed into the
/// leaf hash so that rotations which move the leaf invalidate it. Leaves form a singly
/// linked list in key order through `next`.
#[derive(Clone, Debug)]
pub struct Leaf {
    chunk: HeapChunk,
    id: u32,
    key_height: u8,
    next: Option<LeafId>,
    hash: Option<Sha256Digest>,
}

impl Leaf {
    pub(crate) fn new(chunk: HeapChunk, id: u32, key_height: u8) -> Self {
        Self { chunk, id, key_height, next: None, hash: None }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the chunk stored in this leaf.
    pub fn chunk(&self) -> &HeapChunk {
        &self.chunk
    }

    /// Returns the leaf's identifier, assigned monotonically at leaf creation.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the AVL height at which this leaf currently hangs.
    pub fn key_height(&self) -> u8 {
        self.key_height
    }

    /// Returns the number of key-value entries in the leaf's chunk.
    pub fn num_entries(&self) -> usize {
        self.chunk.len()
    }

    /// Returns the smallest key stored in the leaf.
    pub fn smallest_key(&self) -> &[u8] {
        self.chunk.smallest_key()
    }

    /// Returns a copy of the leaf's hash, or `None` if it has not been computed since the
    /// last mutation.
    pub fn hash(&self) -> Option<Sha256Digest> {
        self.hash
    }

    // CRATE-INTERNAL STATE
    // --------------------------------------------------------------------------------------------

    pub(crate) fn chunk_mut(&mut self) -> &mut HeapChunk {
        &mut self.chunk
    }

    pub(crate) fn next(&self) -> Option<LeafId> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<LeafId>) {
        self.next = next;
    }

    pub(crate) fn set_key_height(&mut self, key_height: u8) {
        self.key_height = key_height;
    }

    pub(crate) fn invalidate_hash(&mut self) {
        self.hash = None;
    }

    /// Returns the cached hash, computing it first if it is stale.
    pub(crate) fn compute_hash(&mut self) -> Sha256Digest {
        match self.hash {
            Some(hash) => hash,
            None => self.rehash(),
        }
    }

    /// Recomputes the leaf hash from the chunk root and key height unconditionally.
    pub(crate) fn rehash(&mut self) -> Sha256Digest {
        let hash = Sha256::hash_leaf(self.key_height, self.chunk.root_hash());
        self.hash = Some(hash);
        hash
    }
}

// LEAF SERIALIZATION
// ================================================================================================

impl Serializable for Leaf {
    /// Emits the leaf id, the key height and the chunk body.
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        write_framed_uint(target, self.id as u64);
        target.write_u8(self.key_height);
        self.chunk.write_into(target);
    }
}

impl Leaf {
    /// Reconstructs a leaf of the given chunk capacity from its serialized form and
    /// recomputes its hash.
    ///
    /// # Errors
    /// Returns an error if the buffer is truncated or the chunk body is malformed.
    pub fn read_from<R: ByteReader>(
        source: &mut R,
        max_entries: usize,
    ) -> Result<Self, DeserializationError> {
        let id = read_framed_uint(source)?;
        let id = u32::try_from(id).map_err(|_| {
            DeserializationError::InvalidValue(format!("leaf id {id} exceeds 32 bits"))
        })?;
        let key_height = source.read_u8()?;
        let chunk = HeapChunk::read_from(source, max_entries)?;

        let mut leaf = Leaf::new(chunk, id, key_height);
        leaf.rehash();
        Ok(leaf)
    }
}

// TREE NODE
// ================================================================================================

/// An inner tree node: a split key separating two owned subtrees.
///
/// `leaf` points back at the leaf whose promotion created this node; the node mirrors its
/// height into that leaf's `key_height` whenever the height changes.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) key: Vec<u8>,
    pub(crate) left: Node,
    pub(crate) right: Node,
    pub(crate) hash: Option<Sha256Digest>,
    pub(crate) height: u8,
    pub(crate) size: usize,
    pub(crate) leaf: LeafId,
}

impl Inner {
    /// Returns a node with stale height, size and hash; callers follow up with
    /// [`Inner::update_height_and_size`] unless they restore the previous values.
    pub(crate) fn new(key: Vec<u8>, left: Node, right: Node, leaf: LeafId) -> Self {
        Self { key, left, right, hash: None, height: 0, size: 0, leaf }
    }

    pub(crate) fn balance_factor(&self) -> i32 {
        self.left.height() as i32 - self.right.height() as i32
    }

    /// Recomputes this node's height and size from its children, mirrors the new height
    /// into the back-referenced leaf and invalidates the hashes on the path from this node
    /// down to that leaf.
    pub(crate) fn update_height_and_size(&mut self, leaves: &mut [Leaf]) {
        self.height = core::cmp::max(self.left.height(), self.right.height()) + 1;
        self.size = self.left.size(leaves) + self.right.size(leaves);

        let target = self.leaf.index();
        leaves[target].set_key_height(self.height);
        let smallest = leaves[target].smallest_key().to_vec();
        if smallest.as_slice() < self.key.as_slice() {
            self.left.invalidate_down_to(&smallest, leaves);
        } else {
            self.right.invalidate_down_to(&smallest, leaves);
        }
        self.hash = None;
    }
}

/// A tree node: either a handle into the leaf arena or an owned inner node.
#[derive(Debug)]
pub(crate) enum Node {
    Leaf(LeafId),
    Inner(Box<Inner>),
}

impl Node {
    pub(crate) fn height(&self) -> u8 {
        match self {
            Node::Leaf(_) => 0,
            Node::Inner(inner) => inner.height,
        }
    }

    pub(crate) fn size(&self, leaves: &[Leaf]) -> usize {
        match self {
            Node::Leaf(id) => leaves[id.index()].num_entries(),
            Node::Inner(inner) => inner.size,
        }
    }

    pub(crate) fn cached_hash(&self, leaves: &[Leaf]) -> Option<Sha256Digest> {
        match self {
            Node::Leaf(id) => leaves[id.index()].hash(),
            Node::Inner(inner) => inner.hash,
        }
    }

    /// Returns the value stored under the given key in this subtree, if present.
    pub(crate) fn get<'a>(&'a self, key: &[u8], leaves: &'a [Leaf]) -> Option<&'a [u8]> {
        match self {
            Node::Leaf(id) => leaves[id.index()].chunk().get(key),
            Node::Inner(inner) => {
                if key < inner.key.as_slice() {
                    inner.left.get(key, leaves)
                } else {
                    inner.right.get(key, leaves)
                }
            },
        }
    }

    /// Returns the cached hash, recomputing only subtrees whose hash is stale.
    pub(crate) fn recursive_hash(&mut self, leaves: &mut [Leaf]) -> Sha256Digest {
        match self {
            Node::Leaf(id) => leaves[id.index()].compute_hash(),
            Node::Inner(inner) => {
                if let Some(hash) = inner.hash {
                    return hash;
                }
                let left = inner.left.recursive_hash(leaves);
                let right = inner.right.recursive_hash(leaves);
                let hash = Sha256::merge(&[left, right]);
                inner.hash = Some(hash);
                hash
            },
        }
    }

    /// Recomputes every hash in this subtree, ignoring cached values.
    pub(crate) fn complete_rehash(&mut self, leaves: &mut [Leaf]) -> Sha256Digest {
        match self {
            Node::Leaf(id) => leaves[id.index()].rehash(),
            Node::Inner(inner) => {
                let left = inner.left.complete_rehash(leaves);
                let right = inner.right.complete_rehash(leaves);
                let hash = Sha256::merge(&[left, right]);
                inner.hash = Some(hash);
                hash
            },
        }
    }

    /// Invalidates the hashes on the path from this node down to the leaf holding the
    /// given smallest key.
    pub(crate) fn invalidate_down_to(&mut self, key: &[u8], leaves: &mut [Leaf]) {
        match self {
            Node::Leaf(id) => leaves[id.index()].invalidate_hash(),
            Node::Inner(inner) => {
                if key < inner.key.as_slice() {
                    inner.left.invalidate_down_to(key, leaves);
                } else {
                    inner.right.invalidate_down_to(key, leaves);
                }
                inner.hash = None;
            },
        }
    }

    /// Returns true if every inner node in this subtree has child heights within one of
    /// each other.
    pub(crate) fn is_balanced(&self) -> bool {
        match self {
            Node::Leaf(_) => true,
            Node::Inner(inner) => {
                let diff = inner.left.height().abs_diff(inner.right.height());
                diff <= 1 && inner.left.is_balanced() && inner.right.is_balanced()
            },
        }
    }
}
