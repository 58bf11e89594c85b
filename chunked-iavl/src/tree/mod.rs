//! The chunked AVL tree: a balanced Merkle tree whose leaves are [HeapChunk]s.

mod chunk_list;
mod error;
mod node;
mod proof;
mod rebuild;


use alloc::{boxed::Box, vec::Vec};

pub use error::TreeError;
pub use node::Leaf;
pub use proof::{ElementProof, LeafProof};
pub use rebuild::sort_leaves_by_smallest_key;

use chunk_list::ChunkList;
use node::{Inner, LeafId, Node};

use crate::{
    Sha256Digest,
    chunk::{ChunkConfig, ChunkError, DEFAULT_MAX_BYTE_CAPACITY, DEFAULT_MAX_VALUE_SIZE, HeapChunk},
    path::SiblingPath,
    utils::{ByteWriter, Serializable},
};

// TREE CONFIG
// ================================================================================================

/// Construction parameters of an [Iavl] tree.
///
/// The two byte-capacity ceilings determine the width of the offset and length fields
/// packed next to every key inside a chunk; they default to the 16 MiB / 64 KiB limits of
/// the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    chunk_capacity: usize,
    key_size: usize,
    max_byte_capacity: usize,
    max_value_size: usize,
}

impl TreeConfig {
    /// Returns a configuration for trees with `chunk_capacity` entries per leaf and
    /// `key_size`-byte keys, using the default capacity ceilings.
    pub fn new(chunk_capacity: usize, key_size: usize) -> Self {
        Self {
            chunk_capacity,
            key_size,
            max_byte_capacity: DEFAULT_MAX_BYTE_CAPACITY,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }

    /// Overrides the capacity ceilings.
    pub fn with_limits(mut self, max_byte_capacity: usize, max_value_size: usize) -> Self {
        self.max_byte_capacity = max_byte_capacity;
        self.max_value_size = max_value_size;
        self
    }

    /// Returns the number of entries each leaf chunk can hold.
    pub fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    /// Returns the fixed key width in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub(crate) fn chunk_config(&self) -> Result<ChunkConfig, ChunkError> {
        ChunkConfig::new(
            self.chunk_capacity,
            self.key_size,
            self.max_byte_capacity,
            self.max_value_size,
        )
    }
}

// IAVL TREE
// ================================================================================================

/// An authenticated, ordered key-value index.
///
/// The tree keeps key-value pairs in bounded sorted chunks at its leaves and an AVL
/// discipline over the inner nodes, so that the whole store is authenticated by a single
/// root hash. Leaves live in an arena owned by the tree; inner nodes reference them by
/// handle, as do the in-key-order leaf chain and the chunk directory.
///
/// Writes are single-threaded: one `insert` runs to completion before the next, and the
/// state after a batch of inserts depends only on the sequence of key-value pairs.
#[derive(Debug)]
pub struct Iavl {
    root: Option<Node>,
    leaves: Vec<Leaf>,
    first_leaf: Option<LeafId>,
    chunk_list: ChunkList,
    chunk_config: ChunkConfig,
}

impl Iavl {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a new empty tree.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid; see [`ChunkConfig::new`].
    pub fn new(config: TreeConfig) -> Result<Self, TreeError> {
        let chunk_config = config.chunk_config()?;
        Ok(Self {
            root: None,
            leaves: Vec::new(),
            first_leaf: None,
            chunk_list: ChunkList::new(),
            chunk_config,
        })
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the number of key-value pairs in the tree.
    pub fn size(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.size(&self.leaves))
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of leaf chunks in the tree.
    pub fn num_chunks(&self) -> usize {
        self.chunk_list.len()
    }

    /// Returns a copy of the root hash, or `None` for an empty tree.
    pub fn root_hash(&self) -> Option<Sha256Digest> {
        self.root.as_ref().and_then(|root| root.cached_hash(&self.leaves))
    }

    /// Returns the value stored under the given key, if present.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.root.as_ref()?.get(key, &self.leaves)
    }

    /// Returns the leaf at the given chunk position, counted in key order.
    pub fn chunk(&self, position: usize) -> Option<&Leaf> {
        self.chunk_list.get(position).map(|id| &self.leaves[id.index()])
    }

    /// Returns the leftmost leaf, if any.
    pub fn first_leaf(&self) -> Option<&Leaf> {
        self.first_leaf.map(|id| &self.leaves[id.index()])
    }

    /// Returns an iterator over the leaves in key order, following the leaf chain.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { leaves: &self.leaves, current: self.first_leaf }
    }

    /// Returns an iterator over the leaves in chunk-position order, as the chunk
    /// directory lists them.
    pub fn chunks(&self) -> impl Iterator<Item = &Leaf> {
        self.chunk_list.iter().map(|id| &self.leaves[id.index()])
    }

    /// Returns true if every inner node's child heights are within one of each other.
    pub fn is_balanced(&self) -> bool {
        self.root.as_ref().is_none_or(Node::is_balanced)
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Inserts a key-value pair, or replaces the value if the key is already present.
    ///
    /// Returns `true` when an existing value was updated and `false` when a new key was
    /// added. Keys must have the configured width. After the structural change settles,
    /// all hashes on dirty paths are recomputed, so [`Iavl::root_hash`] reflects the new
    /// state when this returns.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        debug_assert_eq!(key.len(), self.chunk_config.key_size(), "key width mismatch");

        let updated = match self.root.take() {
            None => {
                let mut chunk = HeapChunk::new(self.chunk_config);
                chunk.insert(key, value);
                let id = self.alloc_leaf(chunk, 0);
                self.first_leaf = Some(id);
                self.chunk_list.insert(id, &self.leaves);
                self.root = Some(Node::Leaf(id));
                false
            },
            Some(root) => {
                let (root, updated) = self.insert_recursive(root, key, value);
                self.root = Some(root);
                updated
            },
        };

        if let Some(root) = self.root.as_mut() {
            root.recursive_hash(&mut self.leaves);
        }
        updated
    }

    /// Recomputes every hash in the tree, ignoring cached values.
    pub fn complete_rehash(&mut self) {
        if let Some(root) = self.root.as_mut() {
            root.complete_rehash(&mut self.leaves);
        }
    }

    // PROOFS
    // --------------------------------------------------------------------------------------------

    /// Returns a proof for the key-value pair stored under the given key.
    ///
    /// Folding the proof over the pair via [`ElementProof::compute_root`] yields this
    /// tree's root hash; any other key or value yields a different hash.
    ///
    /// # Errors
    /// Returns an error if the key is not present in the tree.
    pub fn element_proof(&self, key: &[u8]) -> Result<ElementProof, TreeError> {
        let (leaf_proof, leaf_id) = self.leaf_proof(key)?;
        let leaf = &self.leaves[leaf_id.index()];
        let chunk_proof = leaf.chunk().prove(key).map_err(|_| TreeError::KeyNotFound)?;
        Ok(ElementProof::new(leaf_proof, chunk_proof, leaf.key_height()))
    }

    /// Returns a proof for the whole chunk at the given position, along with the leaf
    /// holding it; the caller folds the proof over the leaf's hash.
    ///
    /// # Errors
    /// Returns an error if there is no chunk at the given position.
    pub fn chunk_proof(&self, position: usize) -> Result<(LeafProof, &Leaf), TreeError> {
        let id = self.chunk_list.get(position).ok_or(TreeError::ChunkNotFound(position))?;
        let key = self.leaves[id.index()].smallest_key();
        let (proof, leaf_id) = self.leaf_proof(key)?;
        Ok((proof, &self.leaves[leaf_id.index()]))
    }

    /// Descends to the leaf owning the given key, collecting the sibling hash on the far
    /// side of every inner node passed; the path is returned in leaf-to-root order.
    fn leaf_proof(&self, key: &[u8]) -> Result<(LeafProof, LeafId), TreeError> {
        let mut node = self.root.as_ref().ok_or(TreeError::KeyNotFound)?;
        let mut path = SiblingPath::default();
        loop {
            match node {
                Node::Leaf(id) => {
                    path.reverse();
                    return Ok((LeafProof::new(path), *id));
                },
                Node::Inner(inner) => {
                    if key < inner.key.as_slice() {
                        path.push(inner.right.cached_hash(&self.leaves), false);
                        node = &inner.left;
                    } else {
                        path.push(inner.left.cached_hash(&self.leaves), true);
                        node = &inner.right;
                    }
                },
            }
        }
    }

    // LEAF SERIALIZATION
    // --------------------------------------------------------------------------------------------

    /// Serializes the leaf at the given chunk position into the target writer, in the
    /// leaf wire format (id, key height, chunk body).
    ///
    /// # Errors
    /// Returns an error if there is no chunk at the given position.
    pub fn write_leaf_into<W: ByteWriter>(
        &self,
        position: usize,
        target: &mut W,
    ) -> Result<(), TreeError> {
        let leaf = self.chunk(position).ok_or(TreeError::ChunkNotFound(position))?;
        leaf.write_into(target);
        Ok(())
    }

    // INSERTION INTERNALS
    // --------------------------------------------------------------------------------------------

    fn alloc_leaf(&mut self, chunk: HeapChunk, key_height: u8) -> LeafId {
        let id = LeafId::new(self.leaves.len() as u32);
        self.leaves.push(Leaf::new(chunk, id.value(), key_height));
        id
    }

    /// Descends to the owning leaf and inserts there; a split bubbles a freshly created
    /// inner node back up, and every node on the way recomputes its height and size and
    /// rebalances. Returns the (possibly replaced) subtree root and whether an existing
    /// value was updated.
    fn insert_recursive(&mut self, node: Node, key: &[u8], value: &[u8]) -> (Node, bool) {
        match node {
            Node::Leaf(id) => {
                if let Some(slot) = self.leaves[id.index()].chunk().index_of(key) {
                    let leaf = &mut self.leaves[id.index()];
                    leaf.chunk_mut().update_value(slot, value);
                    leaf.invalidate_hash();
                    return (Node::Leaf(id), true);
                }

                if !self.leaves[id.index()].chunk().is_full() {
                    let leaf = &mut self.leaves[id.index()];
                    leaf.chunk_mut().insert(key, value);
                    leaf.invalidate_hash();
                    (Node::Leaf(id), false)
                } else {
                    // the chunk splits; this leaf keeps the lower half, a new leaf takes
                    // the upper half and is promoted into a new inner node
                    let right_chunk = self.leaves[id.index()].chunk_mut().insert_split(key, value);
                    let split_key = right_chunk.smallest_key().to_vec();
                    let left_count = self.leaves[id.index()].num_entries();
                    let right_count = right_chunk.len();

                    let right_id = self.alloc_leaf(right_chunk, 1);
                    let old_next = self.leaves[id.index()].next();
                    self.leaves[right_id.index()].set_next(old_next);
                    self.leaves[id.index()].set_next(Some(right_id));
                    self.leaves[id.index()].invalidate_hash();
                    self.chunk_list.insert(right_id, &self.leaves);

                    let mut inner =
                        Inner::new(split_key, Node::Leaf(id), Node::Leaf(right_id), right_id);
                    inner.height = 1;
                    inner.size = left_count + right_count;
                    (Node::Inner(Box::new(inner)), false)
                }
            },
            Node::Inner(inner) => {
                let Inner { key: split_key, left, right, height, size, leaf, .. } = *inner;

                let (left, right, updated) = if key < split_key.as_slice() {
                    let (left, updated) = self.insert_recursive(left, key, value);
                    (left, right, updated)
                } else {
                    let (right, updated) = self.insert_recursive(right, key, value);
                    (left, right, updated)
                };

                let mut node =
                    Box::new(Inner { key: split_key, left, right, hash: None, height, size, leaf });
                if updated {
                    // the shape did not change; the stale hash is enough
                    return (Node::Inner(node), true);
                }
                node.update_height_and_size(&mut self.leaves);
                let node = Self::balance_node(node, &mut self.leaves);
                (Node::Inner(node), false)
            },
        }
    }

    // REBALANCING
    // --------------------------------------------------------------------------------------------

    /// Applies the four standard AVL cases to a node whose children changed.
    fn balance_node(node: Box<Inner>, leaves: &mut [Leaf]) -> Box<Inner> {
        let balance = node.balance_factor();
        if balance > 1 {
            let left_factor = match &node.left {
                Node::Inner(left) => left.balance_factor(),
                Node::Leaf(_) => 0,
            };
            if left_factor >= 0 {
                // left-left
                Self::rotate_right(node, leaves)
            } else {
                // left-right
                let Inner { key, left, right, height, size, leaf, .. } = *node;
                let Node::Inner(left) = left else {
                    unreachable!("left subtree of a left-heavy node is an inner node")
                };
                let left = Node::Inner(Self::rotate_left(left, leaves));
                let node = Box::new(Inner { key, left, right, hash: None, height, size, leaf });
                Self::rotate_right(node, leaves)
            }
        } else if balance < -1 {
            let right_factor = match &node.right {
                Node::Inner(right) => right.balance_factor(),
                Node::Leaf(_) => 0,
            };
            if right_factor <= 0 {
                // right-right
                Self::rotate_left(node, leaves)
            } else {
                // right-left
                let Inner { key, left, right, height, size, leaf, .. } = *node;
                let Node::Inner(right) = right else {
                    unreachable!("right subtree of a right-heavy node is an inner node")
                };
                let right = Node::Inner(Self::rotate_right(right, leaves));
                let node = Box::new(Inner { key, left, right, hash: None, height, size, leaf });
                Self::rotate_left(node, leaves)
            }
        } else {
            node
        }
    }

    /// Rotates the subtree right: the left child becomes the new subtree root and the old
    /// root descends to its right. Both nodes recompute their heights and sizes, pushing
    /// the new heights into their back-referenced leaves.
    fn rotate_right(node: Box<Inner>, leaves: &mut [Leaf]) -> Box<Inner> {
        let Inner { key, left, right, leaf, .. } = *node;
        let Node::Inner(pivot) = left else {
            unreachable!("rotation pivot is an inner node")
        };
        let Inner { key: pivot_key, left: pivot_left, right: pivot_right, leaf: pivot_leaf, .. } =
            *pivot;

        let mut lowered = Box::new(Inner::new(key, pivot_right, right, leaf));
        lowered.update_height_and_size(leaves);
        let mut raised = Box::new(Inner::new(pivot_key, pivot_left, Node::Inner(lowered), pivot_leaf));
        raised.update_height_and_size(leaves);
        raised
    }

    /// Rotates the subtree left; the mirror image of [`Iavl::rotate_right`].
    fn rotate_left(node: Box<Inner>, leaves: &mut [Leaf]) -> Box<Inner> {
        let Inner { key, left, right, leaf, .. } = *node;
        let Node::Inner(pivot) = right else {
            unreachable!("rotation pivot is an inner node")
        };
        let Inner { key: pivot_key, left: pivot_left, right: pivot_right, leaf: pivot_leaf, .. } =
            *pivot;

        let mut lowered = Box::new(Inner::new(key, left, pivot_left, leaf));
        lowered.update_height_and_size(leaves);
        let mut raised = Box::new(Inner::new(pivot_key, Node::Inner(lowered), pivot_right, pivot_leaf));
        raised.update_height_and_size(leaves);
        raised
    }
}

// LEAF ITERATOR
// ================================================================================================

/// An iterator over a tree's leaves in key order. See [`Iavl::leaves`].
pub struct Leaves<'a> {
    leaves: &'a [Leaf],
    current: Option<LeafId>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Leaf;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        let leaf = &self.leaves[id.index()];
        self.current = leaf.next();
        Some(leaf)
    }
}
