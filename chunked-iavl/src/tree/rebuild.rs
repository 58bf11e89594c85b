//! Reconstruction of a tree from its leaves streamed in key order.

use alloc::{boxed::Box, vec::Vec};

use super::{
    Iavl, TreeConfig, TreeError,
    chunk_list::ChunkList,
    node::{Inner, Leaf, LeafId, Node},
};

// LEAF STREAM HELPERS
// ================================================================================================

/// Sorts a set of leaves into the key order expected by [`Iavl::from_leaves`].
pub fn sort_leaves_by_smallest_key(leaves: &mut [Leaf]) {
    leaves.sort_by(|a, b| a.smallest_key().cmp(b.smallest_key()));
}

// TREE RECONSTRUCTION
// ================================================================================================

/// A partially assembled subtree, indexed by height in the `active` array while the leaf
/// stream is consumed.
enum Pending {
    Leaf(LeafId),
    Inner(PendingInner),
}

struct PendingInner {
    key: Vec<u8>,
    height: u8,
    size: usize,
    leaf: LeafId,
    left: Option<Box<Pending>>,
    right: Option<Box<Pending>>,
}

impl Iavl {
    /// Reconstructs a tree from its leaves in ascending key order, as produced by walking
    /// the leaf chain of the original tree (or by deserializing its leaves and sorting
    /// them with [`sort_leaves_by_smallest_key`]).
    ///
    /// Each leaf's stored `key_height` pins the height of the inner node fabricated above
    /// it; attaching the pending lower subtrees as the stream advances recovers the exact
    /// shape the original AVL insertions produced, and with it the original root hash. The
    /// whole tree is rehashed before it is returned.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the stream is not a valid
    /// encoding of a tree: leaves out of key order, a chunk shape differing from the
    /// configuration, or key heights that do not assemble into one connected shape.
    pub fn from_leaves(config: TreeConfig, mut leaves: Vec<Leaf>) -> Result<Self, TreeError> {
        let chunk_config = config.chunk_config()?;
        let count = leaves.len();
        if count == 0 {
            return Ok(Iavl {
                root: None,
                leaves,
                first_leaf: None,
                chunk_list: ChunkList::new(),
                chunk_config,
            });
        }

        // relink the leaf chain, reset cached hashes and fill the pre-sized directory in
        // stream order
        let mut chunk_list = ChunkList::with_capacity(count);
        for (position, leaf) in leaves.iter_mut().enumerate() {
            if leaf.chunk().config() != &chunk_config {
                return Err(TreeError::InvalidLeafStream("chunk shape differs from the tree configuration"));
            }
            if leaf.chunk().is_empty() {
                return Err(TreeError::InvalidLeafStream("leaf with an empty chunk"));
            }
            let next =
                if position + 1 < count { Some(LeafId::new(position as u32 + 1)) } else { None };
            leaf.set_next(next);
            leaf.invalidate_hash();
            chunk_list.push(LeafId::new(position as u32));
        }
        for position in 1..count {
            if leaves[position - 1].smallest_key() >= leaves[position].smallest_key() {
                return Err(TreeError::InvalidLeafStream("leaves are not in ascending key order"));
            }
        }

        let mut active: Vec<Option<Pending>> = (0..count).map(|_| None).collect();
        let mut max_height = 0u8;

        for position in 0..count {
            let id = LeafId::new(position as u32);
            let height = leaves[position].key_height();
            if height as usize >= count {
                return Err(TreeError::InvalidLeafStream("key height exceeds the leaf count"));
            }

            if height == 0 {
                // only the leftmost leaf hangs at height zero: every other leaf was
                // created by a split and promoted under an inner node
                if position != 0 {
                    return Err(TreeError::InvalidLeafStream("non-first leaf at height zero"));
                }
                active[0] = Some(Pending::Leaf(id));
            } else {
                if position == 0 {
                    return Err(TreeError::InvalidLeafStream("first leaf not at height zero"));
                }
                let slot = height as usize;
                if active[slot].is_some() {
                    return Err(TreeError::InvalidLeafStream("colliding subtrees at equal height"));
                }
                active[slot] = Some(Pending::Inner(PendingInner {
                    key: leaves[position].smallest_key().to_vec(),
                    height,
                    size: 0,
                    leaf: id,
                    left: None,
                    right: None,
                }));
                attach_below(&mut active, height, &leaves)?;
                // the leaf itself re-enters at the floor and is attached later
                active[0] = Some(Pending::Leaf(id));
            }

            if max_height <= height {
                max_height = height;
            }
        }

        // the stream is over; chain the remaining partial subtrees into the root
        let mut lower = 0usize;
        let mut upper = 1usize;
        while upper <= max_height as usize {
            while upper <= max_height as usize && active[upper].is_none() {
                upper += 1;
            }
            if upper > max_height as usize {
                return Err(TreeError::InvalidLeafStream("disconnected pending subtrees"));
            }
            let child = active[lower]
                .take()
                .ok_or(TreeError::InvalidLeafStream("missing pending subtree"))?;
            let child_size = pending_size(&child, &leaves);
            let Some(Pending::Inner(target)) = active[upper].as_mut() else {
                return Err(TreeError::InvalidLeafStream("pending parent is not an inner node"));
            };
            if target.right.is_some() {
                return Err(TreeError::InvalidLeafStream("pending parent already has a right subtree"));
            }
            target.right = Some(Box::new(child));
            target.size += child_size;
            lower = upper;
            upper += 1;
        }

        let root = active[max_height as usize]
            .take()
            .ok_or(TreeError::InvalidLeafStream("missing root subtree"))?;
        let root = finalize(root)?;

        let mut tree = Iavl {
            root: Some(root),
            leaves,
            first_leaf: Some(LeafId::new(0)),
            chunk_list,
            chunk_config,
        };
        tree.complete_rehash();
        Ok(tree)
    }
}

/// Attaches every pending subtree below `height` to the next pending node above it,
/// filling left children before right ones and accumulating sizes.
fn attach_below(
    active: &mut [Option<Pending>],
    height: u8,
    leaves: &[Leaf],
) -> Result<(), TreeError> {
    let top = height as usize;
    let mut upper = 1usize;
    for lower in 0..top {
        let Some(child) = active[lower].take() else {
            continue;
        };
        if upper <= lower {
            upper = lower + 1;
        }
        while upper <= top && active[upper].is_none() {
            upper += 1;
        }
        if upper > top {
            return Err(TreeError::InvalidLeafStream("no parent subtree for a pending node"));
        }

        let child_size = pending_size(&child, leaves);
        let Some(Pending::Inner(target)) = active[upper].as_mut() else {
            return Err(TreeError::InvalidLeafStream("pending parent is not an inner node"));
        };
        if target.left.is_none() {
            target.left = Some(Box::new(child));
        } else if target.right.is_none() {
            target.right = Some(Box::new(child));
        } else {
            return Err(TreeError::InvalidLeafStream("pending parent already has two subtrees"));
        }
        target.size += child_size;
        upper += 1;
    }
    Ok(())
}

fn pending_size(pending: &Pending, leaves: &[Leaf]) -> usize {
    match pending {
        Pending::Leaf(id) => leaves[id.index()].num_entries(),
        Pending::Inner(inner) => inner.size,
    }
}

/// Converts an assembled pending subtree into owned tree nodes, rejecting shapes with
/// missing children.
fn finalize(pending: Pending) -> Result<Node, TreeError> {
    match pending {
        Pending::Leaf(id) => Ok(Node::Leaf(id)),
        Pending::Inner(inner) => {
            let PendingInner { key, height, size, leaf, left, right } = inner;
            let left =
                left.ok_or(TreeError::InvalidLeafStream("subtree missing its left child"))?;
            let right =
                right.ok_or(TreeError::InvalidLeafStream("subtree missing its right child"))?;
            Ok(Node::Inner(Box::new(Inner {
                key,
                left: finalize(*left)?,
                right: finalize(*right)?,
                hash: None,
                height,
                size,
                leaf,
            })))
        },
    }
}
