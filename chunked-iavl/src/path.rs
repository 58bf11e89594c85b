use alloc::vec::Vec;

use crate::{
    Sha256, Sha256Digest,
    utils::{
        ByteReader, ByteWriter, Deserializable, DeserializationError, Serializable,
        read_framed_bool, read_framed_bytes, read_framed_uint, write_framed_bool,
        write_framed_bytes, write_framed_uint,
    },
};

// SIBLING PATH
// ================================================================================================

/// An ordered sequence of sibling hashes and directions leading from a node up to the root
/// of a Merkle structure.
///
/// The entry at index `0` is the deepest: folding starts from the hash of the proven item
/// and consumes the entries in order. A direction of `true` means the sibling sits on the
/// left of the path. A sibling may be absent when it is an inactive heap slot; an absent
/// sibling contributes nothing to the fold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SiblingPath {
    siblings: Vec<Option<Sha256Digest>>,
    directions: Vec<bool>,
}

impl SiblingPath {
    // PROVIDERS
    // --------------------------------------------------------------------------------------------

    /// Returns the number of entries in the path.
    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    /// Returns true if the path contains no entries.
    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    /// Returns the sibling hashes in deepest-first order.
    pub fn siblings(&self) -> &[Option<Sha256Digest>] {
        &self.siblings
    }

    /// Returns the directions in deepest-first order; `true` means the sibling is on the
    /// left.
    pub fn directions(&self) -> &[bool] {
        &self.directions
    }

    /// Folds the path over the provided starting hash and returns the resulting root hash.
    pub fn compute_root(&self, start: Sha256Digest) -> Sha256Digest {
        self.siblings
            .iter()
            .zip(self.directions.iter())
            .fold(start, |current, (sibling, &on_left)| {
                Sha256::fold_sibling(current, sibling.as_ref(), on_left)
            })
    }

    // MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Appends an entry to the path.
    pub(crate) fn push(&mut self, sibling: Option<Sha256Digest>, sibling_on_left: bool) {
        self.siblings.push(sibling);
        self.directions.push(sibling_on_left);
    }

    /// Reverses the path in place; used when entries were collected root-first.
    pub(crate) fn reverse(&mut self) {
        self.siblings.reverse();
        self.directions.reverse();
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for SiblingPath {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        write_framed_uint(target, self.siblings.len() as u64);
        for sibling in &self.siblings {
            match sibling {
                Some(digest) => write_framed_bytes(target, &digest.as_bytes()),
                None => write_framed_bytes(target, &[]),
            }
        }
        for &direction in &self.directions {
            write_framed_bool(target, direction);
        }
    }
}

impl Deserializable for SiblingPath {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        let count = read_framed_uint(source)? as usize;

        let mut siblings = Vec::with_capacity(count.min(u8::MAX as usize));
        for _ in 0..count {
            let bytes = read_framed_bytes(source)?;
            let sibling = match bytes.len() {
                0 => None,
                32 => {
                    let mut digest = [0u8; 32];
                    digest.copy_from_slice(&bytes);
                    Some(Sha256Digest::from(digest))
                },
                other => {
                    return Err(DeserializationError::InvalidValue(format!(
                        "sibling hash of {other} bytes"
                    )));
                },
            };
            siblings.push(sibling);
        }

        let mut directions = Vec::with_capacity(count.min(u8::MAX as usize));
        for _ in 0..count {
            directions.push(read_framed_bool(source)?);
        }

        Ok(Self { siblings, directions })
    }
}
