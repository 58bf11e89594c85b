//! SHA-256 hashing used throughout the index.

use alloc::string::String;
use core::ops::Deref;

use sha2::Digest as _;

use crate::utils::{
    ByteReader, ByteWriter, Deserializable, DeserializationError, HexParseError, Serializable,
    bytes_to_hex_string, hex_to_bytes,
};

// CONSTANTS
// ================================================================================================

const DIGEST_BYTES: usize = 32;

// DIGEST
// ================================================================================================

/// A SHA-256 digest.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Sha256Digest([u8; DIGEST_BYTES]);

impl Sha256Digest {
    pub fn as_bytes(&self) -> [u8; DIGEST_BYTES] {
        self.0
    }
}

impl Deref for Sha256Digest {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Sha256Digest> for [u8; DIGEST_BYTES] {
    fn from(value: Sha256Digest) -> Self {
        value.0
    }
}

impl From<[u8; DIGEST_BYTES]> for Sha256Digest {
    fn from(value: [u8; DIGEST_BYTES]) -> Self {
        Self(value)
    }
}

impl From<Sha256Digest> for String {
    fn from(value: Sha256Digest) -> Self {
        bytes_to_hex_string(value.as_bytes())
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = HexParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        hex_to_bytes(value).map(Self)
    }
}

impl Serializable for Sha256Digest {
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        target.write_bytes(&self.0);
    }
}

impl Deserializable for Sha256Digest {
    fn read_from<R: ByteReader>(source: &mut R) -> Result<Self, DeserializationError> {
        source.read_array().map(Self)
    }
}

// SHA256 HASHER
// ================================================================================================

/// SHA-256 hash function.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Sha256;

impl Sha256 {
    /// Returns a hash of the provided sequence of bytes.
    pub fn hash(bytes: &[u8]) -> Sha256Digest {
        let mut hasher = sha2::Sha256::new();
        hasher.update(bytes);
        Sha256Digest(hasher.finalize().into())
    }

    /// Returns a hash of two digests. This method is intended for use in construction of
    /// Merkle trees and verification of Merkle paths.
    pub fn merge(values: &[Sha256Digest; 2]) -> Sha256Digest {
        let mut hasher = sha2::Sha256::new();
        hasher.update(values[0].0);
        hasher.update(values[1].0);
        Sha256Digest(hasher.finalize().into())
    }

    /// Returns the direct hash of a key-value entry, `SHA256(key || value)`.
    pub fn hash_entry(key: &[u8], value: &[u8]) -> Sha256Digest {
        let mut hasher = sha2::Sha256::new();
        hasher.update(key);
        hasher.update(value);
        Sha256Digest(hasher.finalize().into())
    }

    /// Returns the hash of a leaf node, `SHA256(key_height || chunk_root)`.
    ///
    /// The height at which the leaf hangs is mixed into the hash so that a rotation which
    /// moves the leaf invalidates it.
    pub fn hash_leaf(key_height: u8, chunk_root: Option<&Sha256Digest>) -> Sha256Digest {
        let mut hasher = sha2::Sha256::new();
        hasher.update([key_height]);
        if let Some(root) = chunk_root {
            hasher.update(root.0);
        }
        Sha256Digest(hasher.finalize().into())
    }

    /// Merges the hashes of two child slots, skipping the ones that are absent.
    ///
    /// Heap slots outside the active entry range carry no hash; an absent child contributes
    /// zero bytes to the digest input.
    pub(crate) fn merge_defined(
        left: Option<&Sha256Digest>,
        right: Option<&Sha256Digest>,
    ) -> Sha256Digest {
        let mut hasher = sha2::Sha256::new();
        if let Some(digest) = left {
            hasher.update(digest.0);
        }
        if let Some(digest) = right {
            hasher.update(digest.0);
        }
        Sha256Digest(hasher.finalize().into())
    }

    /// Performs one step of a sibling-path fold: combines the running hash with the sibling
    /// hash recorded in a proof, placing the sibling on the side it was recorded on.
    pub(crate) fn fold_sibling(
        current: Sha256Digest,
        sibling: Option<&Sha256Digest>,
        sibling_on_left: bool,
    ) -> Sha256Digest {
        if sibling_on_left {
            Self::merge_defined(sibling, Some(&current))
        } else {
            Self::merge_defined(Some(&current), sibling)
        }
    }
}
