//! A bounded, sorted, byte-packed key-value container with an embedded Merkle heap.

mod error;
mod proof;

#[cfg(test)]
mod tests;

use alloc::{string::ToString, vec::Vec};

pub use error::ChunkError;
pub use proof::ChunkProof;

use crate::{
    Sha256, Sha256Digest,
    utils::{
        ByteReader, ByteWriter, DeserializationError, Serializable, read_framed_bytes,
        read_framed_uint, write_framed_bytes, write_framed_uint,
    },
};

// CONSTANTS
// ================================================================================================

/// Default ceiling on the total number of value bytes a chunk can address (16 MiB).
pub const DEFAULT_MAX_BYTE_CAPACITY: usize = 1 << 24;

/// Default ceiling on the size of a single value (64 KiB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1 << 16;

// CHUNK CONFIG
// ================================================================================================

/// Validated shape parameters of a [HeapChunk].
///
/// The per-entry metadata widths are derived from the two capacity ceilings: the value
/// offset field must be able to address `max_byte_capacity` bytes and the value length
/// field must be able to express `max_value_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    max_entries: usize,
    key_size: usize,
    index_bytes: usize,
    size_bytes: usize,
}

impl ChunkConfig {
    /// Returns a new configuration for chunks of at most `max_entries` entries with
    /// `key_size`-byte keys.
    ///
    /// # Errors
    /// Returns an error if:
    /// - `max_entries` is odd or smaller than two; a full chunk of odd capacity has no
    ///   valid heap root position.
    /// - `key_size` is zero.
    /// - `max_value_size` needs a wider length field than the offset field derived from
    ///   `max_byte_capacity`.
    pub fn new(
        max_entries: usize,
        key_size: usize,
        max_byte_capacity: usize,
        max_value_size: usize,
    ) -> Result<Self, ChunkError> {
        let index_bytes = address_bytes(max_byte_capacity);
        let size_bytes = address_bytes(max_value_size);
        Self::with_widths(max_entries, key_size, index_bytes, size_bytes)
    }

    /// Returns a configuration from explicit metadata field widths, as found on the wire.
    pub(crate) fn with_widths(
        max_entries: usize,
        key_size: usize,
        index_bytes: usize,
        size_bytes: usize,
    ) -> Result<Self, ChunkError> {
        if max_entries < 2 || max_entries % 2 != 0 {
            return Err(ChunkError::InvalidCapacity(max_entries));
        }
        if key_size == 0 {
            return Err(ChunkError::ZeroKeySize);
        }
        if size_bytes > index_bytes {
            return Err(ChunkError::ValueBoundExceedsCapacity { size_bytes, index_bytes });
        }
        Ok(Self { max_entries, key_size, index_bytes, size_bytes })
    }

    /// Returns the maximum number of entries a chunk can hold.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns the fixed key width in bytes.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Returns the width of the value offset field appended to each key.
    pub fn index_bytes(&self) -> usize {
        self.index_bytes
    }

    /// Returns the width of the value length field appended to each key.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Returns the byte width of one packed entry: key plus offset and length fields.
    fn entry_size(&self) -> usize {
        self.key_size + self.index_bytes + self.size_bytes
    }
}

/// Returns the number of bytes needed to address `capacity` distinct byte positions.
fn address_bytes(capacity: usize) -> usize {
    let bits = 64 - (capacity as u64).saturating_sub(1).leading_zeros() as usize;
    bits.div_ceil(8)
}

// HEAP CHUNK
// ================================================================================================

/// A fixed-capacity, sorted key-value container backed by an implicit binary Merkle heap.
///
/// Keys have a fixed width and live in a dense byte array; each key slot is followed by a
/// little-endian offset and length locating the value inside the growable `values` buffer.
/// Values sit in insertion order, keys in byte-lexicographic order.
///
/// The `hashes` array of `2 * max_entries - 1` slots holds the heap: the last `max_entries`
/// slots carry the direct hashes `SHA256(key || value)` of the packed entries, the slots
/// before them carry inner heap hashes. With `count` entries, the heap root sits at
/// `offset - (count - 1)` for even counts and `offset - count` for odd counts, where
/// `offset = max_entries - 1`; this shifts a full, balanced subtree over exactly the active
/// entries. Slots outside that subtree carry no hash.
#[derive(Clone, Debug)]
pub struct HeapChunk {
    keys: Vec<u8>,
    values: Vec<u8>,
    hashes: Vec<Option<Sha256Digest>>,
    count: usize,
    root: usize,
    config: ChunkConfig,
}

impl HeapChunk {
    // CONSTRUCTOR
    // --------------------------------------------------------------------------------------------

    /// Returns a new empty chunk.
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            keys: vec![0; config.max_entries * config.entry_size()],
            values: Vec::with_capacity(config.max_entries * config.key_size),
            hashes: vec![None; 2 * config.max_entries - 1],
            count: 0,
            root: 0,
            config,
        }
    }

    // PUBLIC ACCESSORS
    // --------------------------------------------------------------------------------------------

    /// Returns the shape parameters of this chunk.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Returns the number of entries currently stored.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the chunk holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if the chunk has reached its entry capacity.
    pub fn is_full(&self) -> bool {
        self.count >= self.config.max_entries
    }

    /// Returns the smallest key stored in the chunk.
    ///
    /// The slice aliases the first key slot of the chunk; it stays the smallest key across
    /// splits because a split always keeps the lower half of the entries in place.
    pub fn smallest_key(&self) -> &[u8] {
        &self.keys[..self.config.key_size]
    }

    /// Returns the hash at the root of the chunk's Merkle heap, or `None` for an empty
    /// chunk.
    pub fn root_hash(&self) -> Option<&Sha256Digest> {
        self.hashes[self.root].as_ref()
    }

    /// Returns the value stored under the given key, if present.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.index_of(key).map(|index| self.value_at(index))
    }

    // STATE MUTATORS
    // --------------------------------------------------------------------------------------------

    /// Inserts a key-value pair at its sorted position.
    ///
    /// The caller must ensure the chunk is not full, the key has the configured width and
    /// is not already present.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.is_full(), "insert into a full chunk");
        debug_assert_eq!(key.len(), self.config.key_size, "key width mismatch");
        debug_assert!(
            self.config.size_bytes >= 8
                || (value.len() as u64) < 1u64 << (8 * self.config.size_bytes),
            "value length does not fit the configured length field"
        );

        let index = self.insertion_index(key);
        let offset = self.heap_offset();

        // shift the direct hashes of the higher entries one slot right
        for slot in (index..self.count).rev() {
            let moved = self.hashes[offset + slot].take();
            self.hashes[offset + slot + 1] = moved;
        }

        // shift the packed key blocks one slot right
        let entry = self.config.entry_size();
        let first = index * entry;
        let last = self.count * entry;
        self.keys.copy_within(first..last, first + entry);

        // write the new entry and append its value bytes
        let value_offset = self.values.len();
        self.keys[first..first + self.config.key_size].copy_from_slice(key);
        self.write_value_metadata(index, value_offset, value.len());
        self.values.extend_from_slice(value);

        self.hashes[offset + index] = Some(Sha256::hash_entry(key, value));
        self.count += 1;
        self.compute_root_position();
        self.compute_hashes();
    }

    /// Replaces the value of the entry at `index`.
    ///
    /// The old value bytes stay behind as a hole in `values`; holes are reclaimed by the
    /// compaction that runs on the next split.
    pub(crate) fn update_value(&mut self, index: usize, value: &[u8]) {
        debug_assert!(index < self.count, "entry index out of range");
        debug_assert!(
            self.config.size_bytes >= 8
                || (value.len() as u64) < 1u64 << (8 * self.config.size_bytes),
            "value length does not fit the configured length field"
        );

        let digest = Sha256::hash_entry(self.key_at(index), value);
        let value_offset = self.values.len();
        self.values.extend_from_slice(value);
        self.write_value_metadata(index, value_offset, value.len());

        let offset = self.heap_offset();
        self.hashes[offset + index] = Some(digest);
        self.compute_hashes();
    }

    /// Inserts a key-value pair into a full chunk by splitting it.
    ///
    /// The upper half of the entries moves into a freshly allocated chunk which is
    /// returned; this chunk keeps the lower half (and its identity), compacts its value
    /// buffer and absorbs the new pair if it sorts below the split point. The split key is
    /// the returned chunk's smallest key.
    pub fn insert_split(&mut self, key: &[u8], value: &[u8]) -> HeapChunk {
        debug_assert!(self.is_full(), "split of a chunk that still has room");
        debug_assert_eq!(key.len(), self.config.key_size, "key width mismatch");

        let mut right = HeapChunk::new(self.config);
        let offset = self.heap_offset();
        let entry = self.config.entry_size();
        let index = self.insertion_index(key);
        let mid = (self.count + 1) / 2;
        let moved = self.count - mid;

        if index < mid {
            // the new pair stays here; hand the upper half to the right chunk as-is
            right.keys[..moved * entry].copy_from_slice(&self.keys[mid * entry..self.count * entry]);
            for (to, from) in (mid..self.count).enumerate() {
                right.hashes[offset + to] = self.hashes[offset + from].take();
            }
            right.count = moved;
            for slot in 0..moved {
                let (start, length) = right.value_bounds(slot);
                let new_offset = right.values.len();
                right.values.extend_from_slice(&self.values[start..start + length]);
                right.set_value_offset(slot, new_offset);
            }
            right.compute_root_position();
            right.compute_hashes();

            self.count = mid;
            self.compact_values();
            self.insert(key, value);
        } else {
            // the new pair belongs to the right chunk; interleave it while moving the
            // upper half across
            let new_hash = Sha256::hash_entry(key, value);
            let mut from = mid;
            let mut to = 0;
            while from < self.count {
                if index == mid + to {
                    right.hashes[offset + to] = Some(new_hash);
                    to += 1;
                } else {
                    let (start, length) = self.value_bounds(from);
                    let new_offset = right.values.len();
                    right.values.extend_from_slice(&self.values[start..start + length]);
                    // the key block still lives here; rewrite its offset before it is
                    // copied across below
                    self.set_value_offset(from, new_offset);
                    right.hashes[offset + to] = self.hashes[offset + from].take();
                    from += 1;
                    to += 1;
                }
            }
            // the new pair sorts past every existing entry
            if index == self.count {
                right.hashes[offset + moved] = Some(new_hash);
            }

            // key blocks: [mid, index), then the new entry, then [index, count)
            let split_at = (index - mid) * entry;
            right.keys[..split_at].copy_from_slice(&self.keys[mid * entry..index * entry]);
            right.keys[split_at + entry..(moved + 1) * entry]
                .copy_from_slice(&self.keys[index * entry..self.count * entry]);
            let value_offset = right.values.len();
            right.keys[split_at..split_at + self.config.key_size].copy_from_slice(key);
            right.write_value_metadata(index - mid, value_offset, value.len());
            right.values.extend_from_slice(value);

            right.count = moved + 1;
            right.compute_root_position();
            right.compute_hashes();

            self.count = mid;
            self.compact_values();
            self.compute_root_position();
            self.compute_hashes();
        }

        right
    }

    // PACKED ENTRY ACCESS
    // --------------------------------------------------------------------------------------------

    /// Returns the key stored at the given entry index, excluding metadata.
    pub(crate) fn key_at(&self, index: usize) -> &[u8] {
        let base = index * self.config.entry_size();
        &self.keys[base..base + self.config.key_size]
    }

    /// Returns the value bytes of the entry at the given index.
    fn value_at(&self, index: usize) -> &[u8] {
        let (start, length) = self.value_bounds(index);
        &self.values[start..start + length]
    }

    /// Decodes the value offset and length fields of the entry at the given index.
    fn value_bounds(&self, index: usize) -> (usize, usize) {
        let base = index * self.config.entry_size() + self.config.key_size;
        let offset = read_uint_le(&self.keys[base..base + self.config.index_bytes]) as usize;
        let length_base = base + self.config.index_bytes;
        let length =
            read_uint_le(&self.keys[length_base..length_base + self.config.size_bytes]) as usize;
        (offset, length)
    }

    /// Writes the value offset and length fields of the entry at the given index.
    fn write_value_metadata(&mut self, index: usize, offset: usize, length: usize) {
        let base = index * self.config.entry_size() + self.config.key_size;
        let length_base = base + self.config.index_bytes;
        let size_bytes = self.config.size_bytes;
        write_uint_le(&mut self.keys[base..length_base], offset as u64);
        write_uint_le(&mut self.keys[length_base..length_base + size_bytes], length as u64);
    }

    /// Rewrites only the value offset field of the entry at the given index; used when
    /// value bytes move to a new position.
    fn set_value_offset(&mut self, index: usize, offset: usize) {
        let base = index * self.config.entry_size() + self.config.key_size;
        let index_bytes = self.config.index_bytes;
        write_uint_le(&mut self.keys[base..base + index_bytes], offset as u64);
    }

    /// Returns the entry index holding the given key, if present.
    pub(crate) fn index_of(&self, key: &[u8]) -> Option<usize> {
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.key_at(mid).cmp(key) {
                core::cmp::Ordering::Equal => return Some(mid),
                core::cmp::Ordering::Less => lo = mid + 1,
                core::cmp::Ordering::Greater => hi = mid,
            }
        }
        None
    }

    /// Returns the sorted position for a new key; equal keys land after their duplicates.
    fn insertion_index(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.key_at(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    // VALUE COMPACTION
    // --------------------------------------------------------------------------------------------

    /// Closes the holes a split (or value updates) left in the value buffer by rewriting
    /// all live value ranges contiguously in key order.
    fn compact_values(&mut self) {
        let mut compacted = Vec::with_capacity(self.config.max_entries * self.config.entry_size());
        for slot in 0..self.count {
            let (start, length) = self.value_bounds(slot);
            let new_offset = compacted.len();
            compacted.extend_from_slice(&self.values[start..start + length]);
            self.set_value_offset(slot, new_offset);
        }
        self.values = compacted;
    }

    // HASHING
    // --------------------------------------------------------------------------------------------

    /// Returns the offset between an entry index and its direct hash slot.
    fn heap_offset(&self) -> usize {
        self.config.max_entries - 1
    }

    /// Returns true if the heap slot holds a direct entry hash rather than an inner hash.
    fn is_leaf_slot(&self, index: usize) -> bool {
        index >= self.config.max_entries - 1
    }

    /// Repositions the heap root for the current entry count.
    fn compute_root_position(&mut self) {
        debug_assert!(self.count > 0, "empty heap has no root position");
        let offset = self.heap_offset();
        self.root =
            if self.count % 2 == 0 { offset - (self.count - 1) } else { offset - self.count };
    }

    /// Recomputes all inner heap hashes reachable from the current root.
    fn compute_hashes(&mut self) {
        let root = self.root;
        self.compute_subtree(root);
    }

    fn compute_subtree(&mut self, index: usize) -> Option<Sha256Digest> {
        if self.is_leaf_slot(index) {
            return self.hashes[index];
        }
        let left = self.compute_subtree(left_child(index, self.root));
        let right = self.compute_subtree(right_child(index, self.root));
        let digest = Sha256::merge_defined(left.as_ref(), right.as_ref());
        self.hashes[index] = Some(digest);
        Some(digest)
    }
}

// SERIALIZATION
// ================================================================================================

impl Serializable for HeapChunk {
    /// Emits the entry count, the metadata field widths, the key width, the live prefix of
    /// the packed key area and the value buffer.
    fn write_into<W: ByteWriter>(&self, target: &mut W) {
        write_framed_uint(target, self.count as u64);
        write_framed_uint(target, self.config.size_bytes as u64);
        write_framed_uint(target, self.config.index_bytes as u64);
        write_framed_uint(target, self.config.key_size as u64);
        write_framed_bytes(target, &self.keys[..self.count * self.config.entry_size()]);
        write_framed_bytes(target, &self.values);
    }
}

impl HeapChunk {
    /// Reconstructs a chunk of the given capacity from its serialized form, recomputing
    /// all heap hashes from the live key and value data.
    ///
    /// # Errors
    /// Returns an error if the buffer is truncated, the decoded widths are inconsistent, or
    /// an entry's value range falls outside the value buffer.
    pub fn read_from<R: ByteReader>(
        source: &mut R,
        max_entries: usize,
    ) -> Result<Self, DeserializationError> {
        let count = read_framed_uint(source)? as usize;
        let size_bytes = read_framed_uint(source)? as usize;
        let index_bytes = read_framed_uint(source)? as usize;
        let key_size = read_framed_uint(source)? as usize;
        let mut keys = read_framed_bytes(source)?;
        let values = read_framed_bytes(source)?;

        let config = ChunkConfig::with_widths(max_entries, key_size, index_bytes, size_bytes)
            .map_err(|err| DeserializationError::InvalidValue(err.to_string()))?;
        if count > max_entries {
            return Err(DeserializationError::InvalidValue(format!(
                "entry count {count} exceeds chunk capacity {max_entries}"
            )));
        }
        if keys.len() != count * config.entry_size() {
            return Err(DeserializationError::InvalidValue(format!(
                "key area of {} bytes does not match {count} entries",
                keys.len()
            )));
        }
        // the key area must have room for the full capacity so later inserts fit
        keys.resize(config.max_entries * config.entry_size(), 0);

        let mut chunk = HeapChunk {
            keys,
            values,
            hashes: vec![None; 2 * config.max_entries - 1],
            count,
            root: 0,
            config,
        };

        let offset = chunk.heap_offset();
        for slot in 0..count {
            let (start, length) = chunk.value_bounds(slot);
            let end = start.checked_add(length).filter(|&end| end <= chunk.values.len()).ok_or_else(
                || {
                    DeserializationError::InvalidValue(format!(
                        "value range of entry {slot} falls outside the value buffer"
                    ))
                },
            )?;
            let digest = Sha256::hash_entry(chunk.key_at(slot), &chunk.values[start..end]);
            chunk.hashes[offset + slot] = Some(digest);
        }

        if chunk.count > 0 {
            chunk.compute_root_position();
            chunk.compute_hashes();
        }
        Ok(chunk)
    }
}

// HEAP INDEX ARITHMETIC
// ================================================================================================
//
// The implicit heap is shifted so that the subtree rooted at `root` spans exactly the
// active entries: a node at index `i` has children at `2i + 1 - root` and `2i + 2 - root`.

const fn left_child(index: usize, root: usize) -> usize {
    2 * index + 1 - root
}

const fn right_child(index: usize, root: usize) -> usize {
    2 * index + 2 - root
}

const fn parent(index: usize, root: usize) -> usize {
    (index + root - 1) / 2
}

/// Returns the sibling of the given heap index and whether it sits on the left; the topmost
/// slot has no sibling.
const fn sibling(index: usize) -> Option<(usize, bool)> {
    match index {
        0 => None,
        i if i % 2 == 0 => Some((i - 1, true)),
        i => Some((i + 1, false)),
    }
}

// LITTLE-ENDIAN FIELD CODING
// ================================================================================================

/// Encodes an unsigned integer into a little-endian field of arbitrary width.
fn write_uint_le(buffer: &mut [u8], value: u64) {
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = (value >> (8 * i)) as u8;
    }
}

/// Decodes an unsigned integer from a little-endian field of arbitrary width.
fn read_uint_le(buffer: &[u8]) -> u64 {
    buffer
        .iter()
        .enumerate()
        .fold(0, |value, (i, &byte)| value | (u64::from(byte) << (8 * i)))
}
