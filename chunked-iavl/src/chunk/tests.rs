use alloc::vec::Vec;

use assert_matches::assert_matches;
use proptest::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::*;
use crate::utils::SliceReader;

fn test_config(max_entries: usize, key_size: usize) -> ChunkConfig {
    ChunkConfig::new(max_entries, key_size, 16_000_000, 1024).unwrap()
}

fn le_key(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

// CONFIG
// ================================================================================================

#[test]
fn config_derives_field_widths() {
    let config = ChunkConfig::new(16, 4, 256, 16).unwrap();
    assert_eq!(config.index_bytes(), 1);
    assert_eq!(config.size_bytes(), 1);

    let config = ChunkConfig::new(16, 4, 16_000_000, 65_536).unwrap();
    assert_eq!(config.index_bytes(), 3);
    assert_eq!(config.size_bytes(), 2);
}

#[test]
fn config_rejects_odd_capacity() {
    assert_matches!(ChunkConfig::new(7, 4, 1024, 256), Err(ChunkError::InvalidCapacity(7)));
    assert_matches!(ChunkConfig::new(0, 4, 1024, 256), Err(ChunkError::InvalidCapacity(0)));
}

#[test]
fn config_rejects_value_bound_above_capacity() {
    assert_matches!(
        ChunkConfig::new(16, 4, 256, 65_536),
        Err(ChunkError::ValueBoundExceedsCapacity { size_bytes: 2, index_bytes: 1 })
    );
}

// INSERT / GET
// ================================================================================================

#[test]
fn small_chunk_insert_and_get() {
    let mut chunk = HeapChunk::new(ChunkConfig::new(16, 4, 256, 16).unwrap());

    chunk.insert(&[20, 20, 20, 20], b"ten bytes!");
    chunk.insert(&[10, 10, 10, 10], b"four");
    chunk.insert(&[30, 30, 30, 30], b"five5");

    assert_eq!(chunk.len(), 3);
    assert_eq!(chunk.get(&[30, 30, 30, 30]), Some(b"five5".as_slice()));
    assert_eq!(chunk.get(&[20, 20, 20, 20]), Some(b"ten bytes!".as_slice()));
    assert_eq!(chunk.get(&[10, 10, 10, 10]), Some(b"four".as_slice()));
    assert_eq!(chunk.get(&[40, 40, 40, 40]), None);

    assert_eq!(chunk.smallest_key(), &[10, 10, 10, 10]);
}

#[test]
fn child_relationship_follows_root_offset() {
    assert_eq!(left_child(6, 6), 7);
    assert_eq!(right_child(6, 6), 8);

    assert_eq!(left_child(5, 5), 6);
    assert_eq!(right_child(5, 5), 7);
    assert_eq!(left_child(6, 5), 8);
    assert_eq!(right_child(6, 5), 9);

    assert_eq!(left_child(4, 4), 5);
    assert_eq!(right_child(4, 4), 6);
    assert_eq!(left_child(5, 4), 7);
    assert_eq!(right_child(5, 4), 8);
    assert_eq!(left_child(6, 4), 9);
    assert_eq!(right_child(6, 4), 10);

    assert_eq!(left_child(3, 3), 4);
    assert_eq!(right_child(3, 3), 5);
    assert_eq!(left_child(7, 3), 12);
    assert_eq!(right_child(7, 3), 13);
}

#[test]
fn random_values_of_random_sizes() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let capacity = 64usize;
    let mut chunk = HeapChunk::new(test_config(capacity, 4));

    let values: Vec<Vec<u8>> = (0..capacity)
        .map(|_| {
            let length = rng.random_range(256..1024);
            (0..length).map(|_| rng.random()).collect()
        })
        .collect();
    let total_bytes: usize = values.iter().map(Vec::len).sum();

    let mut order: Vec<u32> = (0..capacity as u32).collect();
    order.shuffle(&mut rng);
    for &element in &order {
        chunk.insert(&le_key(element), &values[element as usize]);

        // recomputing the heap must not change the root hash
        let before = chunk.root_hash().copied();
        chunk.compute_hashes();
        assert_eq!(chunk.root_hash().copied(), before);
    }

    for &element in &order {
        assert_eq!(chunk.get(&le_key(element)), Some(values[element as usize].as_slice()));
    }
    assert!(chunk.is_full());
    assert_eq!(chunk.values.len(), total_bytes);

    // every direct hash covers its packed entry
    let offset = chunk.heap_offset();
    for slot in 0..capacity {
        let key = chunk.key_at(slot).to_vec();
        let value = chunk.get(&key).unwrap();
        assert_eq!(chunk.hashes[offset + slot], Some(Sha256::hash_entry(&key, value)));
    }

    // every inner hash folds its two children
    for index in 0..capacity - 1 {
        let left = chunk.hashes[left_child(index, chunk.root)];
        let right = chunk.hashes[right_child(index, chunk.root)];
        assert_eq!(chunk.hashes[index], Some(Sha256::merge_defined(left.as_ref(), right.as_ref())));
    }
}

// SPLITS
// ================================================================================================

#[test]
fn split_with_insertion_into_left_half() {
    let mut chunk = HeapChunk::new(test_config(8, 4));

    chunk.insert(&[10, 10, 10, 10], b"Dieci");
    chunk.insert(&[70, 10, 10, 10], b"Settanta");
    chunk.insert(&[80, 10, 10, 10], b"Punk Rock");
    chunk.insert(&[90, 10, 10, 10], b"Novanta");
    chunk.insert(&[40, 10, 10, 10], b"Ciao Ciao Ciao");
    chunk.insert(&[60, 10, 10, 10], b"Abcdefgh");
    chunk.insert(&[50, 10, 10, 10], b"cento diviso due");
    chunk.insert(&[20, 10, 10, 10], b"Some Text");
    assert!(chunk.is_full());

    let right = chunk.insert_split(&[30, 10, 10, 10], b"New value that goes in the left chunk");

    assert_eq!(right.get(&[60, 10, 10, 10]), Some(b"Abcdefgh".as_slice()));
    assert_eq!(right.get(&[70, 10, 10, 10]), Some(b"Settanta".as_slice()));
    assert_eq!(right.get(&[80, 10, 10, 10]), Some(b"Punk Rock".as_slice()));
    assert_eq!(right.get(&[90, 10, 10, 10]), Some(b"Novanta".as_slice()));
    assert_eq!(right.len(), 4);

    assert_eq!(
        chunk.get(&[30, 10, 10, 10]),
        Some(b"New value that goes in the left chunk".as_slice())
    );
    assert_eq!(chunk.get(&[10, 10, 10, 10]), Some(b"Dieci".as_slice()));
    assert_eq!(chunk.get(&[20, 10, 10, 10]), Some(b"Some Text".as_slice()));
    assert_eq!(chunk.get(&[40, 10, 10, 10]), Some(b"Ciao Ciao Ciao".as_slice()));
    assert_eq!(chunk.get(&[50, 10, 10, 10]), Some(b"cento diviso due".as_slice()));
    assert_eq!(chunk.len(), 5);

    // the split key is the right chunk's smallest key, and the left chunk kept its own
    assert_eq!(right.smallest_key(), &[60, 10, 10, 10]);
    assert_eq!(chunk.smallest_key(), &[10, 10, 10, 10]);
}

#[test]
fn split_with_insertion_into_right_half() {
    let mut chunk = HeapChunk::new(test_config(8, 4));

    chunk.insert(&[10, 10, 10, 10], b"Dieci");
    chunk.insert(&[70, 10, 10, 10], b"Settanta");
    chunk.insert(&[80, 10, 10, 10], b"Punk Rock");
    chunk.insert(&[90, 10, 10, 10], b"Novanta");
    chunk.insert(&[40, 10, 10, 10], b"Ciao Ciao Ciao");
    chunk.insert(&[60, 10, 10, 10], b"Abcdefgh");
    chunk.insert(&[50, 10, 10, 10], b"cento diviso due");
    chunk.insert(&[20, 10, 10, 10], b"Some Text");
    assert!(chunk.is_full());

    let right = chunk.insert_split(&[75, 10, 10, 10], b"New value that goes in the right chunk");

    assert_eq!(right.get(&[60, 10, 10, 10]), Some(b"Abcdefgh".as_slice()));
    assert_eq!(right.get(&[70, 10, 10, 10]), Some(b"Settanta".as_slice()));
    assert_eq!(
        right.get(&[75, 10, 10, 10]),
        Some(b"New value that goes in the right chunk".as_slice())
    );
    assert_eq!(right.get(&[80, 10, 10, 10]), Some(b"Punk Rock".as_slice()));
    assert_eq!(right.get(&[90, 10, 10, 10]), Some(b"Novanta".as_slice()));

    assert_eq!(right.len(), 5);
    assert_eq!(chunk.len(), 4);
}

#[test]
fn split_with_insertion_past_the_end() {
    let mut chunk = HeapChunk::new(test_config(4, 4));
    chunk.insert(&le_key(1), b"one");
    chunk.insert(&le_key(2), b"two");
    chunk.insert(&le_key(3), b"three");
    chunk.insert(&le_key(4), b"four");
    assert!(chunk.is_full());

    // key 5 sorts after every existing entry
    let right = chunk.insert_split(&le_key(5), b"five");
    assert_eq!(chunk.len(), 2);
    assert_eq!(right.len(), 3);
    assert_eq!(right.get(&le_key(5)), Some(b"five".as_slice()));
    assert_eq!(right.get(&le_key(3)), Some(b"three".as_slice()));
    assert_eq!(right.get(&le_key(4)), Some(b"four".as_slice()));
    assert_eq!(chunk.get(&le_key(1)), Some(b"one".as_slice()));
    assert_eq!(chunk.get(&le_key(2)), Some(b"two".as_slice()));
}

// VALUE UPDATES
// ================================================================================================

#[test]
fn update_replaces_the_stored_value() {
    let mut chunk = HeapChunk::new(test_config(4, 4));
    chunk.insert(&le_key(10), b"before");
    chunk.insert(&le_key(20), b"other");

    let old_root = chunk.root_hash().copied();
    let slot = chunk.index_of(&le_key(10)).unwrap();
    chunk.update_value(slot, b"after");

    assert_eq!(chunk.len(), 2);
    assert_eq!(chunk.get(&le_key(10)), Some(b"after".as_slice()));
    assert_ne!(chunk.root_hash().copied(), old_root);

    // the refreshed entry still proves against the new root
    let proof = chunk.prove(&le_key(10)).unwrap();
    assert_eq!(Some(proof.compute_root(&le_key(10), b"after")), chunk.root_hash().copied());
}

// PROOFS
// ================================================================================================

#[test]
fn proof_round_trip_in_small_chunk() {
    let mut chunk = HeapChunk::new(ChunkConfig::new(8, 1, 1024, 256).unwrap());

    chunk.insert(&[10], &[10]);
    chunk.insert(&[30], &[30]);
    chunk.insert(&[20], &[20]);
    chunk.insert(&[40], &[40]);
    chunk.insert(&[70], &[70]);
    chunk.insert(&[60], &[60]);

    let proof = chunk.prove(&[20]).unwrap();
    assert_eq!(Some(proof.compute_root(&[20], &[20])), chunk.root_hash().copied());

    chunk.insert(&[50], &[50]);
    chunk.insert(&[80], &[80]);

    let proof = chunk.prove(&[60]).unwrap();
    assert_eq!(Some(proof.compute_root(&[60], &[60])), chunk.root_hash().copied());
    // a full chunk's heap root sits at slot zero
    assert_eq!(chunk.root, 0);
}

#[test]
fn proofs_hold_at_every_fill_level() {
    let mut rng = StdRng::seed_from_u64(42);
    let capacity = 128usize;
    let mut chunk = HeapChunk::new(test_config(capacity, 4));

    let mut order: Vec<u32> = (0..capacity as u32).collect();
    order.shuffle(&mut rng);

    for (inserted, &element) in order.iter().enumerate() {
        chunk.insert(&le_key(element), &le_key(element));

        for &proven in &order[..inserted] {
            let proof = chunk.prove(&le_key(proven)).unwrap();
            assert_eq!(
                Some(proof.compute_root(&le_key(proven), &le_key(proven))),
                chunk.root_hash().copied()
            );
        }
    }
}

#[test]
fn proof_for_missing_key_fails() {
    let mut chunk = HeapChunk::new(test_config(8, 4));
    chunk.insert(&le_key(1), b"one");
    assert_matches!(chunk.prove(&le_key(2)), Err(ChunkError::KeyNotFound));
}

#[test]
fn proof_with_wrong_value_does_not_match() {
    let mut chunk = HeapChunk::new(test_config(8, 4));
    chunk.insert(&le_key(1), b"one");
    chunk.insert(&le_key(2), b"two");

    let proof = chunk.prove(&le_key(1)).unwrap();
    assert_ne!(Some(proof.compute_root(&le_key(1), b"not one")), chunk.root_hash().copied());
}

// SERIALIZATION
// ================================================================================================

#[test]
fn serialization_round_trip_of_half_full_chunk() {
    let mut rng = StdRng::seed_from_u64(7);
    let capacity = 256usize;
    let mut chunk = HeapChunk::new(test_config(capacity, 4));

    let mut order: Vec<u32> = (0..(capacity / 2 + 1) as u32).collect();
    order.shuffle(&mut rng);
    for &element in &order {
        chunk.insert(&le_key(element), &le_key(element));
    }

    let bytes = chunk.to_bytes();
    let mut reader = SliceReader::new(&bytes);
    let mut restored = HeapChunk::read_from(&mut reader, capacity).unwrap();

    assert_eq!(restored.root, chunk.root);
    assert_eq!(restored.root_hash(), chunk.root_hash());
    assert_eq!(restored.len(), chunk.len());
    assert_eq!(restored.keys.len(), chunk.keys.len());
    assert_eq!(restored.values.len(), chunk.values.len());

    // the restored key area has room for the remaining capacity
    let next = (capacity / 2 + 1) as u32;
    restored.insert(&le_key(next), b"later");
    assert_eq!(restored.get(&le_key(next)), Some(b"later".as_slice()));
}

#[test]
fn deserialization_rejects_inconsistent_value_ranges() {
    let mut chunk = HeapChunk::new(test_config(4, 4));
    chunk.insert(&le_key(1), b"payload");

    let mut bytes = chunk.to_bytes();
    // shrink the value buffer under the entry's recorded range: the value frame sits at
    // the end as a one-byte frame length, a length byte, then the payload
    let length_byte = bytes.len() - b"payload".len() - 1;
    bytes[length_byte] = (b"payload".len() - 1) as u8;
    bytes.pop();

    let mut reader = SliceReader::new(&bytes);
    assert!(HeapChunk::read_from(&mut reader, 4).is_err());
}

#[test]
fn deserialization_rejects_truncated_buffer() {
    let mut chunk = HeapChunk::new(test_config(4, 4));
    chunk.insert(&le_key(1), b"payload");

    let bytes = chunk.to_bytes();
    let mut reader = SliceReader::new(&bytes[..bytes.len() / 2]);
    assert!(HeapChunk::read_from(&mut reader, 4).is_err());
}

// PROPERTIES
// ================================================================================================

proptest! {
    #[test]
    fn contents_are_insertion_order_independent(
        entries in proptest::collection::btree_map(
            any::<u32>(),
            proptest::collection::vec(any::<u8>(), 0..64),
            1..=32usize,
        )
    ) {
        let config = test_config(32, 4);

        let mut ascending = HeapChunk::new(config);
        for (key, value) in entries.iter() {
            ascending.insert(&le_key(*key), value);
        }

        let mut descending = HeapChunk::new(config);
        for (key, value) in entries.iter().rev() {
            descending.insert(&le_key(*key), value);
        }

        prop_assert_eq!(ascending.root_hash(), descending.root_hash());
        for (key, value) in entries.iter() {
            prop_assert_eq!(ascending.get(&le_key(*key)), Some(value.as_slice()));
        }
    }

    #[test]
    fn serialization_round_trip_preserves_the_root_hash(
        entries in proptest::collection::btree_map(
            any::<u32>(),
            proptest::collection::vec(any::<u8>(), 0..64),
            1..=32usize,
        )
    ) {
        let mut chunk = HeapChunk::new(test_config(32, 4));
        for (key, value) in entries.iter() {
            chunk.insert(&le_key(*key), value);
        }

        let bytes = chunk.to_bytes();
        let mut reader = SliceReader::new(&bytes);
        let restored = HeapChunk::read_from(&mut reader, 32).unwrap();
        prop_assert_eq!(restored.root_hash(), chunk.root_hash());
    }
}
