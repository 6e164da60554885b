//! Property-based tests for container invariants
//!
//! Uses proptest to verify the engine's invariants across many randomized
//! payloads and tag assignments: payload round-trips, nonce monotonicity,
//! tag symmetry and garbage collection, intersection correctness, reopen
//! durability, and free-block reuse.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tempfile::tempdir;
use tfc::{OperationMode, Tfc};

/// Create an initialized container ready for editing.
fn edit_container(path: &std::path::Path) -> Tfc {
    let container = Tfc::open(path);
    container.set_mode(OperationMode::Create).unwrap();
    container.init().unwrap();
    container.set_mode(OperationMode::Closed).unwrap();
    container.set_mode(OperationMode::Read).unwrap();
    container.set_mode(OperationMode::Edit).unwrap();
    container
}

/// On-disk block count: u32 big-endian after the 40-byte header.
fn block_count_on_disk(path: &std::path::Path) -> u32 {
    let raw = std::fs::read(path).unwrap();
    u32::from_be_bytes(raw[40..44].try_into().unwrap())
}

/// A tag pool small enough that random assignments collide often.
const TAG_POOL: [&str; 4] = ["red", "square", "heavy", "old"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_payload_round_trip(data in prop::collection::vec(any::<u8>(), 0..3000)) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");
        let container = edit_container(&path);

        let nonce = container.add_blob("x", &data).unwrap();

        container.set_mode(OperationMode::Read).unwrap();
        let blob = container.read_blob(nonce).unwrap();
        prop_assert_eq!(&blob.data, &data);
        prop_assert_eq!(blob.info.size, data.len() as u64);
    }

    #[test]
    fn prop_nonces_monotonic_never_reused(
        payload_count in 1usize..8,
        delete_at in 0usize..8
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");
        let container = edit_container(&path);

        // successive adds return strictly increasing nonces from 1
        let mut nonces = Vec::new();
        for i in 0..payload_count {
            let nonce = container.add_blob(&format!("f{i}"), &[i as u8; 64]).unwrap();
            nonces.push(nonce);
        }
        for (i, pair) in nonces.windows(2).enumerate() {
            prop_assert!(pair[1] > pair[0], "nonce {} not after {}", pair[1], nonces[i]);
        }
        prop_assert_eq!(nonces.first().copied(), Some(1));

        // a deleted nonce never comes back
        let victim = nonces[delete_at % nonces.len()];
        container.delete_blob(victim).unwrap();
        let fresh = container.add_blob("fresh", b"fresh").unwrap();
        prop_assert!(fresh > *nonces.last().unwrap());
        prop_assert_ne!(fresh, victim);
    }

    #[test]
    fn prop_tag_symmetry_and_gc(
        assignment in prop::collection::vec(prop::collection::vec(any::<bool>(), 4), 1..6),
        delete_mask in prop::collection::vec(any::<bool>(), 1..6)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");
        let container = edit_container(&path);

        // randomly tag each file from the pool
        let mut nonces = Vec::new();
        for (i, tags) in assignment.iter().enumerate() {
            let nonce = container.add_blob(&format!("f{i}"), &[i as u8; 10]).unwrap();
            for (tag, chosen) in TAG_POOL.iter().zip(tags) {
                if *chosen {
                    container.attach_tag(nonce, tag).unwrap();
                }
            }
            nonces.push(nonce);
        }

        // delete a random subset
        for (nonce, delete) in nonces.iter().zip(delete_mask.iter().cycle()) {
            if *delete {
                container.delete_blob(*nonce).unwrap();
            }
        }

        container.set_mode(OperationMode::Read).unwrap();
        let files = container.list_blobs().unwrap();
        let tags = container.list_tags().unwrap();

        // symmetry: every tag's file count matches the files listing it
        for tag in &tags {
            let carriers = files.iter().filter(|f| f.tags.contains(&tag.name)).count();
            prop_assert_eq!(tag.file_count, carriers, "tag {} out of sync", tag.name);
        }

        // GC: no tag exists without at least one file
        for tag in &tags {
            prop_assert!(tag.file_count > 0, "empty tag {} survived", tag.name);
        }

        // and no file lists a tag the table lost
        let tag_names: BTreeSet<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        for file in &files {
            for name in &file.tags {
                prop_assert!(tag_names.contains(name.as_str()));
            }
        }
    }

    #[test]
    fn prop_intersection_matches_model(
        assignment in prop::collection::vec(prop::collection::vec(any::<bool>(), 4), 1..6),
        query_mask in prop::collection::vec(any::<bool>(), 4)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");
        let container = edit_container(&path);

        let mut model: Vec<(u32, BTreeSet<&str>)> = Vec::new();
        for (i, tags) in assignment.iter().enumerate() {
            let nonce = container.add_blob(&format!("f{i}"), &[i as u8]).unwrap();
            let mut chosen = BTreeSet::new();
            for (tag, pick) in TAG_POOL.iter().zip(tags) {
                if *pick {
                    container.attach_tag(nonce, tag).unwrap();
                    chosen.insert(*tag);
                }
            }
            model.push((nonce, chosen));
        }

        let query: Vec<&str> = TAG_POOL
            .iter()
            .zip(&query_mask)
            .filter(|(_, pick)| **pick)
            .map(|(tag, _)| *tag)
            .collect();

        // only query tags that exist in the container
        let live: BTreeSet<&str> = model.iter().flat_map(|(_, t)| t.iter().copied()).collect();
        prop_assume!(!query.is_empty());
        prop_assume!(query.iter().all(|tag| live.contains(tag)));

        container.set_mode(OperationMode::Read).unwrap();
        let found: Vec<u32> = container
            .intersection(&query)
            .unwrap()
            .iter()
            .map(|f| f.nonce)
            .collect();

        // the model answer: files carrying every queried tag, ascending
        let expected: Vec<u32> = model
            .iter()
            .filter(|(_, tags)| query.iter().all(|q| tags.contains(q)))
            .map(|(nonce, _)| *nonce)
            .collect();

        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prop_reopen_reproduces_container(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..1500), 1..5)
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");

        let mut stored = Vec::new();
        {
            let container = edit_container(&path);
            for (i, payload) in payloads.iter().enumerate() {
                let nonce = container.add_blob(&format!("f{i}"), payload).unwrap();
                container.attach_tag(nonce, TAG_POOL[i % TAG_POOL.len()]).unwrap();
                stored.push((nonce, payload.clone()));
            }
            container.set_mode(OperationMode::Read).unwrap();
            stored.sort_by_key(|(nonce, _)| *nonce);
            container.close().unwrap();
        }

        let reopened = Tfc::open(&path);
        reopened.set_mode(OperationMode::Read).unwrap();

        let files = reopened.list_blobs().unwrap();
        prop_assert_eq!(files.len(), stored.len());
        for ((nonce, payload), file) in stored.iter().zip(&files) {
            prop_assert_eq!(file.nonce, *nonce);
            let blob = reopened.read_blob(*nonce).unwrap();
            prop_assert_eq!(&blob.data, payload);
            prop_assert_eq!(blob.info.hash, file.hash);
        }
    }

    #[test]
    fn prop_freed_blocks_are_reused(
        first_size in 1usize..2500,
        second_size in 1usize..2500
    ) {
        // the replacement fits in the freed region
        prop_assume!(second_size <= first_size);

        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tfc");
        let container = edit_container(&path);

        let first = container.add_blob("first", &vec![0xAA; first_size]).unwrap();
        container.add_blob("keeper", &vec![0xBB; 700]).unwrap();
        let grown = block_count_on_disk(&path);

        container.delete_blob(first).unwrap();
        let replacement = container.add_blob("second", &vec![0xCC; second_size]).unwrap();

        // the heap must not grow
        prop_assert_eq!(block_count_on_disk(&path), grown);

        // and everything still reads back intact
        container.set_mode(OperationMode::Read).unwrap();
        prop_assert_eq!(
            container.read_blob(replacement).unwrap().data,
            vec![0xCC; second_size]
        );
        prop_assert_eq!(container.read_blob(2).unwrap().data, vec![0xBB; 700]);
    }
}
