//! In-memory record model
//!
//! Files and tags form a bidirectional graph: every `FileRecord` holds the
//! nonces of its tags and every `TagRecord` holds the nonces of its files.
//! Records live in their owning table and reference each other by nonce, so
//! either side of a link can be deleted without dangling pointers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One stored byte stream and its place in the tag graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    nonce: u32,
    name: String,
    hash: u64,
    start_block: u32,
    size: u64,
    tags: BTreeSet<u32>,
}

impl FileRecord {
    /// Create a record with no tags attached.
    pub fn new(nonce: u32, name: String, hash: u64, start_block: u32, size: u64) -> Self {
        FileRecord {
            nonce,
            name,
            hash,
            start_block,
            size,
            tags: BTreeSet::new(),
        }
    }

    /// Container-unique identifier, monotonically allocated, never reused.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Display name, stored verbatim.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Integrity digest of the payload.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Index of the first block of the payload chain; 0 for empty payloads.
    pub fn start_block(&self) -> u32 {
        self.start_block
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Nonces of the tags attached to this file, ascending.
    pub fn tags(&self) -> &BTreeSet<u32> {
        &self.tags
    }

    /// Link a tag to this file. Returns false if it was already linked.
    pub(crate) fn attach(&mut self, tag_nonce: u32) -> bool {
        self.tags.insert(tag_nonce)
    }

    /// Unlink a tag from this file.
    pub(crate) fn detach(&mut self, tag_nonce: u32) -> bool {
        self.tags.remove(&tag_nonce)
    }

    /// Comparator ordering records by nonce ascending.
    pub fn asc(a: &FileRecord, b: &FileRecord) -> Ordering {
        a.nonce.cmp(&b.nonce)
    }

    /// Comparator ordering records by nonce descending.
    pub fn desc(a: &FileRecord, b: &FileRecord) -> Ordering {
        b.nonce.cmp(&a.nonce)
    }
}

/// One named classifier and the files that carry it.
///
/// Tag names are stored lower-cased; lookups are case-insensitive because
/// callers' input is folded before it reaches the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    nonce: u32,
    name: String,
    files: BTreeSet<u32>,
}

impl TagRecord {
    /// Create a tag with no files attached. `name` must already be folded.
    pub fn new(nonce: u32, name: String) -> Self {
        TagRecord {
            nonce,
            name,
            files: BTreeSet::new(),
        }
    }

    /// Container-unique identifier.
    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    /// Lower-cased tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nonces of the files carrying this tag, ascending.
    pub fn files(&self) -> &BTreeSet<u32> {
        &self.files
    }

    /// Link a file to this tag. Returns false if it was already linked.
    pub(crate) fn attach(&mut self, file_nonce: u32) -> bool {
        self.files.insert(file_nonce)
    }

    /// Unlink a file from this tag.
    pub(crate) fn detach(&mut self, file_nonce: u32) -> bool {
        self.files.remove(&file_nonce)
    }

    /// Comparator ordering tags by nonce ascending.
    pub fn asc(a: &TagRecord, b: &TagRecord) -> Ordering {
        a.nonce.cmp(&b.nonce)
    }

    /// Comparator ordering tags by nonce descending.
    pub fn desc(a: &TagRecord, b: &TagRecord) -> Ordering {
        b.nonce.cmp(&a.nonce)
    }
}

/// Snapshot of a file record returned by the public API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Container-unique identifier of the file.
    pub nonce: u32,
    /// Display name of the file.
    pub name: String,
    /// Integrity digest of the payload.
    pub hash: u64,
    /// Payload length in bytes.
    pub size: u64,
    /// Names of the tags attached to the file, sorted.
    pub tags: Vec<String>,
}

/// Snapshot of a tag record returned by the public API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInfo {
    /// Container-unique identifier of the tag.
    pub nonce: u32,
    /// Lower-cased tag name.
    pub name: String,
    /// Number of files carrying the tag.
    pub file_count: usize,
}

/// A file's metadata together with its payload bytes.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Metadata snapshot of the file.
    pub info: FileInfo,
    /// The payload.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_links() {
        let mut file = FileRecord::new(1, "a.bin".to_string(), 0xFEED, 0, 100);
        assert!(file.attach(7));
        assert!(!file.attach(7));
        assert!(file.tags().contains(&7));
        assert!(file.detach(7));
        assert!(file.tags().is_empty());
    }

    #[test]
    fn test_tag_record_links() {
        let mut tag = TagRecord::new(3, "red".to_string());
        assert!(tag.attach(1));
        assert!(tag.attach(2));
        assert!(!tag.attach(2));
        assert_eq!(tag.files().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_comparators() {
        let a = FileRecord::new(1, "a".to_string(), 0, 0, 0);
        let b = FileRecord::new(2, "b".to_string(), 0, 0, 0);
        assert_eq!(FileRecord::asc(&a, &b), Ordering::Less);
        assert_eq!(FileRecord::desc(&a, &b), Ordering::Greater);

        let t = TagRecord::new(5, "x".to_string());
        let u = TagRecord::new(9, "y".to_string());
        assert_eq!(TagRecord::asc(&t, &u), Ordering::Less);
        assert_eq!(TagRecord::desc(&t, &u), Ordering::Greater);
    }
}
