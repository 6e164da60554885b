//! Container engine
//!
//! Owns the on-disk format and the in-memory tag/file graph, and keeps the
//! two coherent. The container file is laid out as a fixed header, a heap of
//! 516-byte blocks chained by u32 indices, and the tag and file tables:
//!
//! ```text
//! [HEADER]      4  magic number        0xE621126E
//!               4  version             1
//!              32  DEK slot            all-zero = unencrypted
//! [BLOCK LIST]  4  block count
//!        516*N    blocks: 512 payload bytes + u32 next-block index (0 = end)
//! [TAG TABLE]   4  next nonce
//!               4  tag count
//!                  per tag: u32 nonce, cstring name
//! [FILE TABLE]  4  next nonce
//!               4  file count
//!                  per file: u32 nonce, cstring name, u64 hash,
//!                            u64 start block, u64 size,
//!                            u32 tag count, u32 tag nonces
//! ```
//!
//! All integers are big-endian. The heap sits before the tables, so the
//! tables shift whenever the heap grows; every mutation therefore rewrites
//! both tables in full at their new positions. The tables are small relative
//! to block data, and the full rewrite keeps on-disk counts equal to the
//! in-memory tables without partial updates.

use crate::core::digest::digest;
use crate::core::error::{Result, TfcError};
use crate::core::record::{Blob, FileInfo, FileRecord, TagInfo, TagRecord};
use crate::core::scribe::{OperationMode, Scribe};
use crate::core::table::{FileTable, TagTable};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Identifies a file as a tagged file container.
pub const MAGIC_NUMBER: u32 = 0xE621126E;

/// Newest container revision this implementation reads and writes.
pub const CONTAINER_VERSION: u32 = 1;

/// Payload bytes per block.
pub const BLOCK_DATA_SIZE: usize = 512;

/// Tail bytes per block: the u32 index of the next block in the chain.
pub const BLOCK_TAIL_SIZE: usize = 4;

/// Total size of one block on disk.
pub const BLOCK_SIZE: usize = BLOCK_DATA_SIZE + BLOCK_TAIL_SIZE;

/// Size of the data-encryption-key slot in the header.
pub const HEADER_DEK_SIZE: usize = 32;

/// Size of the block-count field that precedes the heap.
const BLOCK_LIST_COUNT_SIZE: u64 = 4;

/// Number of blocks a payload of `size` bytes occupies.
fn blocks_for(size: u64) -> u64 {
    size.div_ceil(BLOCK_DATA_SIZE as u64)
}

/// The container engine.
///
/// Public operations are serialized by the façade, which holds the engine
/// behind a single mutex for the full duration of every call; the engine
/// itself is a plain state machine over the scribe and the in-memory tables.
pub struct Engine {
    scribe: Scribe,
    exists: bool,
    encrypted: bool,
    unlocked: bool,

    // heap state
    block_count: u32,
    block_list_pos: u64,

    // table positions, updated on every rewrite
    tag_table_pos: u64,
    file_table_pos: u64,

    // next auto-increment nonces
    tag_next_nonce: u32,
    file_next_nonce: u32,

    // in-memory graph
    tags: TagTable,
    files: FileTable,
}

impl Engine {
    /// Bind an engine to a container path. No file is opened until a mode is
    /// set; the path is probed so `exists` answers before the first open.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let exists = path.as_ref().exists();
        Engine {
            scribe: Scribe::new(path.as_ref().to_path_buf()),
            exists,
            encrypted: false,
            unlocked: true,
            block_count: 0,
            block_list_pos: 0,
            tag_table_pos: 0,
            file_table_pos: 0,
            tag_next_nonce: 1,
            file_next_nonce: 1,
            tags: TagTable::new(),
            files: FileTable::new(),
        }
    }

    /// Whether the container file exists on disk.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Whether the DEK slot is non-zero.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Whether the container can be operated on. Always true for
    /// unencrypted containers; false for encrypted ones, which this
    /// revision cannot unlock.
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Current operation mode.
    pub fn mode(&self) -> OperationMode {
        self.scribe.mode()
    }

    /// Transition the operation-mode state machine.
    ///
    /// Legal transitions are `Closed -> Read`, `Closed -> Create`,
    /// `Read <-> Edit`, and any mode to `Closed`. Entering `Read` analyzes
    /// the container and rebuilds the in-memory graph; entering `Create`
    /// obliges the caller to `init` next.
    pub fn set_mode(&mut self, mode: OperationMode) -> Result<()> {
        let current = self.scribe.mode();
        if mode == current {
            return Ok(());
        }

        match (current, mode) {
            (_, OperationMode::Closed) => {
                self.scribe.reset();
                Ok(())
            }
            (OperationMode::Closed, OperationMode::Read)
            | (OperationMode::Edit, OperationMode::Read) => {
                self.scribe.set_mode(OperationMode::Read)?;
                match self.analyze() {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        // never stay open over a container that didn't load
                        self.scribe.reset();
                        Err(err)
                    }
                }
            }
            (OperationMode::Closed, OperationMode::Create) => {
                self.scribe.set_mode(OperationMode::Create)
            }
            (OperationMode::Read, OperationMode::Edit) => {
                self.scribe.set_mode(OperationMode::Edit)
            }
            (actual, OperationMode::Edit) => Err(TfcError::WrongMode {
                required: OperationMode::Read,
                actual,
            }),
            (actual, _) => Err(TfcError::WrongMode {
                required: OperationMode::Closed,
                actual,
            }),
        }
    }

    /// Write out the structure of an empty container, overwriting all data.
    ///
    /// `Create` mode only. A fresh container is 60 bytes: header, zero
    /// blocks, and both tables empty with next-nonces at 1.
    pub fn init(&mut self) -> Result<()> {
        self.require_mode(OperationMode::Create)?;
        self.scribe.set_cursor_pos(0)?;

        self.scribe.write_u32(MAGIC_NUMBER)?;
        self.scribe.write_u32(CONTAINER_VERSION)?;
        self.scribe.write_bytes(&[0u8; HEADER_DEK_SIZE])?;

        // block list: count only, no blocks yet
        self.scribe.write_u32(0)?;

        // tag table: next nonce 1, zero tags
        self.scribe.write_u32(1)?;
        self.scribe.write_u32(0)?;

        // file table: next nonce 1, zero files
        self.scribe.write_u32(1)?;
        self.scribe.write_u32(0)?;

        self.scribe.flush()?;
        self.exists = true;
        debug!(path = %self.scribe.path().display(), "initialized empty container");
        Ok(())
    }

    /// Parse the container and rebuild the in-memory graph.
    ///
    /// Runs on every transition into `Read`. Verifies the magic number and
    /// version, detects the encryption state, locates every section, and
    /// loads both tables with their bidirectional links resolved.
    fn analyze(&mut self) -> Result<()> {
        self.scribe.set_cursor_pos(0)?;

        // header
        let magic = self.scribe.read_u32()?;
        if magic != MAGIC_NUMBER {
            return Err(TfcError::BadMagic);
        }
        let version = self.scribe.read_u32()?;
        if version > CONTAINER_VERSION {
            return Err(TfcError::UnsupportedVersion(version));
        }
        let mut dek = [0u8; HEADER_DEK_SIZE];
        self.scribe.read_bytes(&mut dek)?;
        self.encrypted = dek.iter().any(|&byte| byte != 0);
        self.unlocked = !self.encrypted;

        // block list: remember where it starts, then step over the heap
        self.block_list_pos = self.scribe.cursor_pos();
        self.block_count = self.scribe.read_u32()?;
        self.scribe
            .skip(self.block_count as u64 * BLOCK_SIZE as u64)?;

        // tag table
        self.tag_table_pos = self.scribe.cursor_pos();
        self.tag_next_nonce = self.scribe.read_u32()?;
        let tag_count = self.scribe.read_u32()?;
        self.tags = TagTable::new();
        for _ in 0..tag_count {
            let nonce = self.scribe.read_u32()?;
            let name = self.scribe.read_string()?;
            self.tags.add(TagRecord::new(nonce, name));
        }

        // file table
        self.file_table_pos = self.scribe.cursor_pos();
        self.file_next_nonce = self.scribe.read_u32()?;
        let file_count = self.scribe.read_u32()?;
        self.files = FileTable::new();
        for _ in 0..file_count {
            let nonce = self.scribe.read_u32()?;
            let name = self.scribe.read_string()?;
            let hash = self.scribe.read_u64()?;
            let start_block = self.scribe.read_u64()? as u32;
            let size = self.scribe.read_u64()?;
            let mut record = FileRecord::new(nonce, name, hash, start_block, size);

            let file_tag_count = self.scribe.read_u32()?;
            for _ in 0..file_tag_count {
                let tag_nonce = self.scribe.read_u32()?;
                match self.tags.get_mut(tag_nonce) {
                    Some(tag) => {
                        // link both directions
                        tag.attach(nonce);
                        record.attach(tag_nonce);
                    }
                    // tolerate entries naming tags the table doesn't have
                    None => warn!(file = nonce, tag = tag_nonce, "dropping unknown tag nonce"),
                }
            }

            self.files.add(record);
        }

        self.exists = true;
        debug!(
            blocks = self.block_count,
            tags = self.tags.len(),
            files = self.files.len(),
            "analyzed container"
        );
        Ok(())
    }

    /// Store a payload and return the nonce assigned to it.
    ///
    /// `Edit` mode only. Fills free blocks first (a free block is entirely
    /// zero), appending new blocks once the heap is exhausted, then rewrites
    /// both tables after the possibly-grown heap.
    pub fn add_blob(&mut self, name: &str, bytes: &[u8]) -> Result<u32> {
        self.require_unlocked()?;
        self.require_mode(OperationMode::Edit)?;
        if name.contains('\0') {
            return Err(TfcError::InvalidArgument(
                "file names cannot contain NUL bytes".to_string(),
            ));
        }

        let data_start = self.block_list_pos + BLOCK_LIST_COUNT_SIZE;
        let mut remaining = bytes.len();
        let mut offset = 0usize;
        let mut start_block = 0u32;
        let mut prev_tail_pos: Option<u64> = None;
        let mut scan_from = 0u32;
        let mut first = true;

        while remaining > 0 {
            let index = self.select_block(data_start, scan_from)?;
            if first {
                start_block = index;
                first = false;
            }

            // appending: patch the block count in the header first
            if index >= self.block_count {
                self.block_count = index + 1;
                self.scribe.set_cursor_pos(self.block_list_pos)?;
                self.scribe.write_u32(self.block_count)?;
            }

            // write the whole block in one shot: zero-padded payload plus a
            // zero tail, to be patched when the next block is selected
            let chunk = remaining.min(BLOCK_DATA_SIZE);
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk].copy_from_slice(&bytes[offset..offset + chunk]);
            let block_pos = data_start + index as u64 * BLOCK_SIZE as u64;
            self.scribe.set_cursor_pos(block_pos)?;
            self.scribe.write_bytes(&block)?;

            // chain the previous block to this one
            if let Some(tail_pos) = prev_tail_pos {
                self.scribe.set_cursor_pos(tail_pos)?;
                self.scribe.write_u32(index)?;
            }
            prev_tail_pos = Some(block_pos + BLOCK_DATA_SIZE as u64);

            offset += chunk;
            remaining -= chunk;
            scan_from = index + 1;
        }

        // the heap may have grown, shifting both tables
        self.tag_table_pos = data_start + self.block_count as u64 * BLOCK_SIZE as u64;
        self.scribe.set_cursor_pos(self.tag_table_pos)?;
        self.write_tag_table()?;

        let nonce = self.file_next_nonce;
        self.file_next_nonce += 1;
        let record = FileRecord::new(
            nonce,
            name.to_string(),
            digest(bytes),
            start_block,
            bytes.len() as u64,
        );
        self.files.add(record);
        self.write_file_table()?;

        self.scribe.flush()?;
        debug!(
            nonce,
            size = bytes.len(),
            start_block,
            blocks = self.block_count,
            "stored payload"
        );
        Ok(nonce)
    }

    /// Attach a tag to a file, creating the tag if it does not exist.
    ///
    /// `Edit` mode only. The tag name is folded to lowercase before lookup.
    pub fn attach_tag(&mut self, nonce: u32, tag_name: &str) -> Result<()> {
        self.require_unlocked()?;
        self.require_mode(OperationMode::Edit)?;
        if tag_name.contains('\0') {
            return Err(TfcError::InvalidArgument(
                "tag names cannot contain NUL bytes".to_string(),
            ));
        }

        let folded = tag_name.to_lowercase();

        if self.files.get(nonce).is_none() {
            return Err(TfcError::NoSuchBlob(nonce));
        }

        let (tag_nonce, created) = match self.tags.get_by_name(&folded).map(TagRecord::nonce) {
            Some(existing) => {
                let file = self.files.get(nonce).ok_or(TfcError::NoSuchBlob(nonce))?;
                if file.tags().contains(&existing) {
                    return Err(TfcError::AlreadyTagged {
                        nonce,
                        tag: folded,
                    });
                }
                (existing, false)
            }
            None => {
                // tags are born lazily on first attach
                let allocated = self.tag_next_nonce;
                self.tag_next_nonce += 1;
                self.tags.add(TagRecord::new(allocated, folded.clone()));
                debug!(tag = %folded, nonce = allocated, "created tag");
                (allocated, true)
            }
        };

        // link both directions
        if let Some(file) = self.files.get_mut(nonce) {
            file.attach(tag_nonce);
        }
        if let Some(tag) = self.tags.get_mut(tag_nonce) {
            tag.attach(nonce);
        }

        // a new tag grows the tag table, shifting the file table behind it
        if created {
            self.scribe.set_cursor_pos(self.tag_table_pos)?;
            self.write_tag_table()?;
        } else {
            self.scribe.set_cursor_pos(self.file_table_pos)?;
        }
        self.write_file_table()?;

        self.scribe.flush()?;
        Ok(())
    }

    /// Delete a file, freeing its blocks for reuse.
    ///
    /// `Edit` mode only. Every block of the chain is zeroed in a single
    /// pass. Tags left with no files are removed from the container.
    pub fn delete_blob(&mut self, nonce: u32) -> Result<()> {
        self.require_unlocked()?;
        self.require_mode(OperationMode::Edit)?;

        let record = self
            .files
            .get(nonce)
            .cloned()
            .ok_or(TfcError::NoSuchBlob(nonce))?;

        // zero the chain; the blocks become free for the next add
        let data_start = self.block_list_pos + BLOCK_LIST_COUNT_SIZE;
        let zero = [0u8; BLOCK_SIZE];
        let mut index = record.start_block();
        let mut left = blocks_for(record.size());
        while left > 0 {
            let block_pos = data_start + index as u64 * BLOCK_SIZE as u64;
            self.scribe
                .set_cursor_pos(block_pos + BLOCK_DATA_SIZE as u64)?;
            let next = self.scribe.read_u32()?;
            self.scribe.set_cursor_pos(block_pos)?;
            self.scribe.write_bytes(&zero)?;
            left -= 1;
            if left > 0 {
                if next == 0 {
                    break;
                }
                index = next;
            }
        }

        // detach from every tag, collecting the ones the delete empties
        let mut tag_died = false;
        for tag_nonce in record.tags() {
            let emptied = match self.tags.get_mut(*tag_nonce) {
                Some(tag) => {
                    tag.detach(nonce);
                    tag.files().is_empty()
                }
                None => false,
            };
            if emptied {
                self.tags.remove(*tag_nonce);
                tag_died = true;
            }
        }
        self.files.remove(nonce);

        if tag_died {
            self.scribe.set_cursor_pos(self.tag_table_pos)?;
            self.write_tag_table()?;
        } else {
            self.scribe.set_cursor_pos(self.file_table_pos)?;
        }
        self.write_file_table()?;

        self.scribe.flush()?;
        debug!(nonce, "deleted payload");
        Ok(())
    }

    /// Read a file's payload and metadata.
    ///
    /// `Read` mode only. Streams the block chain through the scribe until
    /// `size` bytes are assembled, stopping early on a zero tail.
    pub fn read_blob(&mut self, nonce: u32) -> Result<Blob> {
        self.require_mode(OperationMode::Read)?;

        let record = self
            .files
            .get(nonce)
            .cloned()
            .ok_or(TfcError::NoSuchBlob(nonce))?;

        let data_start = self.block_list_pos + BLOCK_LIST_COUNT_SIZE;
        let mut data = Vec::with_capacity(record.size() as usize);
        let mut remaining = record.size();
        let mut index = record.start_block();
        let mut buf = [0u8; BLOCK_DATA_SIZE];
        while remaining > 0 {
            self.scribe
                .set_cursor_pos(data_start + index as u64 * BLOCK_SIZE as u64)?;
            self.scribe.read_bytes(&mut buf)?;
            let take = remaining.min(BLOCK_DATA_SIZE as u64) as usize;
            data.extend_from_slice(&buf[..take]);
            remaining -= take as u64;
            if remaining > 0 {
                let next = self.scribe.read_u32()?;
                if next == 0 {
                    // chain ended before the recorded size was reached
                    break;
                }
                index = next;
            }
        }

        let info = self.file_info(&record);
        Ok(Blob { info, data })
    }

    /// List every file, ascending by nonce.
    pub fn list_blobs(&self) -> Result<Vec<FileInfo>> {
        self.require_mode(OperationMode::Read)?;
        Ok(self.files.iter().map(|record| self.file_info(record)).collect())
    }

    /// List every tag, ascending by name.
    pub fn list_tags(&self) -> Result<Vec<TagInfo>> {
        self.require_mode(OperationMode::Read)?;
        Ok(self
            .tags
            .iter_by_name()
            .map(|tag| TagInfo {
                nonce: tag.nonce(),
                name: tag.name().to_string(),
                file_count: tag.files().len(),
            })
            .collect())
    }

    /// Find the files carrying every one of the given tags.
    ///
    /// `Read` mode only. Names are folded before lookup; an unknown name
    /// fails the whole search. Results come back ascending by nonce.
    pub fn intersection<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<FileInfo>> {
        self.require_mode(OperationMode::Read)?;

        // resolve the search set
        let mut search: BTreeSet<u32> = BTreeSet::new();
        for name in names {
            let folded = name.as_ref().to_lowercase();
            let tag = self
                .tags
                .get_by_name(&folded)
                .ok_or(TfcError::NoSuchTag(folded))?;
            search.insert(tag.nonce());
        }

        // union of all files carrying at least one searched tag
        let mut union: BTreeSet<u32> = BTreeSet::new();
        for tag_nonce in &search {
            if let Some(tag) = self.tags.get(*tag_nonce) {
                union.extend(tag.files().iter().copied());
            }
        }

        // a file qualifies when it carries every searched tag
        let mut result = Vec::new();
        for file_nonce in union {
            if let Some(file) = self.files.get(file_nonce) {
                if search.intersection(file.tags()).count() == search.len() {
                    result.push(self.file_info(file));
                }
            }
        }
        Ok(result)
    }

    /// Snapshot a record for the public API, resolving tag names.
    fn file_info(&self, record: &FileRecord) -> FileInfo {
        let mut tags: Vec<String> = record
            .tags()
            .iter()
            .filter_map(|nonce| self.tags.get(*nonce))
            .map(|tag| tag.name().to_string())
            .collect();
        tags.sort();
        FileInfo {
            nonce: record.nonce(),
            name: record.name().to_string(),
            hash: record.hash(),
            size: record.size(),
            tags,
        }
    }

    /// Scan forward from `from` for a free (all-zero) block; past the heap's
    /// end, the next index to append at.
    fn select_block(&mut self, data_start: u64, from: u32) -> Result<u32> {
        let mut buf = [0u8; BLOCK_SIZE];
        for index in from..self.block_count {
            self.scribe
                .set_cursor_pos(data_start + index as u64 * BLOCK_SIZE as u64)?;
            self.scribe.read_bytes(&mut buf)?;
            if buf.iter().all(|&byte| byte == 0) {
                return Ok(index);
            }
        }
        Ok(self.block_count)
    }

    fn require_mode(&self, required: OperationMode) -> Result<()> {
        let actual = self.scribe.mode();
        if actual != required {
            return Err(TfcError::WrongMode { required, actual });
        }
        Ok(())
    }

    fn require_unlocked(&self) -> Result<()> {
        if self.encrypted && !self.unlocked {
            return Err(TfcError::EncryptedLocked);
        }
        Ok(())
    }

    /// Write the tag table at the current cursor and remember its position.
    fn write_tag_table(&mut self) -> Result<()> {
        self.tag_table_pos = self.scribe.cursor_pos();
        self.scribe.write_u32(self.tag_next_nonce)?;
        self.scribe.write_u32(self.tags.len() as u32)?;
        // collect first: the scribe borrow conflicts with the table iterator
        let entries: Vec<(u32, String)> = self
            .tags
            .iter_by_nonce()
            .map(|tag| (tag.nonce(), tag.name().to_string()))
            .collect();
        for (nonce, name) in entries {
            self.scribe.write_u32(nonce)?;
            self.scribe.write_string(&name)?;
        }
        Ok(())
    }

    /// Write the file table at the current cursor and remember its position.
    fn write_file_table(&mut self) -> Result<()> {
        self.file_table_pos = self.scribe.cursor_pos();
        self.scribe.write_u32(self.file_next_nonce)?;
        self.scribe.write_u32(self.files.len() as u32)?;
        let entries: Vec<FileRecord> = self.files.iter().cloned().collect();
        for record in entries {
            self.scribe.write_u32(record.nonce())?;
            self.scribe.write_string(record.name())?;
            self.scribe.write_u64(record.hash())?;
            self.scribe.write_u64(record.start_block() as u64)?;
            self.scribe.write_u64(record.size())?;
            self.scribe.write_u32(record.tags().len() as u32)?;
            for tag_nonce in record.tags() {
                self.scribe.write_u32(*tag_nonce)?;
            }
        }
        Ok(())
    }
}
