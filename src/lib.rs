//! # TFC - Tagged File Containers
//!
//! `tfc` stores many opaque byte streams in a single container file, together
//! with a tag graph that lets callers list, search, and retrieve streams by
//! the intersection of arbitrary tag sets.
//!
//! A container is self-describing (magic number, version, reserved
//! data-encryption-key slot) and internally partitioned into a heap of
//! fixed-size blocks plus two small tables that index it. Payloads are
//! chained across 512-byte blocks, freed blocks are reused in place, and the
//! tag/file tables are rewritten in full on every mutation so the on-disk
//! counts never drift from memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tfc::{OperationMode, Result, Tfc};
//!
//! # fn main() -> Result<()> {
//! let container = Tfc::open("photos.tfc");
//!
//! // Create an empty container
//! container.set_mode(OperationMode::Create)?;
//! container.init()?;
//! container.set_mode(OperationMode::Closed)?;
//!
//! // Store a payload and tag it
//! container.set_mode(OperationMode::Read)?;
//! container.set_mode(OperationMode::Edit)?;
//! let nonce = container.add_blob("cat.png", b"...image bytes...")?;
//! container.attach_tag(nonce, "Cute")?;
//! container.attach_tag(nonce, "Cat")?;
//!
//! // Search by tag intersection
//! container.set_mode(OperationMode::Read)?;
//! for file in container.intersection(&["cute", "cat"])? {
//!     println!("{}: {}", file.nonce, file.name);
//! }
//! container.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Operation modes
//!
//! The container is a mode state machine: `Closed -> Read`,
//! `Closed -> Create`, `Read <-> Edit`, and any mode back to `Closed`.
//! Entering `Read` parses the file and rebuilds the in-memory graph;
//! `Create` is only for initializing a new container. Mutations require
//! `Edit`; listings, searches, and payload reads require `Read`. Operations
//! invoked in the wrong mode fail with [`TfcError::WrongMode`].
//!
//! Encryption-at-rest is reserved but not implemented: a container whose DEK
//! slot is non-zero is reported as encrypted and refuses every mutation with
//! [`TfcError::EncryptedLocked`].

pub mod core;

pub use crate::core::error::{Result, TfcError};
pub use crate::core::record::{Blob, FileInfo, TagInfo};
pub use crate::core::scribe::OperationMode;

use crate::core::engine::Engine;
use parking_lot::Mutex;
use std::path::Path;

/// A tagged file container.
///
/// `Tfc` is the narrow operation surface that front-ends (shells, library
/// consumers) build on. Every operation acquires the engine's single
/// operation lock for its full duration, so a `Tfc` can be shared freely
/// across threads and callers observe a linearizable operation sequence.
pub struct Tfc {
    engine: Mutex<Engine>,
}

impl Tfc {
    /// Bind a container at the given path.
    ///
    /// No file is opened or created until a mode is set; use
    /// [`exists`](Self::exists) to probe for a container on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Tfc {
            engine: Mutex::new(Engine::new(path)),
        }
    }

    /// Whether the container file exists on disk.
    pub fn exists(&self) -> bool {
        self.engine.lock().exists()
    }

    /// Whether the container's DEK slot is non-zero.
    pub fn is_encrypted(&self) -> bool {
        self.engine.lock().is_encrypted()
    }

    /// Whether the container can be mutated. Always true for unencrypted
    /// containers; false for encrypted ones, which this revision cannot
    /// unlock.
    pub fn is_unlocked(&self) -> bool {
        self.engine.lock().is_unlocked()
    }

    /// Current operation mode.
    pub fn mode(&self) -> OperationMode {
        self.engine.lock().mode()
    }

    /// Transition the container's operation mode.
    ///
    /// Entering [`OperationMode::Read`] analyzes the container file and
    /// rebuilds the in-memory graph; entering [`OperationMode::Create`]
    /// truncates and obliges the caller to [`init`](Self::init) next.
    pub fn set_mode(&self, mode: OperationMode) -> Result<()> {
        self.engine.lock().set_mode(mode)
    }

    /// Close the container stream.
    pub fn close(&self) -> Result<()> {
        self.engine.lock().set_mode(OperationMode::Closed)
    }

    /// Write out an empty container. Requires `Create` mode.
    pub fn init(&self) -> Result<()> {
        self.engine.lock().init()
    }

    /// Store a payload under a display name; returns its assigned nonce.
    /// Requires `Edit` mode.
    pub fn add_blob(&self, name: &str, bytes: &[u8]) -> Result<u32> {
        self.engine.lock().add_blob(name, bytes)
    }

    /// Delete a stored payload, freeing its blocks for reuse. Tags left
    /// without files are removed. Requires `Edit` mode.
    pub fn delete_blob(&self, nonce: u32) -> Result<()> {
        self.engine.lock().delete_blob(nonce)
    }

    /// Attach a tag (case-insensitive) to a file, creating the tag if
    /// needed. Requires `Edit` mode.
    pub fn attach_tag(&self, nonce: u32, tag_name: &str) -> Result<()> {
        self.engine.lock().attach_tag(nonce, tag_name)
    }

    /// Read a stored payload and its metadata. Requires `Read` mode.
    pub fn read_blob(&self, nonce: u32) -> Result<Blob> {
        self.engine.lock().read_blob(nonce)
    }

    /// List every stored file, ascending by nonce. Requires `Read` mode.
    pub fn list_blobs(&self) -> Result<Vec<FileInfo>> {
        self.engine.lock().list_blobs()
    }

    /// List every tag, ascending by name. Requires `Read` mode.
    pub fn list_tags(&self) -> Result<Vec<TagInfo>> {
        self.engine.lock().list_tags()
    }

    /// Find the files carrying every one of the given tags, ascending by
    /// nonce. Requires `Read` mode.
    pub fn intersection<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<FileInfo>> {
        self.engine.lock().intersection(names)
    }
}
