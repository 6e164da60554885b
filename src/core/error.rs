//! Error types for container operations

use crate::core::scribe::OperationMode;
use thiserror::Error;

/// The error type surfaced by every public container operation.
#[derive(Error, Debug)]
pub enum TfcError {
    /// Operation invoked while the container is in an incompatible mode.
    #[error("container is in {actual} mode, operation requires {required}")]
    WrongMode {
        /// Mode the operation requires.
        required: OperationMode,
        /// Mode the container is actually in.
        actual: OperationMode,
    },

    /// Underlying stream read/write failed; carries the cursor position.
    #[error("I/O failure {context} at position {position}")]
    Io {
        /// What the engine was doing when the stream failed.
        context: String,
        /// Cursor position at the time of the failure.
        position: u64,
        /// The underlying stream error.
        #[source]
        source: std::io::Error,
    },

    /// Magic number mismatch on open - not a container file.
    #[error("not a valid container file, magic number does not match")]
    BadMagic,

    /// Container was written by a newer implementation.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),

    /// Container is marked encrypted but has not been unlocked; mutations refused.
    #[error("container is encrypted and locked")]
    EncryptedLocked,

    /// Referenced file nonce is absent from the file table.
    #[error("no file was found with ID {0}")]
    NoSuchBlob(u32),

    /// Referenced tag name is absent from the tag table.
    #[error("{0} is not a tag")]
    NoSuchTag(String),

    /// Tag is already linked to the given file.
    #[error("tag {tag:?} is already attached to file {nonce}")]
    AlreadyTagged {
        /// Nonce of the file the tag was being attached to.
        nonce: u32,
        /// Folded tag name.
        tag: String,
    },

    /// Malformed caller input, e.g. a negative nonce from the CLI layer.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A convenience `Result` type for container operations.
pub type Result<T> = std::result::Result<T, TfcError>;
