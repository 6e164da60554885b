//! Core container implementation
//!
//! The engine and its supporting layers: byte I/O ([`scribe`]), the record
//! arena ([`record`], [`table`]), the payload digest ([`digest`]), the
//! on-disk format and operations ([`engine`]), and the error model
//! ([`error`]). Front-ends talk to [`crate::Tfc`] instead of these modules.

pub mod digest;
pub mod engine;
pub mod error;
pub mod record;
pub mod scribe;
pub mod table;

pub use engine::Engine;
pub use error::{Result, TfcError};
pub use record::{Blob, FileInfo, FileRecord, TagInfo, TagRecord};
pub use scribe::{OperationMode, Scribe};
pub use table::{FileTable, TagTable};
