//! Byte-level I/O over the container file
//!
//! The scribe owns the file handle and exposes position/read/write primitives
//! for the integer and string encodings the container format uses. All
//! multi-byte integers are big-endian; strings are UTF-8 terminated by a
//! single 0x00 byte, with no length prefix.

use crate::core::error::{Result, TfcError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Operation mode of the container stream.
///
/// The mode gates which primitives are usable: `Read` is a readonly stream,
/// `Create` truncates and writes a new file, `Edit` opens an existing file
/// for reading and writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// No stream is open.
    Closed,
    /// Readonly stream over an existing file.
    Read,
    /// Truncating write-only stream for a new file.
    Create,
    /// Read/write stream over an existing file.
    Edit,
}

impl std::fmt::Display for OperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationMode::Closed => write!(f, "CLOSED"),
            OperationMode::Read => write!(f, "READ"),
            OperationMode::Create => write!(f, "CREATE"),
            OperationMode::Edit => write!(f, "EDIT"),
        }
    }
}

/// Positioned reader/writer over the container file.
pub struct Scribe {
    path: PathBuf,
    mode: OperationMode,
    file: Option<File>,
    pos: u64,
}

impl Scribe {
    /// Create a scribe bound to a path. No file is opened until a mode is set.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Scribe {
            path: path.into(),
            mode: OperationMode::Closed,
            file: None,
            pos: 0,
        }
    }

    /// Path of the container file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current operation mode.
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    /// Current cursor position, in bytes from the start of the file.
    pub fn cursor_pos(&self) -> u64 {
        self.pos
    }

    /// Switch the stream to a new operation mode.
    ///
    /// Transitioning to any non-`Closed` mode while a stream is open closes
    /// and reopens the underlying handle. Failing to open the file surfaces
    /// an I/O failure.
    pub fn set_mode(&mut self, mode: OperationMode) -> Result<()> {
        if self.mode != OperationMode::Closed {
            self.reset();
        }

        let opened = match mode {
            OperationMode::Closed => return Ok(()),
            OperationMode::Read => OpenOptions::new().read(true).open(&self.path),
            OperationMode::Create => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path),
            OperationMode::Edit => OpenOptions::new().read(true).write(true).open(&self.path),
        };

        match opened {
            Ok(file) => {
                self.file = Some(file);
                self.mode = mode;
                self.pos = 0;
                Ok(())
            }
            Err(source) => Err(TfcError::Io {
                context: format!("opening container for {mode}"),
                position: 0,
                source,
            }),
        }
    }

    /// Close the stream and return to `Closed` mode.
    pub fn reset(&mut self) {
        self.file = None;
        self.mode = OperationMode::Closed;
        self.pos = 0;
    }

    /// Move the cursor to an absolute byte position.
    pub fn set_cursor_pos(&mut self, pos: u64) -> Result<()> {
        let current = self.pos;
        self.file_mut(current)?
            .seek(SeekFrom::Start(pos))
            .map_err(|source| Self::failure("seeking", current, source))?;
        self.pos = pos;
        Ok(())
    }

    /// Move the cursor forward by `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<()> {
        self.set_cursor_pos(self.pos + len)
    }

    /// Read exactly `buf.len()` bytes at the cursor. Short reads fail.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf, "reading bytes")
    }

    /// Read a big-endian u32 at the cursor.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, "reading uint32")?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a big-endian u64 at the cursor.
    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf, "reading uint64")?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Read a null-terminated UTF-8 string at the cursor.
    ///
    /// Consumes bytes up to and including the terminator; the terminator is
    /// not part of the returned string.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let mut bytes = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.read_exact(&mut byte, "reading string")?;
            if byte[0] == 0x00 {
                break;
            }
            bytes.push(byte[0]);
        }
        String::from_utf8(bytes).map_err(|err| TfcError::Io {
            context: "decoding string".to_string(),
            position: start,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, err),
        })
    }

    /// Write a buffer at the cursor.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf, "writing bytes")
    }

    /// Write a big-endian u32 at the cursor.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_be_bytes(), "writing uint32")
    }

    /// Write a big-endian u64 at the cursor.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_be_bytes(), "writing uint64")
    }

    /// Write a string as UTF-8 bytes followed by a 0x00 terminator.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_all(value.as_bytes(), "writing string")?;
        self.write_all(&[0x00], "writing string")
    }

    /// Flush buffered writes to the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        let pos = self.pos;
        self.file_mut(pos)?
            .flush()
            .map_err(|source| Self::failure("flushing", pos, source))
    }

    fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        let pos = self.pos;
        self.file_mut(pos)?
            .read_exact(buf)
            .map_err(|source| Self::failure(context, pos, source))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8], context: &'static str) -> Result<()> {
        let pos = self.pos;
        self.file_mut(pos)?
            .write_all(buf)
            .map_err(|source| Self::failure(context, pos, source))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn file_mut(&mut self, pos: u64) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| TfcError::Io {
            context: "accessing stream".to_string(),
            position: pos,
            source: std::io::Error::new(std::io::ErrorKind::NotConnected, "container is not open"),
        })
    }

    fn failure(context: &str, position: u64, source: std::io::Error) -> TfcError {
        TfcError::Io {
            context: context.to_string(),
            position,
            source,
        }
    }
}
