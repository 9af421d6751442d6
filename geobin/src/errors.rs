//! Error types shared by every layer of the crate.

use std::io;
use thiserror::Error;

/// Errors raised while encoding, decoding, indexing, reading or writing a layer.
#[derive(Debug, Error)]
pub enum GeobinError {
    /// Malformed, truncated or inconsistent bytes (header, tree or feature).
    #[error("Corrupt data: {0}")]
    CorruptData(String),

    /// Seek, read, write or stat failure on the underlying store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A buffer could not grow to the requested size.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The caller violated a precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl GeobinError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        GeobinError::CorruptData(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        GeobinError::InvalidArgument(msg.into())
    }

    /// Maps a short read inside a structure to `CorruptData`, keeping
    /// every other I/O failure as `Io`.
    pub fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            GeobinError::CorruptData(format!("unexpected end of data while reading {}", what))
        } else {
            GeobinError::Io(err)
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, GeobinError::CorruptData(_))
    }
}

/// Result type for geobin operations
pub type GeobinResult<T> = Result<T, GeobinError>;
