//! Cache Format Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache format error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache format operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cache file does not exist; the layer is simply empty.
    #[display("cache file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Underlying I/O error (the `io::Error` is kept as a child in the error tree).
    #[display("I/O error")]
    Io,
    /// The header does not describe a MIME cache at all.
    #[display("not a MIME cache: implausible header")]
    BadMagic,
    /// A cache written by an incompatible generator.
    #[display("unsupported cache version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    /// The file ends before a table it declares.
    #[display("truncated cache: {needed} bytes needed but only {len} available")]
    Truncated { needed: usize, len: usize },
    /// A single record points somewhere it should not.
    #[display("malformed cache: {_0}")]
    BadFormat(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if the cache should be considered permanently unusable
    /// until the file on disk changes.
    pub fn invalidates_cache(&self) -> bool {
        !matches!(self, ErrorKind::NotFound(_) | ErrorKind::Io)
    }
}
