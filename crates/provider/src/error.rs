//! Provider Error Types
//!
//! Classification itself never fails: broken layers are logged and skipped.
//! These errors only cover reading the file or stream being classified.

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file to classify does not exist.
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Reading the file or stream failed; the `io::Error` is kept as a child.
    #[display("I/O error")]
    Io,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::NotFound(PathBuf::from("/missing")).to_string(), "file not found: /missing");
        assert_eq!(ErrorKind::Io.to_string(), "I/O error");
    }
}
