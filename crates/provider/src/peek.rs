//! Bounded look-ahead over a reader for content sniffing.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Read;

/// Buffers the head of a [`Read`]er so it can be sniffed, growing the buffer
/// only when a larger prefix is asked for.
pub struct PeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
    exhausted: bool,
}

impl<R: Read> PeekableReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new(), exhausted: false }
    }

    /// Read up to `limit` bytes from the start of the stream.
    ///
    /// Successive calls do not accumulate:
    /// - `peek(4*1024)` buffers 4KiB and returns 4KiB
    /// - `peek(8*1024)` buffers another 4KiB and returns 8KiB
    /// - `peek(2*1024)` returns 2KiB straight from the buffer
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() < limit && !self.exhausted {
            let needed = (limit - self.buffer.len()) as u64;
            let read = (&mut self.inner).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
            self.exhausted = (read as u64) < needed;
        }
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Everything buffered so far.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    /// Whether the underlying reader has hit end of stream.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DATA: &[u8] = b"GIF89a followed by enough bytes to need more than one peek";

    #[test]
    fn test_peek_grows_on_demand() {
        let mut peekable = PeekableReader::new(Cursor::new(DATA));
        assert_eq!(peekable.peek(6).unwrap(), b"GIF89a");
        assert_eq!(peekable.head().len(), 6);
        assert_eq!(peekable.peek(15).unwrap(), b"GIF89a followed");
        assert_eq!(peekable.peek(3).unwrap(), b"GIF");
        assert_eq!(peekable.head().len(), 15);
        assert!(!peekable.is_exhausted());
    }

    #[test]
    fn test_peek_past_end() {
        let mut peekable = PeekableReader::new(Cursor::new(b"tiny"));
        assert_eq!(peekable.peek(1000).unwrap(), b"tiny");
        assert!(peekable.is_exhausted());
        assert_eq!(peekable.peek(2000).unwrap(), b"tiny");
    }

    #[test]
    fn test_empty_input() {
        let mut peekable = PeekableReader::new(std::io::empty());
        assert!(peekable.peek(100).unwrap().is_empty());
    }

    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn test_read_error() {
        let err = PeekableReader::new(Broken).peek(10).unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }
}
