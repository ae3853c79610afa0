//! Bounds-checked big-endian access into cache bytes.
//!
//! Every read either stays inside the buffer or fails with
//! [`ErrorKind::BadFormat`]; nothing in this crate indexes cache bytes
//! directly.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};

/// A cheap, copyable view over cache bytes.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
}
impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let data = self.data;
        offset
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .map(|end| &data[offset..end])
            .ok_or_raise(|| {
                ErrorKind::BadFormat(format!("{len} bytes at offset {offset} run past end of cache ({})", data.len()))
            })
    }

    #[inline]
    pub fn u16(&self, offset: usize) -> Result<u16> {
        let bytes = self.bytes(offset, 2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    #[inline]
    pub fn u32(&self, offset: usize) -> Result<u32> {
        let bytes = self.bytes(offset, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 32-bit offset field.
    #[inline]
    pub fn offset(&self, offset: usize) -> Result<usize> {
        Ok(self.u32(offset)? as usize)
    }

    /// Read the NUL-terminated UTF-8 string that starts at `offset`.
    pub fn str(&self, offset: usize) -> Result<&'a str> {
        let data = self.data;
        let tail = data
            .get(offset..)
            .ok_or_raise(|| ErrorKind::BadFormat(format!("string offset {offset} is past end of cache")))?;
        let end = memchr::memchr(0, tail)
            .ok_or_raise(|| ErrorKind::BadFormat(format!("unterminated string at offset {offset}")))?;
        std::str::from_utf8(&tail[..end])
            .or_raise(|| ErrorKind::BadFormat(format!("string at offset {offset} is not UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const DATA: &[u8] = b"\x00\x01\x00\x00\x00\x2ahello\x00bad\xff\x00open";

    #[test]
    fn test_integers_are_big_endian() {
        let reader = Reader::new(DATA);
        assert_eq!(reader.u16(0).unwrap(), 1);
        assert_eq!(reader.u32(2).unwrap(), 42);
        assert_eq!(reader.offset(2).unwrap(), 42);
    }

    #[test]
    fn test_string() {
        let reader = Reader::new(DATA);
        assert_eq!(reader.str(6).unwrap(), "hello");
        assert_eq!(reader.str(10).unwrap(), "o");
        assert_eq!(reader.str(11).unwrap(), "");
    }

    #[rstest]
    #[case::past_end(DATA.len() + 1)]
    #[case::invalid_utf8(12)]
    #[case::unterminated(17)]
    fn test_string_errors(#[case] offset: usize) {
        let err = Reader::new(DATA).str(offset).unwrap_err();
        assert!(matches!(&*err, ErrorKind::BadFormat(_)));
    }

    #[rstest]
    #[case(DATA.len() - 1, 2)]
    #[case(usize::MAX, 4)]
    fn test_out_of_bounds(#[case] offset: usize, #[case] len: usize) {
        let err = Reader::new(DATA).bytes(offset, len).unwrap_err();
        assert!(matches!(&*err, ErrorKind::BadFormat(_)));
    }
}
