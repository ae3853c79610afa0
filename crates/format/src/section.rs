//! Typed views over the section tables of a cache file.
//!
//! A [`Section`] is a bounds-checked table of fixed-size records. Creating
//! one validates that the whole table lies inside the file; reading an
//! individual record validates whatever that record points at (strings,
//! nested tables, magic values). Callers that walk a section are expected
//! to skip records that fail to read rather than abandon the section.

use crate::error::{ErrorKind, Result};
use crate::reader::Reader;
use crate::{CASE_SENSITIVE_FLAG, WEIGHT_MASK};
use exn::OptionExt;
use std::fmt;
use std::marker::PhantomData;

/// A fixed-size entry in a section table.
pub trait Record<'a>: Sized {
    /// Size of one entry in bytes.
    const SIZE: usize;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self>;
}

/// A table of `len()` records of type `T`.
pub struct Section<'a, T> {
    reader: Reader<'a>,
    start: usize,
    count: usize,
    _record: PhantomData<fn() -> T>,
}
impl<'a, T: Record<'a>> Section<'a, T> {
    /// A table of `count` records beginning at `start`.
    pub fn at(reader: Reader<'a>, start: usize, count: usize) -> Result<Self> {
        let needed = count
            .checked_mul(T::SIZE)
            .and_then(|size| size.checked_add(start))
            .ok_or_raise(|| ErrorKind::BadFormat(format!("table of {count} records at offset {start} overflows")))?;
        if needed > reader.len() {
            exn::bail!(ErrorKind::Truncated { needed, len: reader.len() });
        }
        Ok(Self::raw(reader, start, count))
    }

    /// A table that starts with its own 32-bit record count.
    pub fn counted(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let count = reader.offset(offset)?;
        Self::at(reader, offset + 4, count)
    }

    /// A `{count, offset}` pair pointing at the table.
    pub fn indirect(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let count = reader.offset(offset)?;
        let start = reader.offset(offset + 4)?;
        Self::at(reader, start, count)
    }

    pub fn empty() -> Self {
        Self::raw(Reader::new(&[]), 0, 0)
    }

    /// Rebuild a table whose extent was already validated.
    pub(crate) fn raw(reader: Reader<'a>, start: usize, count: usize) -> Self {
        Self { reader, start, count, _record: PhantomData }
    }

    pub(crate) fn extent(&self) -> (usize, usize) {
        (self.start, self.count)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Result<T> {
        if index >= self.count {
            exn::bail!(ErrorKind::BadFormat(format!("record {index} of {}", self.count)));
        }
        T::read(self.reader, self.start + index * T::SIZE)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<T>> + use<'a, T> {
        let section = *self;
        (0..self.count).map(move |index| section.get(index))
    }

    /// Every record that reads cleanly. Malformed records are logged and
    /// skipped.
    pub fn valid(&self) -> impl Iterator<Item = T> + use<'a, T> {
        self.iter().filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(error = ?err, "Skipping malformed cache record");
                None
            },
        })
    }
}
impl<T> Clone for Section<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Section<'_, T> {}
impl<T> fmt::Debug for Section<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section").field("start", &self.start).field("count", &self.count).finish()
    }
}

/// `{alias, canonical}` from the alias table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasRecord<'a> {
    pub alias: &'a str,
    pub mime: &'a str,
}
impl<'a> Record<'a> for AliasRecord<'a> {
    const SIZE: usize = 8;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        Ok(Self { alias: reader.str(reader.offset(offset)?)?, mime: reader.str(reader.offset(offset + 4)?)? })
    }
}

/// A bare MIME type name, as found in parent lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MimeRef<'a>(pub &'a str);
impl<'a> Record<'a> for MimeRef<'a> {
    const SIZE: usize = 4;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        Ok(Self(reader.str(reader.offset(offset)?)?))
    }
}

/// A type and its declared parents, in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct ParentRecord<'a> {
    pub mime: &'a str,
    pub parents: Section<'a, MimeRef<'a>>,
}
impl<'a> Record<'a> for ParentRecord<'a> {
    const SIZE: usize = 8;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let mime = reader.str(reader.offset(offset)?)?;
        let parents = Section::counted(reader, reader.offset(offset + 4)?)?;
        Ok(Self { mime, parents })
    }
}

/// Split a `weight_and_flags` field.
#[inline]
fn weight_and_flags(raw: u32) -> (u8, bool) {
    ((raw & WEIGHT_MASK) as u8, raw & CASE_SENSITIVE_FLAG != 0)
}

/// An entry of the literal or glob tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobRecord<'a> {
    pub pattern: &'a str,
    pub mime: &'a str,
    pub weight: u8,
    pub case_sensitive: bool,
}
impl<'a> Record<'a> for GlobRecord<'a> {
    const SIZE: usize = 12;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let pattern = reader.str(reader.offset(offset)?)?;
        let mime = reader.str(reader.offset(offset + 4)?)?;
        let (weight, case_sensitive) = weight_and_flags(reader.u32(offset + 8)?);
        Ok(Self { pattern, mime, weight, case_sensitive })
    }
}

/// A node of the reversed-suffix tree.
///
/// Leaves are stored as nodes whose character is zero; they sit among the
/// children of the node that completes their suffix.
#[derive(Debug, Clone, Copy)]
pub enum SuffixNode<'a> {
    Branch { character: char, children: Section<'a, SuffixNode<'a>> },
    Leaf { mime: &'a str, weight: u8, case_sensitive: bool },
}
impl<'a> Record<'a> for SuffixNode<'a> {
    const SIZE: usize = 12;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let raw = reader.u32(offset)?;
        if raw == 0 {
            let mime = reader.str(reader.offset(offset + 4)?)?;
            let (weight, case_sensitive) = weight_and_flags(reader.u32(offset + 8)?);
            return Ok(Self::Leaf { mime, weight, case_sensitive });
        }
        let character = char::from_u32(raw)
            .ok_or_raise(|| ErrorKind::BadFormat(format!("invalid character {raw:#x} in suffix tree")))?;
        let count = reader.offset(offset + 4)?;
        let children = Section::at(reader, reader.offset(offset + 8)?, count)?;
        Ok(Self::Branch { character, children })
    }
}

/// Header of the magic section.
#[derive(Debug, Clone, Copy)]
pub struct MagicSection<'a> {
    /// Largest byte offset any rule can inspect.
    pub max_extent: u32,
    pub matches: Section<'a, MatchRecord<'a>>,
}
impl<'a> MagicSection<'a> {
    pub fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let count = reader.offset(offset)?;
        let max_extent = reader.u32(offset + 4)?;
        let matches = Section::at(reader, reader.offset(offset + 8)?, count)?;
        Ok(Self { max_extent, matches })
    }
}

/// One magic rule: a priority, a type and a forest of matchlets.
#[derive(Debug, Clone, Copy)]
pub struct MatchRecord<'a> {
    pub priority: u32,
    pub mime: &'a str,
    pub matchlets: Section<'a, MatchletRecord<'a>>,
}
impl<'a> Record<'a> for MatchRecord<'a> {
    const SIZE: usize = 16;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let priority = reader.u32(offset)?;
        let mime = reader.str(reader.offset(offset + 4)?)?;
        let count = reader.offset(offset + 8)?;
        let matchlets = Section::at(reader, reader.offset(offset + 12)?, count)?;
        Ok(Self { priority, mime, matchlets })
    }
}

/// A single byte-pattern test. A matchlet with children only matches if one
/// of its children also matches.
#[derive(Debug, Clone, Copy)]
pub struct MatchletRecord<'a> {
    pub range_start: u32,
    pub range_length: u32,
    pub word_size: u32,
    pub value: &'a [u8],
    pub mask: Option<&'a [u8]>,
    pub children: Section<'a, MatchletRecord<'a>>,
}
impl<'a> Record<'a> for MatchletRecord<'a> {
    const SIZE: usize = 32;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        let range_start = reader.u32(offset)?;
        let range_length = reader.u32(offset + 4)?;
        let word_size = reader.u32(offset + 8)?;
        let value_length = reader.offset(offset + 12)?;
        let value = reader.bytes(reader.offset(offset + 16)?, value_length)?;
        let mask = match reader.offset(offset + 20)? {
            0 => None,
            mask_offset => Some(reader.bytes(mask_offset, value_length)?),
        };
        let count = reader.offset(offset + 24)?;
        let children = Section::at(reader, reader.offset(offset + 28)?, count)?;
        Ok(Self { range_start, range_length, word_size, value, mask, children })
    }
}

/// XML namespace to type mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceRecord<'a> {
    pub uri: &'a str,
    pub local_name: &'a str,
    pub mime: &'a str,
}
impl<'a> Record<'a> for NamespaceRecord<'a> {
    const SIZE: usize = 12;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        Ok(Self {
            uri: reader.str(reader.offset(offset)?)?,
            local_name: reader.str(reader.offset(offset + 4)?)?,
            mime: reader.str(reader.offset(offset + 8)?)?,
        })
    }
}

/// Type to icon name mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconRecord<'a> {
    pub mime: &'a str,
    pub icon: &'a str,
}
impl<'a> Record<'a> for IconRecord<'a> {
    const SIZE: usize = 8;

    fn read(reader: Reader<'a>, offset: usize) -> Result<Self> {
        Ok(Self { mime: reader.str(reader.offset(offset)?)?, icon: reader.str(reader.offset(offset + 4)?)? })
    }
}
