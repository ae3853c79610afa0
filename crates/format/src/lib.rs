//! Access to the binary `mime.cache` files generated from shared-mime-info
//! package definitions.
//!
//! [`CacheHandle`] maps a cache read-only and exposes each section as a
//! bounds-checked [`Section`](section::Section) of typed records. The
//! [`writer`] module produces the same format from in-memory definitions,
//! which is mostly useful for tests and tooling.

pub mod error;
mod handle;
mod header;
mod reader;
pub mod section;
mod stamp;
pub mod writer;

pub use crate::handle::CacheHandle;
pub use crate::header::{Header, SectionOffsets};
pub use crate::reader::Reader;
pub use crate::stamp::{Stamp, StampEntry};

/// File name of the cache inside a MIME data directory.
pub const CACHE_FILE_NAME: &str = "mime.cache";
/// Optional plain-text list of every type a layer defines.
pub const TYPES_FILE_NAME: &str = "types";
/// Optional plain-text glob list, `weight:type:pattern[:flags]` per line,
/// which keeps each type's patterns in declaration order.
pub const GLOBS_FILE_NAME: &str = "globs2";
pub const MAJOR_VERSION: u16 = 1;
pub const MINOR_VERSION: u16 = 2;
pub const HEADER_SIZE: usize = 40;
/// Glob pattern marking "discard less-local globs for this type".
pub const NO_GLOBS: &str = "__NOGLOBS__";
pub const DEFAULT_WEIGHT: u8 = 50;
pub(crate) const WEIGHT_MASK: u32 = 0xff;
pub(crate) const CASE_SENSITIVE_FLAG: u32 = 0x100;

/// How a file name pattern is matched, ordered from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatternKind {
    /// Anything else, matched as a shell glob.
    Generic,
    /// `*` followed by wildcard-free text, e.g. `*.tar.gz`.
    Suffix,
    /// No wildcards at all, e.g. `Makefile`.
    Literal,
}
impl PatternKind {
    pub fn of(pattern: &str) -> Self {
        let has_wildcard = |text: &str| text.contains(['*', '?', '[']);
        match pattern.strip_prefix('*') {
            _ if !has_wildcard(pattern) => Self::Literal,
            Some(tail) if !tail.is_empty() && !has_wildcard(tail) => Self::Suffix,
            _ => Self::Generic,
        }
    }
}
