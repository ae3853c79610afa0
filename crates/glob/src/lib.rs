//! File name based type detection.
//!
//! A [`GlobIndex`] holds the patterns of a single layer. Matches from several
//! layers are combined (and ranked) with a [`GlobMatchResult`].
//!
//! ```
//! use mimedb_glob::{GlobIndex, GlobMatchResult, GlobRule};
//!
//! let index = GlobIndex::from_rules([
//!     GlobRule::new("*.bz2", "application/x-bzip"),
//!     GlobRule::new("*.tar.bz2", "application/x-bzip-compressed-tar"),
//! ]);
//! let mut result = GlobMatchResult::new();
//! result.add_layer(index.match_file_name("backup.tar.bz2"));
//! assert_eq!(&*result.best()[0].mime, "application/x-bzip-compressed-tar");
//! ```

mod index;
mod result;
mod rule;
mod suffix;

pub use crate::index::GlobIndex;
pub use crate::result::{GlobMatch, GlobMatchResult};
pub use crate::rule::GlobRule;
pub use mimedb_format::PatternKind;
