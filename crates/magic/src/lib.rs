//! Content based type detection.
//!
//! Magic rules inspect the leading bytes of a file. A [`MagicIndex`] holds
//! the rules of one layer, sorted so that [`MagicIndex::sniff`] returns the
//! highest-priority match.
//!
//! ```
//! use mimedb_magic::{MagicIndex, MagicRule, Matchlet};
//!
//! let index = MagicIndex::from_rules([MagicRule::new("image/gif", 50).matchlet(Matchlet::new(0, "GIF8"))]);
//! let sniff = index.sniff(b"GIF89a...").unwrap();
//! assert_eq!((&*sniff.mime, sniff.accuracy), ("image/gif", 50));
//! ```

mod index;
mod matchlet;

pub use crate::index::{MAX_PRIORITY, MagicIndex, MagicRule, Sniff};
pub use crate::matchlet::Matchlet;
