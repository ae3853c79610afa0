//! A layered MIME type database.
//!
//! Each [`ProviderLayer`] is one data directory holding a `mime.cache`; a
//! [`ProviderChain`] stacks them most-local first, and [`MimeDatabase`]
//! answers name, content and hierarchy questions over the chain.
//!
//! ```no_run
//! use mimedb_config::Config;
//! use mimedb_provider::MimeDatabase;
//!
//! let config = Config::load(None).unwrap();
//! let database = MimeDatabase::from_config(&config);
//! let mime = database.classify("photo.gif", b"GIF89a");
//! assert!(database.inherits(&mime, "application/octet-stream"));
//! ```

mod chain;
mod database;
pub mod error;
mod fallback;
mod layer;
mod peek;
mod snapshot;

pub use crate::chain::ProviderChain;
pub use crate::database::{ContentMatch, MimeDatabase, NameMatch};
pub use crate::fallback::{DEFAULT_TYPE, DIRECTORY, PLAIN_TEXT, ZERO_SIZE};
pub use crate::layer::{LayerStatus, ProviderLayer};
pub use crate::peek::PeekableReader;
pub use crate::snapshot::LayerSnapshot;
