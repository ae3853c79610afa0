//! CLI Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration could not be loaded.
    #[display("could not load configuration")]
    Config,
    /// A file or stream given on the command line could not be classified.
    #[display("could not classify {_0}")]
    Classify(#[error(not(source))] String),
}
