//! Type relationships: aliases and the sub-class-of graph.

mod alias;
mod parents;

pub use crate::alias::AliasTable;
pub use crate::parents::{MAX_ANCESTORS, ParentGraph, ancestors};
