use mimedb_format::{DEFAULT_WEIGHT, NO_GLOBS, PatternKind};
use std::sync::Arc;

/// A file name pattern that maps to a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobRule {
    pub pattern: String,
    pub mime: Arc<str>,
    /// 0-100; higher wins.
    pub weight: u8,
    pub case_sensitive: bool,
}
impl GlobRule {
    /// A case-insensitive rule with the default weight.
    pub fn new(pattern: impl Into<String>, mime: impl Into<Arc<str>>) -> Self {
        Self { pattern: pattern.into(), mime: mime.into(), weight: DEFAULT_WEIGHT, case_sensitive: false }
    }

    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// The "discard less-local globs" marker for [`mime`](Self::mime).
    pub fn delete_all(mime: impl Into<Arc<str>>) -> Self {
        Self::new(NO_GLOBS, mime)
    }

    #[inline]
    pub fn kind(&self) -> PatternKind {
        PatternKind::of(&self.pattern)
    }

    #[inline]
    pub fn is_delete_all(&self) -> bool {
        self.pattern == NO_GLOBS
    }
}
