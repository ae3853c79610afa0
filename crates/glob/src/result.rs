use mimedb_format::PatternKind;
use std::sync::Arc;

/// A type that a file name matched, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobMatch {
    pub mime: Arc<str>,
    /// The pattern that matched. For suffix matches this is `*` plus the
    /// matched suffix.
    pub pattern: Arc<str>,
    pub weight: u8,
    pub kind: PatternKind,
}
impl GlobMatch {
    /// Ordering key; greater is a better match.
    ///
    /// Weight decides first, then literal beats suffix beats generic, then
    /// the longer pattern wins.
    #[inline]
    pub fn rank(&self) -> (u8, PatternKind, usize) {
        (self.weight, self.kind, self.pattern.chars().count())
    }
}

/// Accumulates name matches across layers, most-local layer first.
///
/// Each type appears at most once. Within one layer the best-ranked match
/// for a type is kept; a type already matched by an earlier layer ignores
/// whatever later layers say about it.
#[derive(Debug, Clone, Default)]
pub struct GlobMatchResult {
    matches: Vec<GlobMatch>,
}
impl GlobMatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the candidates produced by one layer.
    pub fn add_layer(&mut self, candidates: impl IntoIterator<Item = GlobMatch>) {
        let previous = self.matches.len();
        for candidate in candidates {
            if self.matches[..previous].iter().any(|existing| existing.mime == candidate.mime) {
                continue;
            }
            match self.matches[previous..].iter_mut().find(|existing| existing.mime == candidate.mime) {
                Some(existing) if candidate.rank() > existing.rank() => *existing = candidate,
                Some(_) => {},
                None => self.matches.push(candidate),
            }
        }
    }

    /// Whether any layer already produced a match for `mime`.
    pub fn contains(&self, mime: &str) -> bool {
        self.matches.iter().any(|existing| &*existing.mime == mime)
    }

    /// Every matching type, in discovery order.
    pub fn all(&self) -> &[GlobMatch] {
        &self.matches
    }

    /// The matches that share the best rank, in discovery order.
    pub fn best(&self) -> Vec<&GlobMatch> {
        let Some(top) = self.matches.iter().map(GlobMatch::rank).max() else {
            return Vec::new();
        };
        self.matches.iter().filter(|candidate| candidate.rank() == top).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }
}
