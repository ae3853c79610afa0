use crate::result::GlobMatch;
use crate::rule::GlobRule;
use crate::suffix::{Leaf, SuffixTree, SuffixTreeBuilder};
use glob::{MatchOptions, Pattern};
use mimedb_format::section::{Section, SuffixNode};
use mimedb_format::{CacheHandle, PatternKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

/// Deepest suffix accepted when reading a cache's suffix tree.
const MAX_SUFFIX_DEPTH: usize = 255;

#[derive(Debug, Clone)]
struct Literal {
    pattern: Arc<str>,
    mime: Arc<str>,
    weight: u8,
    case_sensitive: bool,
}

#[derive(Debug, Clone)]
struct Generic {
    rule: GlobRule,
    pattern: Pattern,
}

/// Every file name pattern of one layer, indexed for matching.
///
/// Literal patterns are hashed, suffix patterns live in a reversed-suffix
/// trie and everything else is tried in turn, highest weight first.
#[derive(Debug, Clone, Default)]
pub struct GlobIndex {
    literals: HashMap<Arc<str>, Vec<Literal>>,
    suffixes: SuffixTree,
    generic: Vec<Generic>,
    deleted: HashSet<Arc<str>>,
    patterns: HashMap<Arc<str>, Vec<String>>,
}
impl GlobIndex {
    /// Build an index from individual rules. A [`GlobRule::delete_all`]
    /// marker records the deletion instead of adding a pattern.
    pub fn from_rules(rules: impl IntoIterator<Item = GlobRule>) -> Self {
        let mut builder = Builder::default();
        for rule in rules {
            let kind = rule.kind();
            builder.add(rule, kind);
        }
        builder.build()
    }

    /// Build an index from the literal, suffix tree and glob sections of a
    /// cache. Malformed records are skipped.
    #[instrument(level = "debug", skip_all, fields(path = ?handle.path()))]
    pub fn from_cache(handle: &CacheHandle) -> Self {
        let mut builder = Builder::default();
        for record in handle.literals().valid() {
            let rule = GlobRule::new(record.pattern, record.mime)
                .with_weight(record.weight)
                .with_case_sensitive(record.case_sensitive);
            builder.add(rule, PatternKind::Literal);
        }

        let mut suffix_rules = Vec::new();
        let mut budget = handle.as_bytes().len() / 12 + 1;
        read_suffix_nodes(handle.suffix_tree(), &mut Vec::new(), &mut budget, &mut suffix_rules);
        for rule in suffix_rules {
            builder.add(rule, PatternKind::Suffix);
        }

        for record in handle.globs().valid() {
            let rule = GlobRule::new(record.pattern, record.mime)
                .with_weight(record.weight)
                .with_case_sensitive(record.case_sensitive);
            builder.add(rule, PatternKind::Generic);
        }
        let index = builder.build();
        tracing::debug!(
            literals = index.literals.len(),
            generic = index.generic.len(),
            deleted = index.deleted.len(),
            "Indexed glob patterns"
        );
        index
    }

    /// Every type whose patterns match `file_name`, with the pattern that
    /// matched. At most one match per pattern kind and type is reported.
    #[instrument(level = "trace", skip(self))]
    pub fn match_file_name(&self, file_name: &str) -> Vec<GlobMatch> {
        let lowered = file_name.to_lowercase();
        let mut found = Vec::new();
        self.match_literals(file_name, &lowered, &mut found);
        self.suffixes.find(file_name, &mut found);
        // Case-insensitive patterns are compiled lowercased, so both sides fold the same way.
        let options =
            MatchOptions { case_sensitive: true, require_literal_separator: false, require_literal_leading_dot: false };
        for generic in &self.generic {
            let candidate = if generic.rule.case_sensitive { file_name } else { lowered.as_str() };
            if generic.pattern.matches_with(candidate, options) {
                found.push(GlobMatch {
                    mime: generic.rule.mime.clone(),
                    pattern: generic.rule.pattern.as_str().into(),
                    weight: generic.rule.weight,
                    kind: PatternKind::Generic,
                });
            }
        }
        found
    }

    fn match_literals(&self, file_name: &str, lowered: &str, found: &mut Vec<GlobMatch>) {
        let exact = self.literals.get(file_name).into_iter().flatten();
        // Case-insensitive literals are keyed lowercased; only look them up again if lowercasing changed anything.
        let folded = (lowered != file_name)
            .then(|| self.literals.get(lowered))
            .flatten()
            .into_iter()
            .flatten()
            .filter(|literal| !literal.case_sensitive);
        for literal in exact.chain(folded) {
            found.push(GlobMatch {
                mime: literal.mime.clone(),
                pattern: literal.pattern.clone(),
                weight: literal.weight,
                kind: PatternKind::Literal,
            });
        }
    }

    /// Whether this layer discards less-local patterns for `mime`.
    pub fn has_delete_all(&self, mime: &str) -> bool {
        self.deleted.contains(mime)
    }

    /// Patterns declared for `mime`, in declaration order.
    pub fn patterns_for(&self, mime: &str) -> &[String] {
        self.patterns.get(mime).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every type mentioned by a pattern or a deletion marker.
    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().chain(self.deleted.iter().filter(|mime| !self.patterns.contains_key(*mime))).map(|m| &**m)
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.suffixes.is_empty() && self.generic.is_empty() && self.deleted.is_empty()
    }
}

/// Walk the cache's suffix tree depth-first, turning every leaf back into a
/// `*suffix` rule. `budget` caps the number of nodes visited so that a cyclic
/// tree cannot loop forever.
fn read_suffix_nodes(
    nodes: Section<'_, SuffixNode<'_>>,
    path: &mut Vec<char>,
    budget: &mut usize,
    out: &mut Vec<GlobRule>,
) {
    for node in nodes.valid() {
        if *budget == 0 {
            tracing::warn!("Suffix tree visits more nodes than the cache can hold; ignoring the rest");
            return;
        }
        *budget -= 1;
        match node {
            SuffixNode::Leaf { mime, weight, case_sensitive } if !path.is_empty() => {
                let pattern: String = std::iter::once('*').chain(path.iter().rev().copied()).collect();
                out.push(GlobRule::new(pattern, mime).with_weight(weight).with_case_sensitive(case_sensitive));
            },
            SuffixNode::Leaf { .. } => {},
            SuffixNode::Branch { .. } if path.len() >= MAX_SUFFIX_DEPTH => {
                tracing::warn!(depth = path.len(), "Suffix tree is deeper than any sane pattern; pruning");
            },
            SuffixNode::Branch { character, children } => {
                path.push(character);
                read_suffix_nodes(children, path, budget, out);
                path.pop();
            },
        }
    }
}

fn fold(pattern: &str, case_sensitive: bool) -> String {
    if case_sensitive { pattern.to_string() } else { pattern.to_lowercase() }
}

#[derive(Default)]
struct Builder {
    literals: HashMap<Arc<str>, Vec<Literal>>,
    suffixes: SuffixTreeBuilder,
    generic: Vec<Generic>,
    deleted: HashSet<Arc<str>>,
    patterns: HashMap<Arc<str>, Vec<String>>,
}
impl Builder {
    fn add(&mut self, rule: GlobRule, kind: PatternKind) {
        if rule.is_delete_all() {
            self.deleted.insert(rule.mime);
            return;
        }
        let patterns = self.patterns.entry(rule.mime.clone()).or_default();
        if !patterns.contains(&rule.pattern) {
            patterns.push(rule.pattern.clone());
        }

        match kind {
            PatternKind::Literal => {
                let key: Arc<str> = match rule.case_sensitive {
                    true => rule.pattern.as_str().into(),
                    false => rule.pattern.to_lowercase().into(),
                };
                let entries = self.literals.entry(key.clone()).or_default();
                if !entries.iter().any(|entry| entry.mime == rule.mime && entry.case_sensitive == rule.case_sensitive) {
                    entries.push(Literal {
                        pattern: key,
                        mime: rule.mime,
                        weight: rule.weight,
                        case_sensitive: rule.case_sensitive,
                    });
                }
            },
            PatternKind::Suffix => {
                let suffix = &rule.pattern[1..];
                let suffix = if rule.case_sensitive { suffix.to_string() } else { suffix.to_lowercase() };
                let leaf = Leaf { mime: rule.mime, weight: rule.weight, case_sensitive: rule.case_sensitive };
                self.suffixes.insert(&suffix, leaf);
            },
            PatternKind::Generic => match Pattern::new(&fold(&rule.pattern, rule.case_sensitive)) {
                Ok(pattern) => self.generic.push(Generic { rule, pattern }),
                Err(err) => tracing::warn!(pattern = %rule.pattern, error = %err, "Ignoring unparseable glob pattern"),
            },
        }
    }

    fn build(mut self) -> GlobIndex {
        self.generic.sort_by(|a, b| b.rule.weight.cmp(&a.rule.weight));
        GlobIndex {
            literals: self.literals,
            suffixes: self.suffixes.build(),
            generic: self.generic,
            deleted: self.deleted,
            patterns: self.patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimedb_format::writer::{CacheWriter, TypeDefinition};
    use rstest::rstest;

    fn index() -> GlobIndex {
        GlobIndex::from_rules([
            GlobRule::new("*.txt", "text/plain"),
            GlobRule::new("Makefile", "text/x-makefile"),
            GlobRule::new("makefile", "text/x-makefile"),
            GlobRule::new("*.mk", "text/x-makefile"),
            GlobRule::new("[Mm]akefile.*", "text/x-makefile"),
            GlobRule::new("README*", "text/x-readme").with_weight(10),
            GlobRule::new("*.C", "text/x-c++src").with_case_sensitive(true),
            GlobRule::new("*.c", "text/x-csrc"),
            GlobRule::new("core", "application/x-core").with_case_sensitive(true),
            GlobRule::delete_all("application/x-old"),
        ])
    }

    fn matched(index: &GlobIndex, name: &str) -> Vec<(String, PatternKind)> {
        index.match_file_name(name).into_iter().map(|m| (m.mime.to_string(), m.kind)).collect()
    }

    #[rstest]
    #[case("notes.txt", &[("text/plain", PatternKind::Suffix)])]
    #[case("Makefile", &[("text/x-makefile", PatternKind::Literal)])]
    #[case("MAKEFILE", &[("text/x-makefile", PatternKind::Literal)])]
    #[case("README.md", &[("text/x-readme", PatternKind::Generic)])]
    #[case("readme.md", &[("text/x-readme", PatternKind::Generic)])]
    #[case("core", &[("application/x-core", PatternKind::Literal)])]
    #[case("Core", &[])]
    #[case("x.C", &[("text/x-csrc", PatternKind::Suffix)])]
    #[case("rules.mk", &[("text/x-makefile", PatternKind::Suffix)])]
    fn test_match(#[case] name: &str, #[case] expected: &[(&str, PatternKind)]) {
        let expected: Vec<_> = expected.iter().map(|(mime, kind)| (mime.to_string(), *kind)).collect();
        assert_eq!(matched(&index(), name), expected);
    }

    #[rstest]
    #[case::lowercase_name("\u{e4}rger.log", true)]
    #[case::uppercase_name("\u{c4}RGER.TXT", true)]
    #[case::other_word("anger.log", false)]
    fn test_generic_folds_non_ascii_case(#[case] name: &str, #[case] expected: bool) {
        let index = GlobIndex::from_rules([
            GlobRule::new("\u{c4}rger*", "text/x-grudge"),
            GlobRule::new("\u{c4}RGER-[0-9]*", "text/x-exact").with_case_sensitive(true),
        ]);
        let patterns: Vec<_> = index.match_file_name(name).into_iter().map(|m| m.pattern.to_string()).collect();
        assert_eq!(patterns == ["\u{c4}rger*"], expected);
    }

    #[test]
    fn test_case_sensitive_generic_keeps_case() {
        let rule = GlobRule::new("\u{c4}RGER-[0-9]*", "text/x-exact").with_case_sensitive(true);
        let index = GlobIndex::from_rules([rule]);
        assert_eq!(matched(&index, "\u{c4}RGER-1"), [("text/x-exact".to_string(), PatternKind::Generic)]);
        assert!(matched(&index, "\u{e4}rger-1").is_empty());
    }

    #[test]
    fn test_makefile_dot_matches_generic() {
        let found = matched(&index(), "Makefile.am");
        assert_eq!(found, [("text/x-makefile".to_string(), PatternKind::Generic)]);
    }

    #[test]
    fn test_delete_all_is_not_a_pattern() {
        let index = index();
        assert!(index.has_delete_all("application/x-old"));
        assert!(!index.has_delete_all("text/plain"));
        assert!(matched(&index, "__NOGLOBS__").is_empty());
        assert!(index.mime_types().any(|mime| mime == "application/x-old"));
    }

    #[test]
    fn test_patterns_for() {
        let index = index();
        assert_eq!(index.patterns_for("text/x-makefile"), ["Makefile", "makefile", "*.mk", "[Mm]akefile.*"]);
        assert!(index.patterns_for("application/x-unknown").is_empty());
    }

    #[test]
    fn test_from_cache_matches_from_rules() {
        let bytes = CacheWriter::new()
            .with(TypeDefinition::new("text/plain").glob("*.txt"))
            .with(TypeDefinition::new("application/x-bzip-compressed-tar").glob("*.tar.bz2"))
            .with(TypeDefinition::new("application/x-bzip").glob("*.bz2"))
            .with(TypeDefinition::new("text/x-makefile").glob("Makefile").glob("[Mm]akefile.*"))
            .with(TypeDefinition::new("text/x-c++src").glob_with("*.C", 50, true))
            .with(TypeDefinition::new("application/x-old").delete_globs())
            .to_bytes();
        let handle = CacheHandle::from_bytes(bytes).unwrap();
        let index = GlobIndex::from_cache(&handle);

        assert_eq!(matched(&index, "a.tar.bz2"), [("application/x-bzip-compressed-tar".to_string(), PatternKind::Suffix)]);
        assert_eq!(matched(&index, "a.BZ2"), [("application/x-bzip".to_string(), PatternKind::Suffix)]);
        assert_eq!(matched(&index, "makefile"), [("text/x-makefile".to_string(), PatternKind::Literal)]);
        assert_eq!(matched(&index, "main.C"), [("text/x-c++src".to_string(), PatternKind::Suffix)]);
        assert!(matched(&index, "main.c").is_empty());
        assert!(index.has_delete_all("application/x-old"));
        assert_eq!(index.patterns_for("application/x-bzip"), ["*.bz2"]);
    }

    #[test]
    fn test_empty() {
        assert!(GlobIndex::default().is_empty());
        assert!(!index().is_empty());
    }
}
