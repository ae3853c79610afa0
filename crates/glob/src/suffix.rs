//! Reversed-suffix trie for `*.ext`-style patterns.
//!
//! Patterns are stored by their suffix read backwards, so a file name is
//! matched by walking its characters from the end. The trie is frozen into
//! flat arrays where every node's children (and leaves) occupy a contiguous,
//! character-sorted range.

use crate::result::GlobMatch;
use mimedb_format::PatternKind;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Leaf {
    pub mime: Arc<str>,
    pub weight: u8,
    pub case_sensitive: bool,
}

#[derive(Debug, Clone)]
struct Node {
    character: char,
    children: Range<u32>,
    leaves: Range<u32>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SuffixTree {
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    roots: Range<u32>,
}
impl SuffixTree {
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// All suffix matches for `file_name`.
    ///
    /// The lowercased name is tried first; the name as given is only tried
    /// (for case-sensitive patterns) if that found nothing.
    pub fn find(&self, file_name: &str, out: &mut Vec<GlobMatch>) {
        let lowered: Vec<char> = file_name.to_lowercase().chars().collect();
        if self.find_in(&lowered, false, out) {
            return;
        }
        let original: Vec<char> = file_name.chars().collect();
        self.find_in(&original, true, out);
    }

    fn find_in(&self, chars: &[char], case_sensitive_pass: bool, out: &mut Vec<GlobMatch>) -> bool {
        match chars.len() {
            0 => false,
            len => self.walk(self.roots.clone(), chars, len - 1, case_sensitive_pass, out),
        }
    }

    /// Match `chars[position]` among `siblings`, preferring the deepest
    /// (longest) suffix. The first character of the name is never consumed
    /// by a branch, so `.txt` alone does not match `*.txt`.
    fn walk(
        &self,
        siblings: Range<u32>,
        chars: &[char],
        position: usize,
        case_sensitive_pass: bool,
        out: &mut Vec<GlobMatch>,
    ) -> bool {
        let siblings = &self.nodes[siblings.start as usize..siblings.end as usize];
        let Ok(index) = siblings.binary_search_by(|node| node.character.cmp(&chars[position])) else {
            return false;
        };
        let node = &siblings[index];

        if position > 1 && self.walk(node.children.clone(), chars, position - 1, case_sensitive_pass, out) {
            return true;
        }

        let mut found = false;
        for leaf in &self.leaves[node.leaves.start as usize..node.leaves.end as usize] {
            if case_sensitive_pass || !leaf.case_sensitive {
                let suffix: String = chars[position..].iter().collect();
                out.push(GlobMatch {
                    mime: leaf.mime.clone(),
                    pattern: format!("*{suffix}").into(),
                    weight: leaf.weight,
                    kind: PatternKind::Suffix,
                });
                found = true;
            }
        }
        found
    }
}

#[derive(Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    leaves: Vec<Leaf>,
}

#[derive(Default)]
pub(crate) struct SuffixTreeBuilder {
    root: TrieNode,
}
impl SuffixTreeBuilder {
    /// Insert a leaf under `suffix` (the pattern without its leading `*`).
    ///
    /// A second rule for the same type and suffix is ignored.
    pub fn insert(&mut self, suffix: &str, leaf: Leaf) {
        let mut node = &mut self.root;
        for character in suffix.chars().rev() {
            node = node.children.entry(character).or_default();
        }
        if !node.leaves.iter().any(|existing| existing.mime == leaf.mime) {
            node.leaves.push(leaf);
        }
    }

    pub fn build(self) -> SuffixTree {
        let mut tree = SuffixTree::default();
        tree.roots = freeze(&mut tree, &self.root);
        tree
    }
}

/// Append `node`'s children as one contiguous range and recurse.
fn freeze(tree: &mut SuffixTree, node: &TrieNode) -> Range<u32> {
    let start = tree.nodes.len();
    tree.nodes
        .extend(node.children.keys().map(|character| Node { character: *character, children: 0..0, leaves: 0..0 }));
    for (index, child) in node.children.values().enumerate() {
        let first_leaf = tree.leaves.len() as u32;
        tree.leaves.extend(child.leaves.iter().cloned());
        let leaves = first_leaf..tree.leaves.len() as u32;
        let children = freeze(tree, child);
        let slot = &mut tree.nodes[start + index];
        slot.leaves = leaves;
        slot.children = children;
    }
    start as u32..(start + node.children.len()) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn leaf(mime: &str, case_sensitive: bool) -> Leaf {
        Leaf { mime: mime.into(), weight: 50, case_sensitive }
    }

    fn tree() -> SuffixTree {
        let mut builder = SuffixTreeBuilder::default();
        builder.insert(".txt", leaf("text/plain", false));
        builder.insert(".bz2", leaf("application/x-bzip", false));
        builder.insert(".tar.bz2", leaf("application/x-bzip-compressed-tar", false));
        builder.insert(".C", leaf("text/x-c++src", true));
        builder.insert(".c", leaf("text/x-csrc", false));
        builder.build()
    }

    fn find(tree: &SuffixTree, name: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        tree.find(name, &mut out);
        out.into_iter().map(|m| (m.mime.to_string(), m.pattern.to_string())).collect()
    }

    #[rstest]
    #[case("notes.txt", "text/plain", "*.txt")]
    #[case("NOTES.TXT", "text/plain", "*.txt")]
    #[case("foo.tar.bz2", "application/x-bzip-compressed-tar", "*.tar.bz2")]
    #[case("foo.bz2", "application/x-bzip", "*.bz2")]
    #[case("main.c", "text/x-csrc", "*.c")]
    #[case("main.C", "text/x-csrc", "*.c")]
    fn test_single_match(#[case] name: &str, #[case] mime: &str, #[case] pattern: &str) {
        assert_eq!(find(&tree(), name), [(mime.to_string(), pattern.to_string())]);
    }

    #[test]
    fn test_longest_suffix_only() {
        // The deeper `*.tar.bz2` leaf hides the shallower `*.bz2` one.
        let found = find(&tree(), "archive.tar.bz2");
        assert_eq!(found.len(), 1);
    }

    #[rstest]
    #[case::whole_name_is_suffix(".txt")]
    #[case::no_match("notes.md")]
    #[case::empty("")]
    fn test_no_match(#[case] name: &str) {
        assert!(find(&tree(), name).is_empty());
    }

    #[test]
    fn test_case_sensitive_leaf_needs_exact_case() {
        let mut builder = SuffixTreeBuilder::default();
        builder.insert(".C", leaf("text/x-c++src", true));
        let tree = builder.build();
        assert_eq!(find(&tree, "main.C"), [("text/x-c++src".to_string(), "*.C".to_string())]);
        assert!(find(&tree, "main.c").is_empty());
    }

    #[test]
    fn test_siblings_are_sorted() {
        let tree = tree();
        let roots = &tree.nodes[tree.roots.start as usize..tree.roots.end as usize];
        assert!(roots.windows(2).all(|pair| pair[0].character < pair[1].character));
    }
}
