//! Serialize type definitions into a cache image.
//!
//! The output is byte-compatible with what the reader expects: a 40-byte
//! header followed by section tables, with strings and magic values
//! interleaved wherever they were first needed. Offsets are 4-byte aligned
//! for every table.

use crate::error::{ErrorKind, Result};
use crate::header::{Header, SectionOffsets};
use crate::{CASE_SENSITIVE_FLAG, DEFAULT_WEIGHT, HEADER_SIZE, MAJOR_VERSION, MINOR_VERSION, NO_GLOBS, PatternKind};
use exn::ResultExt;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use tracing::instrument;

/// A file name pattern attached to a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobDefinition {
    pub pattern: String,
    pub weight: u8,
    pub case_sensitive: bool,
}
impl GlobDefinition {
    fn weight_and_flags(&self) -> u32 {
        let flags = if self.case_sensitive { CASE_SENSITIVE_FLAG } else { 0 };
        u32::from(self.weight) | flags
    }

    /// Case-insensitive patterns are stored lowercased.
    fn stored_pattern(&self) -> String {
        if self.case_sensitive { self.pattern.clone() } else { self.pattern.to_lowercase() }
    }
}

/// One byte-pattern test of a magic rule.
///
/// `value` (and `mask`, when present) are stored exactly as given. For
/// `word_size` greater than one, they must be big-endian; readers convert
/// them to host order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchletDefinition {
    pub offset: u32,
    pub range_length: u32,
    pub word_size: u32,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
    pub children: Vec<MatchletDefinition>,
}
impl MatchletDefinition {
    /// Raw bytes at exactly `offset`.
    pub fn new(offset: u32, value: impl Into<Vec<u8>>) -> Self {
        Self { offset, range_length: 1, word_size: 1, value: value.into(), mask: None, children: Vec::new() }
    }

    pub fn string(offset: u32, value: &str) -> Self {
        Self::new(offset, value.as_bytes())
    }

    /// A 16-bit word compared in host byte order.
    pub fn host16(offset: u32, value: u16) -> Self {
        Self { word_size: 2, ..Self::new(offset, value.to_be_bytes()) }
    }

    /// A 32-bit word compared in host byte order.
    pub fn host32(offset: u32, value: u32) -> Self {
        Self { word_size: 4, ..Self::new(offset, value.to_be_bytes()) }
    }

    pub fn big16(offset: u32, value: u16) -> Self {
        Self::new(offset, value.to_be_bytes())
    }

    pub fn big32(offset: u32, value: u32) -> Self {
        Self::new(offset, value.to_be_bytes())
    }

    pub fn little16(offset: u32, value: u16) -> Self {
        Self::new(offset, value.to_le_bytes())
    }

    pub fn little32(offset: u32, value: u32) -> Self {
        Self::new(offset, value.to_le_bytes())
    }

    /// Allow the value to start anywhere in `offset..offset + length`.
    pub fn range(mut self, length: u32) -> Self {
        self.range_length = length.max(1);
        self
    }

    /// Compare only the bits set in `mask`. Must be as long as the value.
    pub fn mask(mut self, mask: impl Into<Vec<u8>>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn child(mut self, child: MatchletDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// One past the last byte this matchlet (or any descendant) can inspect.
    fn extent(&self) -> u32 {
        let last_start = self.offset.saturating_add(self.range_length.max(1) - 1);
        let own = last_start.saturating_add(self.value.len() as u32);
        self.children.iter().map(Self::extent).fold(own, u32::max)
    }
}

/// A magic rule: any one of `matchlets` matching identifies the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicDefinition {
    pub priority: u32,
    pub matchlets: Vec<MatchletDefinition>,
}
impl MagicDefinition {
    pub fn new(priority: u32) -> Self {
        Self { priority, matchlets: Vec::new() }
    }

    pub fn matchlet(mut self, matchlet: MatchletDefinition) -> Self {
        self.matchlets.push(matchlet);
        self
    }
}

/// Everything a cache records about one type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDefinition {
    pub name: String,
    pub globs: Vec<GlobDefinition>,
    /// Discard all globs that less-local layers define for this type.
    pub delete_globs: bool,
    pub magic: Vec<MagicDefinition>,
    pub aliases: Vec<String>,
    pub parents: Vec<String>,
    pub icon: Option<String>,
    pub generic_icon: Option<String>,
    /// `(namespace URI, local name)` of XML documents of this type.
    pub namespaces: Vec<(String, String)>,
}
impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Add a case-insensitive pattern with the default weight.
    pub fn glob(self, pattern: impl Into<String>) -> Self {
        self.glob_with(pattern, DEFAULT_WEIGHT, false)
    }

    pub fn glob_with(mut self, pattern: impl Into<String>, weight: u8, case_sensitive: bool) -> Self {
        self.globs.push(GlobDefinition { pattern: pattern.into(), weight, case_sensitive });
        self
    }

    pub fn delete_globs(mut self) -> Self {
        self.delete_globs = true;
        self
    }

    pub fn magic(mut self, magic: MagicDefinition) -> Self {
        self.magic.push(magic);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn generic_icon(mut self, icon: impl Into<String>) -> Self {
        self.generic_icon = Some(icon.into());
        self
    }

    pub fn namespace(mut self, uri: impl Into<String>, local_name: impl Into<String>) -> Self {
        self.namespaces.push((uri.into(), local_name.into()));
        self
    }
}

/// Builds a cache image from [`TypeDefinition`]s.
///
/// # Example
///
/// ```
/// use mimedb_format::CacheHandle;
/// use mimedb_format::writer::{CacheWriter, TypeDefinition};
///
/// let bytes = CacheWriter::new()
///     .with(TypeDefinition::new("text/plain").glob("*.txt"))
///     .to_bytes();
/// let handle = CacheHandle::from_bytes(bytes).unwrap();
/// assert_eq!(handle.suffix_tree().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheWriter {
    types: Vec<TypeDefinition>,
}
impl CacheWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, definition: TypeDefinition) -> &mut Self {
        self.types.push(definition);
        self
    }

    pub fn with(mut self, definition: TypeDefinition) -> Self {
        self.types.push(definition);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut layout = Layout::default();
        layout.reserve(HEADER_SIZE);
        let sections = SectionOffsets {
            aliases: self.write_aliases(&mut layout),
            parents: self.write_parents(&mut layout),
            literals: self.write_literals(&mut layout),
            suffix_tree: self.write_suffix_tree(&mut layout),
            globs: self.write_globs(&mut layout),
            magic: self.write_magic(&mut layout),
            namespaces: self.write_namespaces(&mut layout),
            icons: write_icons(&mut layout, self.types.iter().filter_map(|t| Some((&*t.name, t.icon.as_deref()?)))),
            generic_icons: write_icons(
                &mut layout,
                self.types.iter().filter_map(|t| Some((&*t.name, t.generic_icon.as_deref()?))),
            ),
        };
        let header = Header { major: MAJOR_VERSION, minor: MINOR_VERSION, sections };
        layout.out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        layout.out
    }

    /// Atomically replace the cache at `path`.
    #[instrument(skip(self), fields(path = %path.as_ref().display(), types = self.types.len()))]
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir).or_raise(|| ErrorKind::Io)?;
        file.write_all(&self.to_bytes()).or_raise(|| ErrorKind::Io)?;
        file.persist(path).or_raise(|| ErrorKind::Io)?;
        tracing::debug!("wrote cache");
        Ok(())
    }

    /// The `globs2` listing of every pattern: heaviest first, otherwise in
    /// declaration order.
    pub fn to_globs2(&self) -> String {
        let mut lines: Vec<(u8, String)> = Vec::new();
        for definition in &self.types {
            if definition.delete_globs {
                lines.push((DEFAULT_WEIGHT, format!("{DEFAULT_WEIGHT}:{}:{NO_GLOBS}", definition.name)));
            }
            for glob in &definition.globs {
                let flags = if glob.case_sensitive { ":cs" } else { "" };
                let line = format!("{}:{}:{}{flags}", glob.weight, definition.name, glob.stored_pattern());
                lines.push((glob.weight, line));
            }
        }
        lines.sort_by(|a, b| b.0.cmp(&a.0));
        let mut text = String::from("# Generated by mimedb; do not edit.\n");
        for (_, line) in lines {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }

    fn write_aliases(&self, layout: &mut Layout) -> u32 {
        let mut pairs: Vec<(&str, &str)> =
            self.types.iter().flat_map(|t| t.aliases.iter().map(|alias| (alias.as_str(), t.name.as_str()))).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs.dedup_by(|a, b| a.0 == b.0);
        write_string_pairs(layout, &pairs)
    }

    fn write_parents(&self, layout: &mut Layout) -> u32 {
        let mut entries: Vec<(&str, &[String])> = self
            .types
            .iter()
            .filter(|t| !t.parents.is_empty())
            .map(|t| (t.name.as_str(), t.parents.as_slice()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let start = layout.reserve(4 + entries.len() * 8);
        layout.put(start, entries.len() as u32);
        for (index, (mime, parents)) in entries.into_iter().enumerate() {
            let entry = start + 4 + index * 8;
            let mime = layout.string(mime);
            let list = layout.reserve(4 + parents.len() * 4);
            layout.put(list, parents.len() as u32);
            for (position, parent) in parents.iter().enumerate() {
                let parent = layout.string(parent);
                layout.put(list + 4 + position * 4, parent);
            }
            layout.put(entry, mime);
            layout.put(entry + 4, list as u32);
        }
        start as u32
    }

    /// Globs of `kind` as `(stored pattern, type, weight_and_flags)`.
    fn globs_of(&self, kind: PatternKind) -> Vec<(String, &str, u32)> {
        self.types
            .iter()
            .flat_map(|t| t.globs.iter().map(move |glob| (glob, t.name.as_str())))
            .filter(|(glob, _)| PatternKind::of(&glob.pattern) == kind)
            .map(|(glob, mime)| (glob.stored_pattern(), mime, glob.weight_and_flags()))
            .collect()
    }

    fn write_literals(&self, layout: &mut Layout) -> u32 {
        let mut literals = self.globs_of(PatternKind::Literal);
        literals.sort_by(|a, b| a.0.cmp(&b.0));
        write_glob_table(layout, &literals)
    }

    fn write_suffix_tree(&self, layout: &mut Layout) -> u32 {
        let mut root = Trie::default();
        for (pattern, mime, flags) in self.globs_of(PatternKind::Suffix) {
            let mut node = &mut root;
            for character in pattern[1..].chars().rev() {
                node = node.children.entry(character).or_default();
            }
            node.leaves.push((mime.to_string(), flags));
        }
        let start = layout.reserve(8);
        let (count, first) = root.write_children(layout);
        layout.put(start, count);
        layout.put(start + 4, first);
        start as u32
    }

    fn write_globs(&self, layout: &mut Layout) -> u32 {
        let mut globs = self.globs_of(PatternKind::Generic);
        globs.sort_by(|a, b| (b.2 & 0xff).cmp(&(a.2 & 0xff)));
        globs.extend(
            self.types
                .iter()
                .filter(|t| t.delete_globs)
                .map(|t| (NO_GLOBS.to_string(), t.name.as_str(), u32::from(DEFAULT_WEIGHT))),
        );
        write_glob_table(layout, &globs)
    }

    fn write_magic(&self, layout: &mut Layout) -> u32 {
        let mut rules: Vec<(&str, &MagicDefinition)> =
            self.types.iter().flat_map(|t| t.magic.iter().map(move |magic| (t.name.as_str(), magic))).collect();
        rules.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));
        let max_extent = rules.iter().flat_map(|(_, rule)| &rule.matchlets).map(MatchletDefinition::extent).max();

        let start = layout.reserve(12);
        let table = layout.reserve(rules.len() * 16);
        for (index, (mime, rule)) in rules.iter().enumerate() {
            let entry = table + index * 16;
            let mime = layout.string(mime);
            let (count, first) = write_matchlets(layout, &rule.matchlets);
            layout.put(entry, rule.priority);
            layout.put(entry + 4, mime);
            layout.put(entry + 8, count);
            layout.put(entry + 12, first);
        }
        layout.put(start, rules.len() as u32);
        layout.put(start + 4, max_extent.unwrap_or(0));
        layout.put(start + 8, table as u32);
        start as u32
    }

    fn write_namespaces(&self, layout: &mut Layout) -> u32 {
        let mut entries: Vec<(&str, &str, &str)> = self
            .types
            .iter()
            .flat_map(|t| t.namespaces.iter().map(move |(uri, local)| (uri.as_str(), local.as_str(), t.name.as_str())))
            .collect();
        entries.sort();
        let start = layout.reserve(4 + entries.len() * 12);
        layout.put(start, entries.len() as u32);
        for (index, (uri, local, mime)) in entries.into_iter().enumerate() {
            let entry = start + 4 + index * 12;
            let (uri, local, mime) = (layout.string(uri), layout.string(local), layout.string(mime));
            layout.put(entry, uri);
            layout.put(entry + 4, local);
            layout.put(entry + 8, mime);
        }
        start as u32
    }
}

fn write_string_pairs(layout: &mut Layout, pairs: &[(&str, &str)]) -> u32 {
    let start = layout.reserve(4 + pairs.len() * 8);
    layout.put(start, pairs.len() as u32);
    for (index, (first, second)) in pairs.iter().enumerate() {
        let entry = start + 4 + index * 8;
        let (first, second) = (layout.string(first), layout.string(second));
        layout.put(entry, first);
        layout.put(entry + 4, second);
    }
    start as u32
}

fn write_icons<'a>(layout: &mut Layout, icons: impl Iterator<Item = (&'a str, &'a str)>) -> u32 {
    let mut pairs: Vec<_> = icons.collect();
    pairs.sort();
    write_string_pairs(layout, &pairs)
}

fn write_glob_table(layout: &mut Layout, globs: &[(String, &str, u32)]) -> u32 {
    let start = layout.reserve(4 + globs.len() * 12);
    layout.put(start, globs.len() as u32);
    for (index, (pattern, mime, flags)) in globs.iter().enumerate() {
        let entry = start + 4 + index * 12;
        let (pattern, mime) = (layout.string(pattern), layout.string(mime));
        layout.put(entry, pattern);
        layout.put(entry + 4, mime);
        layout.put(entry + 8, *flags);
    }
    start as u32
}

fn write_matchlets(layout: &mut Layout, matchlets: &[MatchletDefinition]) -> (u32, u32) {
    let start = layout.reserve(matchlets.len() * 32);
    for (index, matchlet) in matchlets.iter().enumerate() {
        let entry = start + index * 32;
        let value = layout.blob(&matchlet.value);
        let mask = matchlet.mask.as_deref().map_or(0, |mask| layout.blob(mask));
        let (count, first) = write_matchlets(layout, &matchlet.children);
        layout.put(entry, matchlet.offset);
        layout.put(entry + 4, matchlet.range_length);
        layout.put(entry + 8, matchlet.word_size);
        layout.put(entry + 12, matchlet.value.len() as u32);
        layout.put(entry + 16, value);
        layout.put(entry + 20, mask);
        layout.put(entry + 24, count);
        layout.put(entry + 28, first);
    }
    (matchlets.len() as u32, start as u32)
}

/// In-memory reversed-suffix trie, written out depth-first.
#[derive(Default)]
struct Trie {
    leaves: Vec<(String, u32)>,
    children: BTreeMap<char, Trie>,
}
impl Trie {
    /// Write this node's leaves and children as one sibling list.
    fn write_children(&self, layout: &mut Layout) -> (u32, u32) {
        let count = self.leaves.len() + self.children.len();
        let start = layout.reserve(count * 12);
        for (index, (mime, flags)) in self.leaves.iter().enumerate() {
            let entry = start + index * 12;
            let mime = layout.string(mime);
            layout.put(entry + 4, mime);
            layout.put(entry + 8, *flags);
        }
        for (index, (character, child)) in self.children.iter().enumerate() {
            let entry = start + (self.leaves.len() + index) * 12;
            let (child_count, first) = child.write_children(layout);
            layout.put(entry, u32::from(*character));
            layout.put(entry + 4, child_count);
            layout.put(entry + 8, first);
        }
        (count as u32, start as u32)
    }
}

#[derive(Default)]
struct Layout {
    out: Vec<u8>,
    strings: HashMap<String, u32>,
}
impl Layout {
    /// Append `len` zeroed bytes at the next aligned position.
    fn reserve(&mut self, len: usize) -> usize {
        self.out.resize(self.out.len().next_multiple_of(4), 0);
        let start = self.out.len();
        self.out.resize(start + len, 0);
        start
    }

    fn put(&mut self, at: usize, value: u32) {
        self.out[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn string(&mut self, value: &str) -> u32 {
        if let Some(offset) = self.strings.get(value) {
            return *offset;
        }
        let offset = self.out.len() as u32;
        self.out.extend_from_slice(value.as_bytes());
        self.out.push(0);
        self.strings.insert(value.to_string(), offset);
        offset
    }

    fn blob(&mut self, value: &[u8]) -> u32 {
        let offset = self.out.len() as u32;
        self.out.extend_from_slice(value);
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheHandle;
    use crate::section::{GlobRecord, SuffixNode};

    fn sample() -> CacheWriter {
        CacheWriter::new()
            .with(
                TypeDefinition::new("image/gif")
                    .glob("*.GIF")
                    .magic(MagicDefinition::new(50).matchlet(MatchletDefinition::string(0, "GIF8")))
                    .generic_icon("image-x-generic"),
            )
            .with(TypeDefinition::new("text/x-makefile").glob("Makefile").glob_with("[Mm]akefile.*", 50, true))
            .with(TypeDefinition::new("text/html").alias("text/x-html").parent("text/plain").delete_globs())
    }

    #[test]
    fn test_sections() {
        let handle = CacheHandle::from_bytes(sample().to_bytes()).unwrap();

        let aliases: Vec<_> = handle.aliases().valid().collect();
        assert_eq!(aliases.len(), 1);
        assert_eq!((aliases[0].alias, aliases[0].mime), ("text/x-html", "text/html"));

        let parents = handle.parents().get(0).unwrap();
        assert_eq!(parents.mime, "text/html");
        assert_eq!(parents.parents.get(0).unwrap().0, "text/plain");

        let literal = handle.literals().get(0).unwrap();
        assert_eq!(literal, GlobRecord { pattern: "makefile", mime: "text/x-makefile", weight: 50, case_sensitive: false });

        let globs: Vec<_> = handle.globs().valid().collect();
        assert_eq!(globs[0].pattern, "[Mm]akefile.*");
        assert!(globs[0].case_sensitive);
        assert_eq!((globs[1].pattern, globs[1].mime), (NO_GLOBS, "text/html"));

        let icon = handle.generic_icons().get(0).unwrap();
        assert_eq!((icon.mime, icon.icon), ("image/gif", "image-x-generic"));
        assert!(handle.icons().is_empty());
    }

    #[test]
    fn test_suffix_tree_is_reversed_and_lowercased() {
        let handle = CacheHandle::from_bytes(sample().to_bytes()).unwrap();
        let mut node = handle.suffix_tree().get(0).unwrap();
        let mut path = String::new();
        loop {
            match node {
                SuffixNode::Branch { character, children } => {
                    path.push(character);
                    node = children.get(0).unwrap();
                },
                SuffixNode::Leaf { mime, weight, case_sensitive } => {
                    assert_eq!((mime, weight, case_sensitive), ("image/gif", 50, false));
                    break;
                },
            }
        }
        assert_eq!(path, "fig.");
    }

    #[test]
    fn test_magic() {
        let rule = MagicDefinition::new(80).matchlet(
            MatchletDefinition::host16(4, 0xcafe).range(8).mask([0xff, 0x00]).child(MatchletDefinition::string(64, "x")),
        );
        let bytes = CacheWriter::new().with(TypeDefinition::new("application/x-test").magic(rule)).to_bytes();
        let handle = CacheHandle::from_bytes(bytes).unwrap();
        let magic = handle.magic();
        assert_eq!(magic.max_extent, 65);

        let entry = magic.matches.get(0).unwrap();
        assert_eq!((entry.priority, entry.mime), (80, "application/x-test"));
        let matchlet = entry.matchlets.get(0).unwrap();
        assert_eq!((matchlet.range_start, matchlet.range_length, matchlet.word_size), (4, 8, 2));
        assert_eq!(matchlet.value, &[0xca, 0xfe]);
        assert_eq!(matchlet.mask, Some(&[0xff, 0x00][..]));
        assert_eq!(matchlet.children.get(0).unwrap().value, b"x");
    }

    #[test]
    fn test_globs2_keeps_declaration_order() {
        let writer = CacheWriter::new()
            .with(TypeDefinition::new("image/jpeg").glob("*.jpg").glob("*.JPEG").glob("*.jpe"))
            .with(TypeDefinition::new("text/x-makefile").glob_with("Makefile", 80, true).delete_globs());
        let globs2 = writer.to_globs2();
        let lines: Vec<&str> = globs2.lines().skip(1).collect();
        assert_eq!(
            lines,
            [
                "80:text/x-makefile:Makefile:cs",
                "50:image/jpeg:*.jpg",
                "50:image/jpeg:*.jpeg",
                "50:image/jpeg:*.jpe",
                "50:text/x-makefile:__NOGLOBS__",
            ]
        );
    }

    #[test]
    fn test_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mime.cache");
        std::fs::write(&path, b"garbage").unwrap();
        sample().write(&path).unwrap();
        assert!(CacheHandle::open(&path).is_ok());
    }
}
