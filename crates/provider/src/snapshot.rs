use mimedb_format::section::{IconRecord, Section};
use mimedb_format::{CacheHandle, NO_GLOBS, Stamp};
use mimedb_glob::GlobIndex;
use mimedb_hierarchy::{AliasTable, ParentGraph};
use mimedb_magic::MagicIndex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Everything one layer knows, as loaded at one point in time.
///
/// The cache is mapped when the snapshot is created; each index is built from
/// it the first time a query needs it and never changes afterwards.
#[derive(Debug)]
pub struct LayerSnapshot {
    cache: Option<CacheHandle>,
    stamp: Stamp,
    listed: HashSet<String>,
    /// Patterns per type as listed in `globs2`, which the cache does not keep in order.
    glob_order: HashMap<String, Vec<String>>,
    globs: OnceLock<GlobIndex>,
    magic: OnceLock<MagicIndex>,
    aliases: OnceLock<AliasTable>,
    parents: OnceLock<ParentGraph>,
    known: OnceLock<HashSet<String>>,
    icons: OnceLock<Icons>,
    namespaces: OnceLock<HashMap<(String, String), String>>,
}

#[derive(Debug, Default)]
struct Icons {
    icons: HashMap<String, String>,
    generic: HashMap<String, String>,
}

impl LayerSnapshot {
    pub(crate) fn new(cache: Option<CacheHandle>, stamp: Stamp, listed: HashSet<String>) -> Self {
        Self {
            cache,
            stamp,
            listed,
            glob_order: HashMap::new(),
            globs: OnceLock::new(),
            magic: OnceLock::new(),
            aliases: OnceLock::new(),
            parents: OnceLock::new(),
            known: OnceLock::new(),
            icons: OnceLock::new(),
            namespaces: OnceLock::new(),
        }
    }

    pub(crate) fn with_glob_order(mut self, glob_order: HashMap<String, Vec<String>>) -> Self {
        self.glob_order = glob_order;
        self
    }

    /// The mapped cache, or `None` for a layer without one.
    pub fn cache(&self) -> Option<&CacheHandle> {
        self.cache.as_ref()
    }

    /// File state this snapshot was loaded from.
    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn globs(&self) -> &GlobIndex {
        self.globs.get_or_init(|| self.cache.as_ref().map(GlobIndex::from_cache).unwrap_or_default())
    }

    pub fn magic(&self) -> &MagicIndex {
        self.magic.get_or_init(|| self.cache.as_ref().map(MagicIndex::from_cache).unwrap_or_default())
    }

    pub fn aliases(&self) -> &AliasTable {
        self.aliases.get_or_init(|| self.cache.as_ref().map(AliasTable::from_cache).unwrap_or_default())
    }

    pub fn parents(&self) -> &ParentGraph {
        self.parents.get_or_init(|| self.cache.as_ref().map(ParentGraph::from_cache).unwrap_or_default())
    }

    /// Patterns of `mime` in declaration order when the layer lists them,
    /// otherwise in index order.
    pub fn patterns_for(&self, mime: &str) -> &[String] {
        match self.glob_order.get(mime) {
            Some(declared) => declared,
            None => self.globs().patterns_for(mime),
        }
    }

    /// Whether any section of this layer, or its `types` list, mentions `mime`.
    pub fn knows(&self, mime: &str) -> bool {
        self.known().contains(mime)
    }

    /// Every type this layer mentions, in no particular order.
    pub fn known_types(&self) -> impl Iterator<Item = &str> {
        self.known().iter().map(String::as_str)
    }

    fn known(&self) -> &HashSet<String> {
        self.known.get_or_init(|| self.collect_known())
    }

    fn collect_known(&self) -> HashSet<String> {
        let mut known = self.listed.clone();
        known.extend(self.globs().mime_types().map(str::to_string));
        known.extend(self.magic().mime_types().map(str::to_string));
        known.extend(self.aliases().canonical_names().map(str::to_string));
        known.extend(self.parents().names().map(str::to_string));
        let icons = self.icons();
        known.extend(icons.icons.keys().chain(icons.generic.keys()).cloned());
        known.extend(self.namespaces().values().cloned());
        known
    }

    pub fn icon(&self, mime: &str) -> Option<&str> {
        self.icons().icons.get(mime).map(String::as_str)
    }

    pub fn generic_icon(&self, mime: &str) -> Option<&str> {
        self.icons().generic.get(mime).map(String::as_str)
    }

    fn icons(&self) -> &Icons {
        self.icons.get_or_init(|| {
            let Some(cache) = &self.cache else {
                return Icons::default();
            };
            let collect = |records: Section<'_, IconRecord<'_>>| {
                let mut map = HashMap::new();
                for record in records.valid() {
                    map.entry(record.mime.to_string()).or_insert_with(|| record.icon.to_string());
                }
                map
            };
            Icons { icons: collect(cache.icons()), generic: collect(cache.generic_icons()) }
        })
    }

    /// The type of XML documents whose root element is `local_name` in the
    /// `uri` namespace.
    pub fn xml_namespace(&self, uri: &str, local_name: &str) -> Option<&str> {
        self.namespaces().get(&(uri.to_string(), local_name.to_string())).map(String::as_str)
    }

    fn namespaces(&self) -> &HashMap<(String, String), String> {
        self.namespaces.get_or_init(|| {
            let mut map = HashMap::new();
            for record in self.cache.iter().flat_map(|cache| cache.namespaces().valid()) {
                map.entry((record.uri.to_string(), record.local_name.to_string()))
                    .or_insert_with(|| record.mime.to_string());
            }
            map
        })
    }
}

/// Read a layer's `types` file: one type name per line. A missing file is an
/// empty list.
pub(crate) fn read_type_list(path: &Path) -> HashSet<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = ?err, "Could not read type list");
            HashSet::new()
        },
    }
}

/// Read a layer's `globs2` file into each type's patterns, in file order.
/// Deletion markers and malformed lines are skipped; a missing file is empty.
pub(crate) fn read_glob_order(path: &Path) -> HashMap<String, Vec<String>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = ?err, "Could not read glob list");
            return HashMap::new();
        },
    };
    let mut order: HashMap<String, Vec<String>> = HashMap::new();
    for line in contents.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#')) {
        let mut fields = line.splitn(4, ':');
        let (Some(_weight), Some(mime), Some(pattern)) = (fields.next(), fields.next(), fields.next()) else {
            continue;
        };
        if pattern.is_empty() || pattern == NO_GLOBS {
            continue;
        }
        let patterns = order.entry(mime.to_string()).or_default();
        if !patterns.iter().any(|known| known == pattern) {
            patterns.push(pattern.to_string());
        }
    }
    order
}
