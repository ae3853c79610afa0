use mimedb_format::CacheHandle;
use std::collections::HashMap;
use tracing::instrument;

/// Alias to canonical name mapping of one layer.
///
/// Resolution is a single hop: an alias whose target is itself an alias is
/// not followed any further.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    canonical: HashMap<String, String>,
    aliases: HashMap<String, Vec<String>>,
}
impl AliasTable {
    /// Build from `(alias, canonical)` pairs. The first definition of an
    /// alias wins and self-aliases are ignored.
    pub fn from_pairs<A, C>(pairs: impl IntoIterator<Item = (A, C)>) -> Self
    where
        A: Into<String>,
        C: Into<String>,
    {
        let mut table = Self::default();
        for (alias, canonical) in pairs {
            table.insert(alias.into(), canonical.into());
        }
        table
    }

    #[instrument(level = "debug", skip_all, fields(path = ?handle.path()))]
    pub fn from_cache(handle: &CacheHandle) -> Self {
        Self::from_pairs(handle.aliases().valid().map(|record| (record.alias, record.mime)))
    }

    fn insert(&mut self, alias: String, canonical: String) {
        if alias == canonical || self.canonical.contains_key(&alias) {
            return;
        }
        self.aliases.entry(canonical.clone()).or_default().push(alias.clone());
        self.canonical.insert(alias, canonical);
    }

    /// The canonical name `alias` stands for, if it is an alias.
    pub fn canonical_of(&self, alias: &str) -> Option<&str> {
        self.canonical.get(alias).map(String::as_str)
    }

    /// The canonical name for `name`, or `name` itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical_of(name).unwrap_or(name)
    }

    /// Every alias declared for `canonical`, in declaration order.
    pub fn aliases_of(&self, canonical: &str) -> &[String] {
        self.aliases.get(canonical).map(Vec::as_slice).unwrap_or_default()
    }

    /// Canonical names that have at least one alias.
    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}
