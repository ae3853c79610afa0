use crate::layer::ProviderLayer;
use crate::snapshot::LayerSnapshot;
use mimedb_config::Config;
use mimedb_glob::GlobMatchResult;
use mimedb_magic::{MAX_PRIORITY, Sniff};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// An ordered list of layers, most-local first, queried as one database.
///
/// Name matches are merged across layers with shadowing: a type matched by a
/// more-local layer ignores what less-local layers say about it, and a layer
/// that deletes a type's globs hides every less-local glob for that type.
/// Table lookups (aliases, parents, icons) are answered by the most-local
/// layer that has an entry. Invalid layers are skipped.
#[derive(Debug, Default)]
pub struct ProviderChain {
    layers: Vec<ProviderLayer>,
}
impl ProviderChain {
    pub fn new(layers: Vec<ProviderLayer>) -> Self {
        Self { layers }
    }

    pub fn from_config(config: &Config) -> Self {
        let interval = config.recheck_interval();
        Self::new(config.layers.iter().map(|layer| ProviderLayer::new(layer, interval)).collect())
    }

    pub fn layers(&self) -> &[ProviderLayer] {
        &self.layers
    }

    /// Usable layers, most-local first.
    fn snapshots(&self) -> Vec<Arc<LayerSnapshot>> {
        self.layers.iter().filter_map(ProviderLayer::snapshot).collect()
    }

    /// Every type whose patterns match `file_name`, merged across layers.
    #[instrument(level = "trace", skip(self))]
    pub fn lookup_by_name(&self, file_name: &str) -> GlobMatchResult {
        let snapshots = self.snapshots();
        let mut result = GlobMatchResult::new();
        for (index, snapshot) in snapshots.iter().enumerate() {
            let shadowing = &snapshots[..index];
            let candidates = snapshot
                .globs()
                .match_file_name(file_name)
                .into_iter()
                .filter(|candidate| !shadowing.iter().any(|local| local.globs().has_delete_all(&candidate.mime)));
            result.add_layer(candidates);
        }
        result
    }

    /// The most accurate sniff of any layer. On equal accuracy the
    /// most-local layer wins.
    #[instrument(level = "trace", skip_all, fields(len = data.len()))]
    pub fn lookup_by_content(&self, data: &[u8]) -> Option<Sniff> {
        let mut best: Option<Sniff> = None;
        for snapshot in self.snapshots() {
            let Some(sniff) = snapshot.magic().sniff(data) else {
                continue;
            };
            if best.as_ref().is_none_or(|best| sniff.accuracy > best.accuracy) {
                let certain = sniff.accuracy >= MAX_PRIORITY;
                best = Some(sniff);
                if certain {
                    break;
                }
            }
        }
        best
    }

    /// Whether any layer knows `mime` (no alias resolution).
    pub fn knows(&self, mime: &str) -> bool {
        self.snapshots().iter().any(|snapshot| snapshot.knows(mime))
    }

    /// Every type any layer knows, sorted and without duplicates. Alias
    /// names are included when a layer lists them.
    pub fn known_types(&self) -> Vec<String> {
        let mut known = BTreeSet::new();
        for snapshot in self.snapshots() {
            known.extend(snapshot.known_types().map(str::to_string));
        }
        known.into_iter().collect()
    }

    /// The canonical name `name` is an alias for, according to the most-local
    /// layer that defines it as an alias.
    pub fn alias_of(&self, name: &str) -> Option<String> {
        self.first(|snapshot| snapshot.aliases().canonical_of(name).map(str::to_string))
    }

    /// Aliases of `canonical` from the most-local layer declaring any.
    pub fn aliases_of(&self, canonical: &str) -> Vec<String> {
        self.first(|snapshot| Some(snapshot.aliases().aliases_of(canonical).to_vec()).filter(|found| !found.is_empty()))
            .unwrap_or_default()
    }

    /// Declared parents of `mime` from the most-local layer declaring any.
    pub fn parents_of(&self, mime: &str) -> Option<Vec<String>> {
        self.first(|snapshot| snapshot.parents().parents_of(mime).map(<[String]>::to_vec))
    }

    /// Patterns of `mime` across layers, most-local first and without
    /// duplicates. Layers less local than one deleting the type's globs are
    /// not consulted.
    pub fn glob_patterns(&self, mime: &str) -> Vec<String> {
        let mut patterns: Vec<String> = Vec::new();
        for snapshot in self.snapshots() {
            for pattern in snapshot.patterns_for(mime) {
                if !patterns.contains(pattern) {
                    patterns.push(pattern.clone());
                }
            }
            if snapshot.globs().has_delete_all(mime) {
                break;
            }
        }
        patterns
    }

    pub fn icon(&self, mime: &str) -> Option<String> {
        self.first(|snapshot| snapshot.icon(mime).map(str::to_string))
    }

    pub fn generic_icon(&self, mime: &str) -> Option<String> {
        self.first(|snapshot| snapshot.generic_icon(mime).map(str::to_string))
    }

    /// The type registered for XML documents whose root element is
    /// `local_name` in namespace `uri`.
    pub fn xml_namespace(&self, uri: &str, local_name: &str) -> Option<String> {
        self.first(|snapshot| snapshot.xml_namespace(uri, local_name).map(str::to_string))
    }

    /// Largest number of leading content bytes any layer's magic can inspect.
    pub fn max_extent(&self) -> usize {
        self.snapshots().iter().map(|snapshot| snapshot.magic().max_extent()).max().unwrap_or(0)
    }

    /// Force every layer to load again on its next use.
    #[instrument(level = "debug", skip(self))]
    pub fn reload(&self) {
        for layer in &self.layers {
            layer.invalidate();
        }
        tracing::debug!(layers = self.layers.len(), "Invalidated every MIME layer");
    }

    fn first<T>(&self, mut find: impl FnMut(&LayerSnapshot) -> Option<T>) -> Option<T> {
        self.layers.iter().filter_map(ProviderLayer::snapshot).find_map(|snapshot| find(&snapshot))
    }
}
