use crate::matchlet::{matches_at, to_host_order, Matchlet};
use mimedb_format::CacheHandle;
use mimedb_format::section::{MatchletRecord, Section};
use std::ops::Range;
use std::sync::Arc;
use tracing::instrument;

/// Deepest matchlet nesting accepted when reading a cache.
const MAX_MATCHLET_DEPTH: usize = 64;
/// Highest priority a magic rule can express.
pub const MAX_PRIORITY: u8 = 100;

/// A magic rule as an AND-chain of matchlets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicRule {
    pub mime: Arc<str>,
    pub priority: u8,
    /// All of these must match.
    pub matchlets: Vec<Matchlet>,
}
impl MagicRule {
    pub fn new(mime: impl Into<Arc<str>>, priority: u8) -> Self {
        Self { mime: mime.into(), priority: priority.min(MAX_PRIORITY), matchlets: Vec::new() }
    }

    pub fn matchlet(mut self, matchlet: Matchlet) -> Self {
        self.matchlets.push(matchlet);
        self
    }
}

/// The outcome of a successful sniff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sniff {
    pub mime: Arc<str>,
    /// Priority of the rule that matched, 0-100.
    pub accuracy: u8,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    min_offset: usize,
    max_offset: usize,
    value: (usize, usize),
    mask: Option<usize>,
}

#[derive(Debug, Clone)]
struct Rule {
    mime: Arc<str>,
    priority: u8,
    chain: Range<usize>,
}

/// Every magic rule of one layer, flattened for sniffing.
///
/// Matchlets live in one arena and their values and masks in one byte
/// buffer; a rule is a range of indices into the arena. A matchlet tree from
/// a cache becomes one rule per root-to-leaf path, with shared ancestors
/// stored once.
#[derive(Debug, Clone, Default)]
pub struct MagicIndex {
    bytes: Vec<u8>,
    slots: Vec<Slot>,
    chains: Vec<usize>,
    rules: Vec<Rule>,
    max_extent: usize,
}
impl MagicIndex {
    pub fn from_rules(rules: impl IntoIterator<Item = MagicRule>) -> Self {
        let mut builder = Builder::default();
        for rule in rules {
            let chain: Vec<usize> = rule
                .matchlets
                .iter()
                .map(|m| builder.slot(m.min_offset(), m.max_offset(), &m.value, m.mask.as_deref()))
                .collect();
            builder.rule(&rule.mime, rule.priority, &chain);
        }
        builder.build(0)
    }

    #[instrument(level = "debug", skip_all, fields(path = ?handle.path()))]
    pub fn from_cache(handle: &CacheHandle) -> Self {
        let magic = handle.magic();
        let mut builder = Builder::default();
        let mut budget = handle.as_bytes().len() / 32 + 1;
        for record in magic.matches.valid() {
            let priority = record.priority.min(u32::from(MAX_PRIORITY)) as u8;
            let mime: Arc<str> = record.mime.into();
            flatten(&mut builder, record.matchlets, &mut Vec::new(), &mut budget, &mime, priority);
        }
        let index = builder.build(magic.max_extent as usize);
        tracing::debug!(rules = index.rules.len(), matchlets = index.slots.len(), "Indexed magic rules");
        index
    }

    /// The highest-priority rule matching `data`; on equal priority the
    /// rule declared first wins.
    #[instrument(level = "trace", skip_all, fields(len = data.len()))]
    pub fn sniff(&self, data: &[u8]) -> Option<Sniff> {
        let rule = self
            .rules
            .iter()
            .find(|rule| self.chains[rule.chain.clone()].iter().all(|slot| self.test(*slot, data)))?;
        Some(Sniff { mime: rule.mime.clone(), accuracy: rule.priority })
    }

    fn test(&self, slot: usize, data: &[u8]) -> bool {
        let slot = &self.slots[slot];
        let (start, len) = slot.value;
        let value = &self.bytes[start..start + len];
        let mask = slot.mask.map(|mask| &self.bytes[mask..mask + len]);
        matches_at(data, slot.min_offset, slot.max_offset, value, mask)
    }

    /// Number of leading bytes any rule can look at.
    pub fn max_extent(&self) -> usize {
        self.max_extent
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| &*rule.mime)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Emit one rule for every root-to-leaf path below `matchlets`.
fn flatten(
    builder: &mut Builder,
    matchlets: Section<'_, MatchletRecord<'_>>,
    path: &mut Vec<usize>,
    budget: &mut usize,
    mime: &Arc<str>,
    priority: u8,
) {
    for record in matchlets.valid() {
        if *budget == 0 {
            tracing::warn!(mime = %mime, "Magic rules visit more matchlets than the cache can hold; ignoring the rest");
            return;
        }
        *budget -= 1;
        let Some(slot) = builder.cache_slot(&record, mime) else {
            continue;
        };
        path.push(slot);
        if record.children.is_empty() {
            builder.rule(mime, priority, path);
        } else if path.len() >= MAX_MATCHLET_DEPTH {
            tracing::warn!(mime = %mime, depth = path.len(), "Magic rule nests too deeply; pruning");
        } else {
            flatten(builder, record.children, path, budget, mime, priority);
        }
        path.pop();
    }
}

#[derive(Default)]
struct Builder {
    index: MagicIndex,
}
impl Builder {
    fn slot(&mut self, min_offset: usize, max_offset: usize, value: &[u8], mask: Option<&[u8]>) -> usize {
        let bytes = &mut self.index.bytes;
        let start = bytes.len();
        bytes.extend_from_slice(value);
        // A mask of the wrong length cannot be applied; compare unmasked instead.
        let mask = mask.filter(|mask| mask.len() == value.len()).map(|mask| {
            let offset = bytes.len();
            bytes.extend_from_slice(mask);
            offset
        });
        self.index.max_extent = self.index.max_extent.max(max_offset.saturating_add(value.len()));
        self.index.slots.push(Slot { min_offset, max_offset, value: (start, value.len()), mask });
        self.index.slots.len() - 1
    }

    fn cache_slot(&mut self, record: &MatchletRecord<'_>, mime: &str) -> Option<usize> {
        if record.value.is_empty() {
            tracing::warn!(mime, "Skipping matchlet with an empty value");
            return None;
        }
        let unusable =
            || tracing::warn!(mime, word_size = record.word_size, "Skipping matchlet with an unusable word size");
        let Some(value) = to_host_order(record.value, record.word_size) else {
            unusable();
            return None;
        };
        let mask = match record.mask.map(|mask| to_host_order(mask, record.word_size)) {
            None => None,
            Some(Some(mask)) => Some(mask),
            Some(None) => {
                unusable();
                return None;
            },
        };
        let min_offset = record.range_start as usize;
        let max_offset = min_offset.saturating_add(record.range_length.max(1) as usize - 1);
        Some(self.slot(min_offset, max_offset, &value, mask.as_deref()))
    }

    fn rule(&mut self, mime: &Arc<str>, priority: u8, chain: &[usize]) {
        if chain.is_empty() {
            tracing::warn!(mime = %mime, "Skipping magic rule without matchlets");
            return;
        }
        let start = self.index.chains.len();
        self.index.chains.extend_from_slice(chain);
        self.index.rules.push(Rule { mime: mime.clone(), priority, chain: start..self.index.chains.len() });
    }

    fn build(mut self, declared_extent: usize) -> MagicIndex {
        // Stable: equal priorities keep declaration order.
        self.index.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.index.max_extent = self.index.max_extent.max(declared_extent);
        self.index
    }
}
