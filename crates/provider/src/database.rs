use crate::chain::ProviderChain;
use crate::error::{ErrorKind, Result};
use crate::fallback::{self, DIRECTORY};
use crate::peek::PeekableReader;
use exn::ResultExt;
use mimedb_config::{Config, DEFAULT_SNIFF_BUFFER_SIZE};
use mimedb_format::PatternKind;
use mimedb_glob::{GlobMatch, GlobMatchResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::instrument;

/// A type matched by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub mime: String,
    pub weight: u8,
    /// The pattern that matched; `*` plus the suffix for suffix matches.
    pub pattern: String,
}

/// A type recognised by content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMatch {
    pub mime: String,
    /// 0-100; magic matches report their rule priority.
    pub accuracy: u8,
}

/// The query surface over a [`ProviderChain`].
///
/// Every answer uses canonical type names. Queries never fail: layers that
/// cannot be read are skipped, and when nothing matches the generic
/// fallbacks (`application/octet-stream`, `text/plain`) are used.
#[derive(Debug)]
pub struct MimeDatabase {
    chain: ProviderChain,
    sniff_buffer_size: usize,
}
impl MimeDatabase {
    pub fn new(chain: ProviderChain) -> Self {
        Self { chain, sniff_buffer_size: DEFAULT_SNIFF_BUFFER_SIZE }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ProviderChain::from_config(config)).with_sniff_buffer_size(config.sniff_buffer_size)
    }

    /// How many bytes [`classify_reader`](Self::classify_reader) reads
    /// before sniffing, unless a loaded magic rule looks further.
    pub fn with_sniff_buffer_size(mut self, size: usize) -> Self {
        self.sniff_buffer_size = size.max(1);
        self
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Types whose patterns match the last component of `file_name`, best
    /// first. Types tying on weight, pattern kind and pattern length keep the
    /// most-local layer's order.
    #[instrument(level = "debug", skip(self))]
    pub fn classify_by_name(&self, file_name: &str) -> Vec<NameMatch> {
        let mut matches = self.name_matches(file_name);
        matches.sort_by(|a, b| b.rank().cmp(&a.rank()));
        matches
            .into_iter()
            .map(|found| NameMatch {
                mime: found.mime.to_string(),
                weight: found.weight,
                pattern: found.pattern.to_string(),
            })
            .collect()
    }

    /// The type the content looks like, if any magic rule matches.
    #[instrument(level = "debug", skip_all, fields(len = data.len()))]
    pub fn classify_by_content(&self, data: &[u8]) -> Option<ContentMatch> {
        let sniff = self.chain.lookup_by_content(data)?;
        Some(ContentMatch { mime: self.resolve_alias(&sniff.mime), accuracy: sniff.accuracy })
    }

    /// Like [`classify_by_content`](Self::classify_by_content), but always
    /// answers: empty content, text-like content and everything else get the
    /// generic types.
    pub fn sniff_content(&self, data: &[u8]) -> ContentMatch {
        settle_content(self.classify_by_content(data), data)
    }

    /// The single best type for a file, using its name first and its content
    /// to settle ambiguous or missing name matches.
    #[instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub fn classify(&self, file_name: &str, data: &[u8]) -> String {
        self.decide(&self.name_matches(file_name), data)
    }

    /// Classify a file on disk. Directories are `inode/directory` and other
    /// special files get their `inode/*` type; regular files are classified
    /// by name and content.
    #[instrument(level = "debug", skip(self), fields(path = %path.as_ref().display()))]
    pub fn classify_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
        };
        if let Some(special) = special_file_type(&metadata) {
            return Ok(special.to_string());
        }
        let file_name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
        let file = File::open(path).or_raise(|| ErrorKind::Io)?;
        self.classify_reader(&file_name, file)
    }

    /// Classify a stream, reading only as much of it as sniffing needs.
    pub fn classify_reader<R: Read>(&self, file_name: &str, reader: R) -> Result<String> {
        let candidates = self.name_matches(file_name);
        if let [only] = candidates.as_slice() {
            return Ok(only.mime.to_string());
        }
        let limit = self.sniff_buffer_size.max(self.chain.max_extent());
        let mut peekable = PeekableReader::new(reader);
        let head = peekable.peek(limit)?;
        Ok(self.decide(&candidates, head))
    }

    /// Pick one type from the name matches, sniffing `data` at most once.
    fn decide(&self, candidates: &[GlobMatch], data: &[u8]) -> String {
        if let [only] = candidates {
            return only.mime.to_string();
        }

        let sniffed = self.classify_by_content(data);
        if let Some(sniffed) = sniffed.as_ref().filter(|sniffed| sniffed.accuracy > 0) {
            if best_of(candidates).iter().any(|candidate| *candidate.mime == sniffed.mime) {
                return sniffed.mime.clone();
            }
            if let Some(child) = candidates.iter().find(|candidate| self.inherits(&candidate.mime, &sniffed.mime)) {
                return child.mime.to_string();
            }
            if candidates.is_empty() {
                return sniffed.mime.clone();
            }
        }

        let mut best: Vec<&str> = best_of(candidates).iter().map(|candidate| &*candidate.mime).collect();
        best.sort_unstable();
        match best.first() {
            Some(first) => first.to_string(),
            None => settle_content(sniffed, data).mime,
        }
    }

    /// Whether `name`, or the type it is an alias for, is defined anywhere.
    pub fn is_known_type(&self, name: &str) -> bool {
        self.chain.knows(&self.resolve_alias(name)) || self.chain.knows(name)
    }

    /// The canonical name for `name`. Only one alias hop is followed.
    pub fn resolve_alias(&self, name: &str) -> String {
        self.chain.alias_of(name).unwrap_or_else(|| name.to_string())
    }

    /// Every canonical type defined in any layer, sorted.
    #[instrument(level = "debug", skip(self))]
    pub fn all_mime_types(&self) -> Vec<String> {
        let mut types = self.chain.known_types();
        types.retain(|mime| self.chain.alias_of(mime).is_none());
        types
    }

    /// Other names `name` is known by.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        self.chain.aliases_of(&self.resolve_alias(name))
    }

    /// Direct parents in declaration order, or the implicit parent when no
    /// layer declares any.
    pub fn parents_of(&self, name: &str) -> Vec<String> {
        let mime = self.resolve_alias(name);
        match self.chain.parents_of(&mime) {
            Some(parents) => parents.iter().map(|parent| self.resolve_alias(parent)).collect(),
            None => fallback::implicit_parent(&mime).map(str::to_string).into_iter().collect(),
        }
    }

    /// Every ancestor of `name`, breadth-first and without repeats.
    #[instrument(level = "debug", skip(self))]
    pub fn ancestors_of(&self, name: &str) -> Vec<String> {
        mimedb_hierarchy::ancestors(&self.resolve_alias(name), |mime| self.parents_of(mime))
    }

    /// Whether `name` is `ancestor` or a descendant of it.
    pub fn inherits(&self, name: &str, ancestor: &str) -> bool {
        let (name, ancestor) = (self.resolve_alias(name), self.resolve_alias(ancestor));
        name == ancestor || self.ancestors_of(&name).contains(&ancestor)
    }

    /// File name patterns of `name` across layers, most-local first.
    pub fn glob_patterns(&self, name: &str) -> Vec<String> {
        self.chain.glob_patterns(&self.resolve_alias(name))
    }

    /// The extension usually given to files of type `name`: the first
    /// `*.ext` pattern without the `*.`, or an empty string when the type
    /// has no plain suffix pattern.
    pub fn preferred_suffix(&self, name: &str) -> String {
        self.glob_patterns(name)
            .iter()
            .find(|pattern| pattern.starts_with("*.") && PatternKind::of(pattern) == PatternKind::Suffix)
            .map(|pattern| pattern[2..].to_string())
            .unwrap_or_default()
    }

    /// The extension of `file_name` according to its best suffix match,
    /// case preserved: `Archive.TAR.GZ` gives `TAR.GZ`.
    pub fn suffix_for_file_name(&self, file_name: &str) -> Option<String> {
        let file_name = base_name(file_name);
        let mut suffixes: Vec<GlobMatch> = self
            .chain
            .lookup_by_name(file_name)
            .all()
            .iter()
            .filter(|found| found.kind == PatternKind::Suffix && found.pattern.starts_with("*."))
            .cloned()
            .collect();
        suffixes.sort_by(|a, b| b.rank().cmp(&a.rank()));
        let length = suffixes.first()?.pattern.chars().count() - 2;
        let start = file_name.char_indices().rev().nth(length.checked_sub(1)?)?.0;
        Some(file_name[start..].to_string())
    }

    pub fn icon_name(&self, name: &str) -> Option<String> {
        self.chain.icon(&self.resolve_alias(name))
    }

    pub fn generic_icon_name(&self, name: &str) -> Option<String> {
        self.chain.generic_icon(&self.resolve_alias(name))
    }

    /// The type of XML documents with root element `local_name` in the
    /// `uri` namespace.
    pub fn type_for_xml_namespace(&self, uri: &str, local_name: &str) -> Option<String> {
        self.chain.xml_namespace(uri, local_name).map(|mime| self.resolve_alias(&mime))
    }

    /// Forget every loaded layer; the next query reads the caches again.
    pub fn reload(&self) {
        self.chain.reload();
    }

    /// Name matches with alias-resolved types, each type once.
    fn name_matches(&self, file_name: &str) -> Vec<GlobMatch> {
        let result = self.chain.lookup_by_name(base_name(file_name));
        let mut resolved = GlobMatchResult::new();
        resolved.add_layer(
            result
                .all()
                .iter()
                .map(|found| GlobMatch { mime: self.resolve_alias(&found.mime).into(), ..found.clone() }),
        );
        resolved.all().to_vec()
    }
}

/// A magic match for non-empty content, otherwise the generic guess.
fn settle_content(sniffed: Option<ContentMatch>, data: &[u8]) -> ContentMatch {
    match sniffed {
        Some(found) if !data.is_empty() => found,
        _ => {
            let (mime, accuracy) = fallback::guess_content(data);
            ContentMatch { mime: mime.to_string(), accuracy }
        },
    }
}

/// The matches sharing the best rank, in discovery order.
fn best_of(candidates: &[GlobMatch]) -> Vec<&GlobMatch> {
    let Some(top) = candidates.iter().map(GlobMatch::rank).max() else {
        return Vec::new();
    };
    candidates.iter().filter(|candidate| candidate.rank() == top).collect()
}

/// The last path component; glob patterns never see directories.
fn base_name(file_name: &str) -> &str {
    file_name.rsplit('/').next().unwrap_or(file_name)
}

#[cfg(unix)]
fn special_file_type(metadata: &std::fs::Metadata) -> Option<&'static str> {
    use std::os::unix::fs::FileTypeExt;
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        Some(DIRECTORY)
    } else if file_type.is_char_device() {
        Some("inode/chardevice")
    } else if file_type.is_block_device() {
        Some("inode/blockdevice")
    } else if file_type.is_fifo() {
        Some("inode/fifo")
    } else if file_type.is_socket() {
        Some("inode/socket")
    } else {
        None
    }
}

#[cfg(not(unix))]
fn special_file_type(metadata: &std::fs::Metadata) -> Option<&'static str> {
    metadata.is_dir().then_some(DIRECTORY)
}
