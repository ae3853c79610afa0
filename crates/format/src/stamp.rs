use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// What was on disk for one file when a [`Stamp`] was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampEntry {
    pub path: PathBuf,
    /// `None` when the file did not exist (or could not be inspected).
    pub modified: Option<OffsetDateTime>,
    pub len: Option<u64>,
}
impl StampEntry {
    fn capture(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        let modified = metadata.as_ref().and_then(|metadata| metadata.modified().ok()).map(OffsetDateTime::from);
        Self { path: path.to_path_buf(), modified, len: metadata.map(|metadata| metadata.len()) }
    }
}

/// Modification times of a cache file and its companion files, captured
/// together.
///
/// Two stamps compare equal when none of the files appeared, disappeared,
/// changed size or changed modification time in between. The first entry is
/// always the cache file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    entries: Vec<StampEntry>,
}
impl Stamp {
    pub fn capture(primary: &Path, companions: &[PathBuf]) -> Self {
        let entries = std::iter::once(primary).chain(companions.iter().map(PathBuf::as_path)).map(StampEntry::capture);
        Self { entries: entries.collect() }
    }

    /// Whether the primary file existed at capture time.
    pub fn exists(&self) -> bool {
        self.entries.first().is_some_and(|entry| entry.len.is_some())
    }

    /// Modification time of the primary file.
    pub fn modified(&self) -> Option<OffsetDateTime> {
        self.entries.first().and_then(|entry| entry.modified)
    }

    pub fn entries(&self) -> &[StampEntry] {
        &self.entries
    }

    /// Re-inspect the same files and report whether anything changed.
    pub fn is_outdated(&self) -> bool {
        self.entries.iter().any(|entry| StampEntry::capture(&entry.path) != *entry)
    }
}
