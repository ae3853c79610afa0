use crate::error::{ErrorKind, Result};
use crate::header::Header;
use crate::reader::Reader;
use crate::section::{
    AliasRecord, GlobRecord, IconRecord, MagicSection, NamespaceRecord, ParentRecord, Record, Section, SuffixNode,
};
use crate::stamp::Stamp;
use crate::HEADER_SIZE;
use exn::ResultExt;
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::instrument;

enum Bytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}
impl Deref for Bytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Bytes::Mapped(map) => &map[..],
            Bytes::Owned(bytes) => bytes.as_slice(),
        }
    }
}

/// Validated `(start, count)` of every section table.
#[derive(Debug, Clone, Copy, Default)]
struct Tables {
    aliases: (usize, usize),
    parents: (usize, usize),
    literals: (usize, usize),
    suffix_roots: (usize, usize),
    globs: (usize, usize),
    magic: (usize, usize),
    max_extent: u32,
    namespaces: (usize, usize),
    icons: (usize, usize),
    generic_icons: (usize, usize),
}
impl Tables {
    fn locate(data: &[u8], header: &Header) -> Result<Self> {
        let reader = Reader::new(data);
        let sections = &header.sections;
        let magic = MagicSection::read(reader, sections.magic as usize)?;
        Ok(Self {
            aliases: Section::<AliasRecord>::counted(reader, sections.aliases as usize)?.extent(),
            parents: Section::<ParentRecord>::counted(reader, sections.parents as usize)?.extent(),
            literals: Section::<GlobRecord>::counted(reader, sections.literals as usize)?.extent(),
            suffix_roots: Section::<SuffixNode>::indirect(reader, sections.suffix_tree as usize)?.extent(),
            globs: Section::<GlobRecord>::counted(reader, sections.globs as usize)?.extent(),
            magic: magic.matches.extent(),
            max_extent: magic.max_extent,
            namespaces: Section::<NamespaceRecord>::counted(reader, sections.namespaces as usize)?.extent(),
            icons: Self::optional(reader, sections.icons)?,
            generic_icons: Self::optional(reader, sections.generic_icons)?,
        })
    }

    /// Icon sections are absent (offset zero) in older caches.
    fn optional(reader: Reader<'_>, offset: u32) -> Result<(usize, usize)> {
        match offset {
            0 => Ok((0, 0)),
            offset => Ok(Section::<IconRecord>::counted(reader, offset as usize)?.extent()),
        }
    }
}

/// An opened, validated cache file.
///
/// Files are memory-mapped and never copied; section accessors hand out
/// views that borrow from the handle. Opening validates the header and the
/// extent of every section table, so afterwards only individual records can
/// still turn out to be malformed.
pub struct CacheHandle {
    path: Option<PathBuf>,
    bytes: Bytes,
    header: Header,
    tables: Tables,
    stamp: Option<Stamp>,
}
impl CacheHandle {
    /// Open and validate the cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_stamps(path, &[])
    }

    /// Open the cache at `path`, additionally recording the modification
    /// times of `stamp_files` for staleness checks.
    #[instrument(level = "debug", skip(stamp_files), fields(path = %path.as_ref().display()))]
    pub fn open_with_stamps(path: impl AsRef<Path>, stamp_files: &[PathBuf]) -> Result<Self> {
        let path = path.as_ref();
        // Stamp before mapping: a rewrite racing with the open shows up as stale later rather than being missed.
        let stamp = Stamp::capture(path, stamp_files);
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) => return Err(err).or_raise(|| ErrorKind::Io),
        };
        let len = file.metadata().or_raise(|| ErrorKind::Io)?.len() as usize;
        if len < HEADER_SIZE {
            exn::bail!(ErrorKind::Truncated { needed: HEADER_SIZE, len });
        }
        // SAFETY: the map is read-only and cache generators replace the file by rename rather than writing in
        // place. Every access goes through the bounds-checked `Reader`.
        let map = unsafe { Mmap::map(&file) }.or_raise(|| ErrorKind::Io)?;
        let handle = Self::new(Some(path.to_path_buf()), Bytes::Mapped(map), Some(stamp))?;
        tracing::debug!(major = handle.header.major, minor = handle.header.minor, len, "Opened MIME cache");
        Ok(handle)
    }

    /// Validate an in-memory cache image.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(None, Bytes::Owned(bytes.into()), None)
    }

    fn new(path: Option<PathBuf>, bytes: Bytes, stamp: Option<Stamp>) -> Result<Self> {
        let header = Header::parse(&bytes)?;
        let tables = Tables::locate(&bytes, &header)?;
        Ok(Self { path, bytes, header, tables, stamp })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// File state captured when the handle was opened; `None` for in-memory caches.
    pub fn stamp(&self) -> Option<&Stamp> {
        self.stamp.as_ref()
    }

    /// Whether the file (or any stamp file) changed since the handle was
    /// opened. In-memory caches are never stale.
    pub fn is_stale(&self) -> bool {
        self.stamp.as_ref().is_some_and(Stamp::is_outdated)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    fn section<'a, T: Record<'a>>(&'a self, (start, count): (usize, usize)) -> Section<'a, T> {
        Section::raw(Reader::new(&self.bytes), start, count)
    }

    pub fn aliases(&self) -> Section<'_, AliasRecord<'_>> {
        self.section(self.tables.aliases)
    }

    pub fn parents(&self) -> Section<'_, ParentRecord<'_>> {
        self.section(self.tables.parents)
    }

    pub fn literals(&self) -> Section<'_, GlobRecord<'_>> {
        self.section(self.tables.literals)
    }

    /// Root nodes of the reversed-suffix tree.
    pub fn suffix_tree(&self) -> Section<'_, SuffixNode<'_>> {
        self.section(self.tables.suffix_roots)
    }

    pub fn globs(&self) -> Section<'_, GlobRecord<'_>> {
        self.section(self.tables.globs)
    }

    pub fn magic(&self) -> MagicSection<'_> {
        MagicSection { max_extent: self.tables.max_extent, matches: self.section(self.tables.magic) }
    }

    pub fn namespaces(&self) -> Section<'_, NamespaceRecord<'_>> {
        self.section(self.tables.namespaces)
    }

    /// Icon names; empty when the cache predates icon support.
    pub fn icons(&self) -> Section<'_, IconRecord<'_>> {
        self.section(self.tables.icons)
    }

    /// Generic icon names; empty when the cache predates icon support.
    pub fn generic_icons(&self) -> Section<'_, IconRecord<'_>> {
        self.section(self.tables.generic_icons)
    }
}
impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}
