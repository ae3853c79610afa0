use crate::error::{ErrorKind, Result};
use crate::reader::Reader;
use crate::{HEADER_SIZE, MAJOR_VERSION};

/// Offsets of every section table, as declared by the header.
///
/// Offsets are absolute positions in the cache file. The two icon sections
/// are optional and an offset of zero means "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionOffsets {
    pub aliases: u32,
    pub parents: u32,
    pub literals: u32,
    pub suffix_tree: u32,
    pub globs: u32,
    pub magic: u32,
    pub namespaces: u32,
    pub icons: u32,
    pub generic_icons: u32,
}
impl SectionOffsets {
    fn mandatory(&self) -> [u32; 7] {
        [self.aliases, self.parents, self.literals, self.suffix_tree, self.globs, self.magic, self.namespaces]
    }
}

/// The fixed 40-byte header at the start of every cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub major: u16,
    pub minor: u16,
    pub sections: SectionOffsets,
}
impl Header {
    /// Parse and sanity-check the header.
    ///
    /// This does not look at the section tables themselves; see
    /// [`CacheHandle`](crate::CacheHandle) for full validation.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            exn::bail!(ErrorKind::Truncated { needed: HEADER_SIZE, len: data.len() });
        }
        let reader = Reader::new(data);
        let major = reader.u16(0)?;
        let minor = reader.u16(2)?;
        let sections = SectionOffsets {
            aliases: reader.u32(4)?,
            parents: reader.u32(8)?,
            literals: reader.u32(12)?,
            suffix_tree: reader.u32(16)?,
            globs: reader.u32(20)?,
            magic: reader.u32(24)?,
            namespaces: reader.u32(28)?,
            icons: reader.u32(32)?,
            generic_icons: reader.u32(36)?,
        };
        if (major, minor) == (0, 0) || sections.mandatory().iter().any(|offset| (*offset as usize) < HEADER_SIZE) {
            exn::bail!(ErrorKind::BadMagic);
        }
        if major != MAJOR_VERSION {
            exn::bail!(ErrorKind::UnsupportedVersion { major, minor });
        }
        for offset in sections.mandatory() {
            if offset as usize >= data.len() {
                exn::bail!(ErrorKind::Truncated { needed: offset as usize + 4, len: data.len() });
            }
        }

        Ok(Self { major, minor, sections })
    }

    /// Serialize into the on-disk representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.major.to_be_bytes());
        out[2..4].copy_from_slice(&self.minor.to_be_bytes());
        let offsets = [
            self.sections.aliases,
            self.sections.parents,
            self.sections.literals,
            self.sections.suffix_tree,
            self.sections.globs,
            self.sections.magic,
            self.sections.namespaces,
            self.sections.icons,
            self.sections.generic_icons,
        ];
        for (index, offset) in offsets.iter().enumerate() {
            let start = 4 + index * 4;
            out[start..start + 4].copy_from_slice(&offset.to_be_bytes());
        }
        out
    }
}
