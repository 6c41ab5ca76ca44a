//! OpenType table access
//!
//! Bounds-checked readers for the handful of tables the engine decodes
//! itself: font header metrics, embedded bitmap strikes, kerning pairs,
//! device metrics (VDMX) and vertical glyph substitution (GSUB).

pub mod reader;
pub mod sfnt;
pub mod kern;
pub mod vdmx;
pub mod gsub;

pub use reader::FontReader;

use std::fmt;

/// Table parsing error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected end of table data")]
    InvalidData,
    #[error("table offset {0} out of bounds")]
    BadOffset(usize),
    #[error("unsupported table version {0}")]
    UnsupportedVersion(u32),
}

/// Four-byte OpenType table tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const HEAD: Tag = Tag(*b"head");
    pub const HHEA: Tag = Tag(*b"hhea");
    pub const OS2: Tag = Tag(*b"OS/2");
    pub const POST: Tag = Tag(*b"post");
    pub const VHEA: Tag = Tag(*b"vhea");
    pub const KERN: Tag = Tag(*b"kern");
    pub const VDMX: Tag = Tag(*b"VDMX");
    pub const GSUB: Tag = Tag(*b"GSUB");
    pub const EBLC: Tag = Tag(*b"EBLC");
    pub const CBLC: Tag = Tag(*b"CBLC");
    pub const GLYF: Tag = Tag(*b"glyf");
    pub const CFF: Tag = Tag(*b"CFF ");
    pub const CFF2: Tag = Tag(*b"CFF2");

    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Big-endian integer form, as stored in table directories
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_display() {
        assert_eq!(Tag::OS2.to_string(), "OS/2");
        assert_eq!(Tag::new(b"kern").to_u32(), 0x6B65726E);
    }
}
