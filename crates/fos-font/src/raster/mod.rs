//! Rasterization capability
//!
//! The engine never decodes outlines itself. It opens faces, sizes them,
//! reads their tables and walks their character maps through the
//! [`Rasterizer`] and [`RasterFace`] traits. [`TtfRasterizer`] is the
//! default backend.

mod ttf;

pub use ttf::TtfRasterizer;

use crate::charset::CharsetMask;
use crate::mapping::FontBytes;
use crate::tables::Tag;
use crate::Result;

/// Language id of US English names
pub const LANG_ENGLISH_US: u16 = 0x0409;

/// A family name in one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedName {
    pub language: u16,
    pub name: String,
}

/// One embedded bitmap strike of a non-scalable face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BitmapStrike {
    /// Cell height in pixels
    pub height: i16,
    pub width: i16,
    /// Nominal size in points
    pub size: i16,
    pub x_ppem: u16,
    pub y_ppem: u16,
    pub internal_leading: i16,
    pub ascent: i16,
}

/// Static description of a face, read once at open time
#[derive(Debug, Clone, Default)]
pub struct FaceProperties {
    pub family_names: Vec<LocalizedName>,
    pub style_name: String,
    pub full_name: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub weight: u16,
    pub scalable: bool,
    pub strikes: Vec<BitmapStrike>,
    pub coverage: CharsetMask,
    /// head.fontRevision (16.16)
    pub revision: u32,
    pub has_vertical_metrics: bool,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub win_ascent: u16,
    pub win_descent: u16,
    pub glyph_count: u32,
    pub fixed_pitch: bool,
}

impl FaceProperties {
    /// English family name, falling back to the first name present
    pub fn english_family(&self) -> Option<&str> {
        self.family_names
            .iter()
            .find(|n| n.language == LANG_ENGLISH_US)
            .or_else(|| self.family_names.first())
            .map(|n| n.name.as_str())
    }

    /// Family name for `language`, falling back to English
    pub fn localized_family(&self, language: u16) -> Option<&str> {
        self.family_names
            .iter()
            .find(|n| n.language == language)
            .map(|n| n.name.as_str())
            .or_else(|| self.english_family())
    }
}

/// Glyph metrics as reported by the rasterizer.
///
/// Values are in font design units for scalable faces and in strike pixels
/// for bitmap faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadedGlyph {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
    pub advance: i32,
    pub left_bearing: i32,
}

/// Character map encodings a face can be switched to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharMapEncoding {
    Unicode,
    Symbol,
}

/// An opened face
pub trait RasterFace: Send {
    fn properties(&self) -> &FaceProperties;

    /// Size the face; zero width means "same as height"
    fn set_pixel_size(&mut self, width: u32, height: u32) -> Result<()>;

    /// Current (width, height) pixel size
    fn pixel_size(&self) -> (u32, u32);

    fn load_glyph(&self, glyph: u32) -> Option<LoadedGlyph>;

    /// Raw bytes of a table
    fn table(&self, tag: Tag) -> Option<&[u8]>;

    /// Whole font file (or collection) this face was opened from
    fn font_data(&self) -> &[u8];

    fn select_character_map(&mut self, encoding: CharMapEncoding) -> bool;

    /// Lowest mapped character as (code, glyph)
    fn first_char(&self) -> Option<(u32, u32)>;

    /// Next mapped character after `code`
    fn next_char(&self, code: u32) -> Option<(u32, u32)>;

    /// Glyph for a character, `None` for .notdef
    fn char_index(&self, code: u32) -> Option<u32>;
}

/// Face factory
pub trait Rasterizer: Send + Sync {
    /// Number of faces stored in `data` (1 for a plain font file)
    fn face_count(&self, data: &[u8]) -> Result<u32>;

    fn open_face(&self, data: FontBytes, index: u32) -> Result<Box<dyn RasterFace>>;
}
