//! ttf-parser backed rasterizer

use std::ops::Range;

use ttf_parser::{name_id, Face, GlyphId, PlatformId};

use super::{
    BitmapStrike, CharMapEncoding, FaceProperties, LoadedGlyph, LocalizedName, RasterFace,
    Rasterizer, LANG_ENGLISH_US,
};
use crate::charset::CharsetMask;
use crate::mapping::FontBytes;
use crate::size::MAX_PPEM;
use crate::tables::sfnt::{parse_strikes, HeadTable, HheaTable, Os2Table};
use crate::tables::Tag;
use crate::{FontError, Result};

/// Rasterizer built on ttf-parser
#[derive(Debug, Default, Clone, Copy)]
pub struct TtfRasterizer;

impl TtfRasterizer {
    pub fn new() -> Self {
        Self
    }
}

impl Rasterizer for TtfRasterizer {
    fn face_count(&self, data: &[u8]) -> Result<u32> {
        if let Some(count) = ttf_parser::fonts_in_collection(data) {
            return Ok(count);
        }
        Face::parse(data, 0).map_err(|e| FontError::Malformed(e.to_string()))?;
        Ok(1)
    }

    fn open_face(&self, data: FontBytes, index: u32) -> Result<Box<dyn RasterFace>> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        if index >= count {
            return Err(FontError::FaceIndexOutOfRange { index, count });
        }
        Ok(Box::new(TtfFace::open(data, index)?))
    }
}

/// A face opened through ttf-parser.
///
/// Only the owning bytes and a few decoded summaries are kept; the parser
/// view is rebuilt for glyph queries.
pub struct TtfFace {
    data: FontBytes,
    index: u32,
    properties: FaceProperties,
    tables: Vec<(Tag, Range<usize>)>,
    unicode_map: Vec<(u32, u32)>,
    symbol_map: Vec<(u32, u32)>,
    encoding: CharMapEncoding,
    pixel_size: (u32, u32),
}

impl TtfFace {
    fn open(data: FontBytes, index: u32) -> Result<Self> {
        let face = Face::parse(&data, index).map_err(|e| FontError::Malformed(e.to_string()))?;

        let tables: Vec<(Tag, Range<usize>)> = face
            .raw_face()
            .table_records
            .into_iter()
            .filter_map(|record| {
                let start = record.offset as usize;
                let end = start.checked_add(record.length as usize)?;
                (end <= data.len()).then(|| (Tag(record.tag.to_bytes()), start..end))
            })
            .collect();

        let table = |tag: Tag| {
            tables
                .iter()
                .find(|(t, _)| *t == tag)
                .map(|(_, range)| &data[range.clone()])
        };

        let has_outlines = [Tag::GLYF, Tag::CFF, Tag::CFF2].iter().any(|t| table(*t).is_some());
        let strike_table = table(Tag::EBLC).or_else(|| table(Tag::CBLC));
        let scalable = has_outlines || strike_table.is_none();

        if scalable {
            for (tag, name) in [(Tag::OS2, "OS/2"), (Tag::HHEA, "hhea"), (Tag::POST, "post")] {
                if table(tag).is_none() {
                    return Err(FontError::MissingTable(name));
                }
            }
        }

        let head = table(Tag::HEAD).map(HeadTable::parse).transpose()?;
        let hhea = table(Tag::HHEA).map(HheaTable::parse).transpose()?;
        let os2 = table(Tag::OS2).map(Os2Table::parse).transpose()?;

        let strikes = if scalable {
            Vec::new()
        } else {
            strike_table
                .map(parse_strikes)
                .transpose()?
                .unwrap_or_default()
                .into_iter()
                .map(|s| {
                    let height = s.height() as i16;
                    BitmapStrike {
                        height,
                        width: s.width_max as i16,
                        size: ((s.ppem_y as i32 * 72 + 48) / 96) as i16,
                        x_ppem: s.ppem_x as u16,
                        y_ppem: s.ppem_y as u16,
                        internal_leading: height - s.ppem_y as i16,
                        ascent: s.ascender as i16,
                    }
                })
                .collect()
        };

        let (unicode_map, symbol_map) = read_char_maps(&face);
        let encoding = if unicode_map.is_empty() && !symbol_map.is_empty() {
            CharMapEncoding::Symbol
        } else {
            CharMapEncoding::Unicode
        };

        let mut coverage = CharsetMask(os2.as_ref().map_or(0, |o| o.code_page_range));
        if coverage.is_empty() {
            if !unicode_map.is_empty() {
                coverage |= CharsetMask::LATIN1;
            }
            if !symbol_map.is_empty() {
                coverage |= CharsetMask::SYMBOL;
            }
        }

        let bold = os2.as_ref().is_some_and(Os2Table::is_bold) || head.as_ref().is_some_and(HeadTable::is_bold);
        let italic = os2.as_ref().is_some_and(Os2Table::is_italic) || head.as_ref().is_some_and(HeadTable::is_italic);

        let properties = FaceProperties {
            family_names: family_names(&face),
            style_name: find_name(&face, name_id::SUBFAMILY).unwrap_or_else(|| "Regular".to_string()),
            full_name: find_name(&face, name_id::FULL_NAME),
            bold,
            italic,
            weight: os2.as_ref().map_or(if bold { 700 } else { 400 }, |o| o.weight_class),
            scalable,
            strikes,
            coverage,
            revision: head.as_ref().map_or(0, |h| h.font_revision),
            has_vertical_metrics: table(Tag::VHEA).is_some(),
            units_per_em: face.units_per_em(),
            ascender: hhea.as_ref().map_or(face.ascender(), |h| h.ascender),
            descender: hhea.as_ref().map_or(face.descender(), |h| h.descender),
            win_ascent: os2.as_ref().map_or(0, |o| o.win_ascent),
            win_descent: os2.as_ref().map_or(0, |o| o.win_descent),
            glyph_count: face.number_of_glyphs() as u32,
            fixed_pitch: face.is_monospaced(),
        };

        drop(face);
        Ok(Self {
            data,
            index,
            properties,
            tables,
            unicode_map,
            symbol_map,
            encoding,
            pixel_size: (0, 0),
        })
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.index).ok()
    }

    fn char_map(&self) -> &[(u32, u32)] {
        match self.encoding {
            CharMapEncoding::Unicode => &self.unicode_map,
            CharMapEncoding::Symbol => &self.symbol_map,
        }
    }
}

impl RasterFace for TtfFace {
    fn properties(&self) -> &FaceProperties {
        &self.properties
    }

    fn set_pixel_size(&mut self, width: u32, height: u32) -> Result<()> {
        let width = if width == 0 { height } else { width };
        if height == 0 || height > MAX_PPEM || width > MAX_PPEM {
            return Err(FontError::InvalidPixelSize { width, height });
        }
        if !self.properties.scalable && !self.properties.strikes.iter().any(|s| s.y_ppem as u32 == height) {
            return Err(FontError::InvalidPixelSize { width, height });
        }
        self.pixel_size = (width, height);
        Ok(())
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.pixel_size
    }

    fn load_glyph(&self, glyph: u32) -> Option<LoadedGlyph> {
        if glyph >= self.properties.glyph_count {
            return None;
        }
        let face = self.face()?;
        let id = GlyphId(glyph as u16);

        if self.properties.scalable {
            let advance = face.glyph_hor_advance(id).unwrap_or(0) as i32;
            let left_bearing = face.glyph_hor_side_bearing(id).unwrap_or(0) as i32;
            let (x_min, y_min, x_max, y_max) = match face.glyph_bounding_box(id) {
                Some(rect) => (rect.x_min as i32, rect.y_min as i32, rect.x_max as i32, rect.y_max as i32),
                None => (0, 0, 0, 0),
            };
            return Some(LoadedGlyph {
                x_min,
                y_min,
                x_max,
                y_max,
                advance,
                left_bearing,
            });
        }

        let ppem = self.pixel_size.1 as u16;
        let image = face.glyph_raster_image(id, ppem)?;
        let x_min = image.x as i32;
        let y_min = image.y as i32;
        let advance = match face.glyph_hor_advance(id) {
            Some(adv) if self.properties.units_per_em > 0 => {
                (adv as i32 * ppem as i32 + self.properties.units_per_em as i32 / 2) / self.properties.units_per_em as i32
            }
            _ => image.width as i32,
        };
        Some(LoadedGlyph {
            x_min,
            y_min,
            x_max: x_min + image.width as i32,
            y_max: y_min + image.height as i32,
            advance,
            left_bearing: x_min,
        })
    }

    fn table(&self, tag: Tag) -> Option<&[u8]> {
        self.tables
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, range)| &self.data[range.clone()])
    }

    fn font_data(&self) -> &[u8] {
        &self.data
    }

    fn select_character_map(&mut self, encoding: CharMapEncoding) -> bool {
        let available = match encoding {
            CharMapEncoding::Unicode => !self.unicode_map.is_empty(),
            CharMapEncoding::Symbol => !self.symbol_map.is_empty(),
        };
        if available {
            self.encoding = encoding;
        }
        available
    }

    fn first_char(&self) -> Option<(u32, u32)> {
        self.char_map().first().copied()
    }

    fn next_char(&self, code: u32) -> Option<(u32, u32)> {
        let map = self.char_map();
        let pos = map.partition_point(|&(c, _)| c <= code);
        map.get(pos).copied()
    }

    fn char_index(&self, code: u32) -> Option<u32> {
        let map = self.char_map();
        map.binary_search_by_key(&code, |&(c, _)| c).ok().map(|i| map[i].1)
    }
}

/// Read the Unicode and symbol character maps as sorted (code, glyph) lists
fn read_char_maps(face: &Face<'_>) -> (Vec<(u32, u32)>, Vec<(u32, u32)>) {
    let mut unicode = Vec::new();
    let mut symbol = Vec::new();

    let Some(cmap) = face.tables().cmap else {
        return (unicode, symbol);
    };

    for subtable in cmap.subtables {
        let is_symbol = subtable.platform_id == PlatformId::Windows && subtable.encoding_id == 0;
        let target = if is_symbol {
            &mut symbol
        } else if subtable.is_unicode() {
            &mut unicode
        } else {
            continue;
        };
        if !target.is_empty() {
            continue;
        }
        subtable.codepoints(|code| {
            if let Some(glyph) = subtable.glyph_index(code) {
                if glyph.0 != 0 {
                    target.push((code, glyph.0 as u32));
                }
            }
        });
        target.sort_unstable_by_key(|&(c, _)| c);
        target.dedup_by_key(|&mut (c, _)| c);
    }

    (unicode, symbol)
}

fn family_names(face: &Face<'_>) -> Vec<LocalizedName> {
    let mut names: Vec<LocalizedName> = Vec::new();
    for name in face.names() {
        if name.name_id != name_id::FAMILY || !name.is_unicode() {
            continue;
        }
        let language = match name.platform_id {
            PlatformId::Windows => name.language_id,
            _ => LANG_ENGLISH_US,
        };
        if names.iter().any(|n| n.language == language) {
            continue;
        }
        if let Some(value) = name.to_string() {
            names.push(LocalizedName { language, name: value });
        }
    }
    names
}

fn find_name(face: &Face<'_>, id: u16) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id != id || !name.is_unicode() {
            continue;
        }
        let Some(value) = name.to_string() else { continue };
        if name.platform_id == PlatformId::Windows && name.language_id == LANG_ENGLISH_US {
            return Some(value);
        }
        fallback.get_or_insert(value);
    }
    fallback
}
