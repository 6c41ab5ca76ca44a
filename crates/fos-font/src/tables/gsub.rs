//! Vertical glyph substitution from the GSUB table
//!
//! Resolves script → language system → `vrt2` (or `vert`) feature and keeps
//! the single-substitution lookups it references. Other lookup types are
//! skipped.

use super::reader::{slice_from, FontReader};
use super::ParseError;

const DEFAULT_SCRIPT: [u8; 4] = *b"DFLT";
const VRT2: [u8; 4] = *b"vrt2";
const VERT: [u8; 4] = *b"vert";

/// Coverage table (maps glyph IDs to coverage indices)
#[derive(Debug)]
pub struct Coverage {
    data: CoverageData,
}

#[derive(Debug)]
enum CoverageData {
    /// Format 1: List of glyph IDs
    GlyphArray(Vec<u16>),
    /// Format 2: Ranges of glyph IDs
    RangeArray(Vec<RangeRecord>),
}

#[derive(Debug, Clone, Copy)]
struct RangeRecord {
    start_glyph: u16,
    end_glyph: u16,
    start_coverage_index: u16,
}

impl Coverage {
    /// Parse coverage table from data
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;

        let data = match format {
            1 => {
                let count = reader.read_u16()?;
                let mut glyphs = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    glyphs.push(reader.read_u16()?);
                }
                CoverageData::GlyphArray(glyphs)
            }
            2 => {
                let count = reader.read_u16()?;
                let mut ranges = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    ranges.push(RangeRecord {
                        start_glyph: reader.read_u16()?,
                        end_glyph: reader.read_u16()?,
                        start_coverage_index: reader.read_u16()?,
                    });
                }
                CoverageData::RangeArray(ranges)
            }
            other => return Err(ParseError::UnsupportedVersion(other as u32)),
        };

        Ok(Self { data })
    }

    /// Get coverage index for a glyph ID
    pub fn get(&self, glyph_id: u16) -> Option<u16> {
        match &self.data {
            CoverageData::GlyphArray(glyphs) => glyphs.binary_search(&glyph_id).ok().map(|i| i as u16),
            CoverageData::RangeArray(ranges) => ranges
                .iter()
                .find(|r| glyph_id >= r.start_glyph && glyph_id <= r.end_glyph)
                .and_then(|r| r.start_coverage_index.checked_add(glyph_id - r.start_glyph)),
        }
    }
}

/// Single substitution subtable (lookup type 1)
#[derive(Debug)]
pub struct SingleSubst {
    coverage: Coverage,
    data: SingleSubstData,
}

#[derive(Debug)]
enum SingleSubstData {
    /// Format 1: Delta to add to glyph ID
    Delta(i16),
    /// Format 2: Array of substitute glyph IDs
    Array(Vec<u16>),
}

impl SingleSubst {
    /// Parse single substitution subtable
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut reader = FontReader::new(data);
        let format = reader.read_u16()?;
        let coverage_offset = reader.read_u16()? as usize;
        let coverage = Coverage::parse(slice_from(data, coverage_offset)?)?;

        let data = match format {
            1 => SingleSubstData::Delta(reader.read_i16()?),
            2 => {
                let count = reader.read_u16()?;
                let mut substitutes = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    substitutes.push(reader.read_u16()?);
                }
                SingleSubstData::Array(substitutes)
            }
            other => return Err(ParseError::UnsupportedVersion(other as u32)),
        };

        Ok(Self { coverage, data })
    }

    /// Substitute a glyph, if covered
    pub fn apply(&self, glyph_id: u16) -> Option<u16> {
        let coverage_idx = self.coverage.get(glyph_id)?;
        match &self.data {
            SingleSubstData::Delta(delta) => Some((glyph_id as i32 + *delta as i32) as u16),
            SingleSubstData::Array(substitutes) => substitutes.get(coverage_idx as usize).copied(),
        }
    }
}

/// Vertical-writing substitution resolved from a face's GSUB table
#[derive(Debug, Default)]
pub struct VerticalSubstitution {
    /// Lookups in feature order, each a list of single-substitution subtables
    lookups: Vec<Vec<SingleSubst>>,
}

impl VerticalSubstitution {
    /// Resolve the vertical feature for `script`.
    ///
    /// Returns `Ok(None)` when the table has no usable script, language
    /// system or vertical feature.
    pub fn parse(data: &[u8], script: [u8; 4], language: Option<[u8; 4]>) -> Result<Option<Self>, ParseError> {
        let mut r = FontReader::new(data);
        let major = r.read_u16()?;
        let _minor = r.read_u16()?;
        if major != 1 {
            return Err(ParseError::UnsupportedVersion(major as u32));
        }
        let script_list = r.read_u16()? as usize;
        let feature_list = r.read_u16()? as usize;
        let lookup_list = r.read_u16()? as usize;

        let script_table = match find_record(data, script_list, script)? {
            Some(offset) => offset,
            None => match find_record(data, script_list, DEFAULT_SCRIPT)? {
                Some(offset) => {
                    tracing::trace!("GSUB script not found, using default script");
                    offset
                }
                None => {
                    tracing::trace!("GSUB has no script table for vertical substitution");
                    return Ok(None);
                }
            },
        };

        let Some(lang_sys) = find_language(data, script_table, language)? else {
            tracing::trace!("GSUB script has no language system");
            return Ok(None);
        };

        let feature_indices = read_u16_list(data, lang_sys + 4)?;
        let feature = match find_feature(data, feature_list, &feature_indices, VRT2)? {
            Some(f) => f,
            None => match find_feature(data, feature_list, &feature_indices, VERT)? {
                Some(f) => f,
                None => return Ok(None),
            },
        };

        let lookup_indices = read_u16_list(data, feature + 2)?;
        let lookup_count = FontReader::at(data, lookup_list)?.read_u16()?;

        let mut lookups = Vec::with_capacity(lookup_indices.len());
        for index in lookup_indices {
            if index >= lookup_count {
                tracing::warn!("GSUB lookup index {} out of range", index);
                continue;
            }
            let lookup_offset = lookup_list + FontReader::at(data, lookup_list + 2 + index as usize * 2)?.read_u16()? as usize;
            let mut lr = FontReader::at(data, lookup_offset)?;
            let lookup_type = lr.read_u16()?;
            let _flag = lr.read_u16()?;
            let subtable_count = lr.read_u16()?;

            if lookup_type != 1 {
                tracing::debug!("Skipping GSUB lookup {} of type {}", index, lookup_type);
                continue;
            }

            let mut subtables = Vec::with_capacity(subtable_count as usize);
            for _ in 0..subtable_count {
                let offset = lookup_offset + lr.read_u16()? as usize;
                match SingleSubst::parse(slice_from(data, offset)?) {
                    Ok(subst) => subtables.push(subst),
                    Err(e) => tracing::debug!("Skipping GSUB subtable in lookup {}: {}", index, e),
                }
            }
            lookups.push(subtables);
        }

        Ok(Some(Self { lookups }))
    }

    /// Map a horizontal glyph to its vertical form
    pub fn apply(&self, glyph_id: u16) -> u16 {
        let mut glyph = glyph_id;
        for lookup in &self.lookups {
            if let Some(out) = lookup.iter().find_map(|subtable| subtable.apply(glyph)) {
                glyph = out;
            }
        }
        glyph
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.iter().all(Vec::is_empty)
    }
}

/// Find a tagged record in a `count, (tag, offset16)*` list at `list_offset`
fn find_record(data: &[u8], list_offset: usize, tag: [u8; 4]) -> Result<Option<usize>, ParseError> {
    let mut r = FontReader::at(data, list_offset)?;
    let count = r.read_u16()?;
    for _ in 0..count {
        let record_tag = r.read_tag()?;
        let offset = r.read_u16()? as usize;
        if record_tag == tag {
            return Ok(Some(list_offset + offset));
        }
    }
    Ok(None)
}

fn find_language(data: &[u8], script_table: usize, language: Option<[u8; 4]>) -> Result<Option<usize>, ParseError> {
    let mut r = FontReader::at(data, script_table)?;
    let default_lang_sys = r.read_u16()? as usize;
    if let Some(lang) = language {
        let mut lr = FontReader::at(data, script_table + 2)?;
        let count = lr.read_u16()?;
        for _ in 0..count {
            let tag = lr.read_tag()?;
            let offset = lr.read_u16()? as usize;
            if tag == lang {
                return Ok(Some(script_table + offset));
            }
        }
    }
    if default_lang_sys == 0 {
        return Ok(None);
    }
    Ok(Some(script_table + default_lang_sys))
}

fn find_feature(
    data: &[u8],
    feature_list: usize,
    indices: &[u16],
    tag: [u8; 4],
) -> Result<Option<usize>, ParseError> {
    let count = FontReader::at(data, feature_list)?.read_u16()?;
    for &index in indices {
        if index >= count {
            continue;
        }
        let mut r = FontReader::at(data, feature_list + 2 + index as usize * 6)?;
        let record_tag = r.read_tag()?;
        let offset = r.read_u16()? as usize;
        if record_tag == tag {
            return Ok(Some(feature_list + offset));
        }
    }
    Ok(None)
}

fn read_u16_list(data: &[u8], offset: usize) -> Result<Vec<u16>, ParseError> {
    let mut r = FontReader::at(data, offset)?;
    let count = r.read_u16()?;
    (0..count).map(|_| r.read_u16()).collect()
}
