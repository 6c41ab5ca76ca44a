//! Kerning table (kern)
//!
//! Only the Windows-style version 0 table with format 0 subtables (plain
//! sorted pair lists) is decoded. Other subtable formats are skipped.

use std::collections::HashMap;

use super::reader::FontReader;
use super::ParseError;

/// Kerning pair in font design units, keyed by glyph id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphKernPair {
    pub left: u16,
    pub right: u16,
    pub value: i16,
}

/// Kerning pair in device pixels, keyed by character code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KerningPair {
    pub first: u32,
    pub second: u32,
    pub amount: i32,
}

/// Decode every format 0 pair in a kern table.
///
/// Only a bad table header is an error. A truncated subtable is logged and
/// ends decoding; pairs from earlier subtables are kept.
pub fn parse_kern(data: &[u8]) -> Result<Vec<GlyphKernPair>, ParseError> {
    let mut r = FontReader::new(data);
    let version = r.read_u16()?;
    if version != 0 {
        return Err(ParseError::UnsupportedVersion(version as u32));
    }
    let num_tables = r.read_u16()?;

    let mut pairs = Vec::new();
    let mut offset = r.pos();
    for index in 0..num_tables {
        match parse_subtable(data, offset, index, &mut pairs) {
            Ok(length) if length >= 6 => offset += length,
            Ok(_) => break,
            Err(e) => {
                tracing::debug!("Stopping at kern subtable {}: {}", index, e);
                break;
            }
        }
    }

    Ok(pairs)
}

/// Append the pairs of one subtable, returning its declared length
fn parse_subtable(data: &[u8], offset: usize, index: u16, pairs: &mut Vec<GlyphKernPair>) -> Result<usize, ParseError> {
    let mut sub = FontReader::at(data, offset)?;
    let _sub_version = sub.read_u16()?;
    let length = sub.read_u16()? as usize;
    let coverage = sub.read_u16()?;
    let format = coverage >> 8;

    if format != 0 {
        tracing::debug!("Skipping kern subtable {} with format {}", index, format);
        return Ok(length);
    }

    let n_pairs = sub.read_u16()?;
    sub.skip(6)?; // search range, entry selector, range shift
    let mut decoded = Vec::with_capacity(n_pairs as usize);
    for _ in 0..n_pairs {
        let left = sub.read_u16()?;
        let right = sub.read_u16()?;
        let value = sub.read_i16()?;
        decoded.push(GlyphKernPair { left, right, value });
    }
    pairs.extend(decoded);
    Ok(length)
}

/// Scale a design-unit kerning value to pixels, rounding away from zero
pub fn scale_kern_value(value: i16, ppem: u32, units_per_em: u16) -> i32 {
    if units_per_em == 0 {
        return 0;
    }
    let upem = units_per_em as i64;
    let mut scaled = value as i64 * ppem as i64;
    if scaled >= 0 {
        scaled += upem / 2;
    } else {
        scaled -= upem / 2;
    }
    (scaled / upem) as i32
}

/// Convert glyph pairs into character pairs scaled to `ppem`.
///
/// Glyphs with no character mapping are dropped.
pub fn to_char_pairs(
    pairs: &[GlyphKernPair],
    glyph_to_char: &HashMap<u32, u32>,
    ppem: u32,
    units_per_em: u16,
) -> Vec<KerningPair> {
    pairs
        .iter()
        .filter_map(|pair| {
            let first = *glyph_to_char.get(&(pair.left as u32))?;
            let second = *glyph_to_char.get(&(pair.right as u32))?;
            Some(KerningPair {
                first,
                second,
                amount: scale_kern_value(pair.value, ppem, units_per_em),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format0_subtable(pairs: &[(u16, u16, i16)]) -> Vec<u8> {
        let mut sub = Vec::new();
        let length = 14 + pairs.len() * 6;
        sub.extend_from_slice(&0u16.to_be_bytes());
        sub.extend_from_slice(&(length as u16).to_be_bytes());
        sub.extend_from_slice(&0x0001u16.to_be_bytes()); // horizontal, format 0
        sub.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
        sub.extend_from_slice(&[0u8; 6]);
        for &(l, r, v) in pairs {
            sub.extend_from_slice(&l.to_be_bytes());
            sub.extend_from_slice(&r.to_be_bytes());
            sub.extend_from_slice(&v.to_be_bytes());
        }
        sub
    }

    #[test]
    fn test_parse_format0() {
        let mut data = vec![0, 0, 0, 2];
        data.extend(format0_subtable(&[(1, 2, -100), (3, 4, 50)]));
        // Format 2 subtable, skipped
        data.extend_from_slice(&[0, 0, 0, 8, 0x02, 0x01, 0, 0]);

        let pairs = parse_kern(&data).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], GlyphKernPair { left: 1, right: 2, value: -100 });
        assert_eq!(pairs[1].value, 50);
    }

    #[test]
    fn test_apple_kern_rejected() {
        let data = [0, 1, 0, 0, 0, 0, 0, 0];
        assert!(parse_kern(&data).is_err());
    }

    #[test]
    fn test_truncated_subtable_keeps_earlier_pairs() {
        let mut data = vec![0, 0, 0, 2];
        data.extend(format0_subtable(&[(1, 2, -30)]));
        let mut sub = format0_subtable(&[(3, 4, 5), (5, 6, 7)]);
        sub.truncate(sub.len() - 2);
        data.extend(sub);

        let pairs = parse_kern(&data).unwrap();
        assert_eq!(pairs, vec![GlyphKernPair { left: 1, right: 2, value: -30 }]);
    }

    #[test]
    fn test_truncated_header_fails() {
        assert!(parse_kern(&[0, 0]).is_err());
    }

    #[test]
    fn test_scale_rounds_away_from_zero() {
        // 100 * 12 / 1000 = 1.2
        assert_eq!(scale_kern_value(100, 12, 1000), 1);
        // 150 * 10 / 1000 = 1.5 -> 2
        assert_eq!(scale_kern_value(150, 10, 1000), 2);
        assert_eq!(scale_kern_value(-150, 10, 1000), -2);
        assert_eq!(scale_kern_value(-100, 12, 1000), -1);
        assert_eq!(scale_kern_value(10, 12, 0), 0);
    }

    #[test]
    fn test_to_char_pairs_drops_unmapped() {
        let pairs = [
            GlyphKernPair { left: 1, right: 2, value: -200 },
            GlyphKernPair { left: 1, right: 9, value: 40 },
        ];
        let map: HashMap<u32, u32> = [(1, 'A' as u32), (2, 'V' as u32)].into_iter().collect();
        let out = to_char_pairs(&pairs, &map, 20, 1000);
        assert_eq!(out, vec![KerningPair { first: 'A' as u32, second: 'V' as u32, amount: -4 }]);
    }
}
