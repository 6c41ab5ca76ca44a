//! Header tables (head, hhea, OS/2) and embedded bitmap strikes

use super::reader::FontReader;
use super::ParseError;

/// Head table (font header)
#[derive(Debug, Clone)]
pub struct HeadTable {
    /// fontRevision as raw 16.16 fixed
    pub font_revision: u32,
    pub units_per_em: u16,
    pub mac_style: u16,
}

impl HeadTable {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut r = FontReader::new(data);
        r.skip(4)?; // version
        let font_revision = r.read_u32()?;
        r.skip(10)?; // checksum adjustment, magic, flags
        let units_per_em = r.read_u16()?;
        r.skip(24)?; // timestamps, bounding box
        let mac_style = r.read_u16()?;

        Ok(Self {
            font_revision,
            units_per_em,
            mac_style,
        })
    }

    pub fn is_bold(&self) -> bool {
        self.mac_style & 0x0001 != 0
    }

    pub fn is_italic(&self) -> bool {
        self.mac_style & 0x0002 != 0
    }
}

/// Hhea table (horizontal header)
#[derive(Debug, Clone)]
pub struct HheaTable {
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
}

impl HheaTable {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut r = FontReader::new(data);
        r.skip(4)?; // version
        let ascender = r.read_i16()?;
        let descender = r.read_i16()?;
        let line_gap = r.read_i16()?;

        Ok(Self {
            ascender,
            descender,
            line_gap,
        })
    }
}

/// OS/2 table (font metadata)
#[derive(Debug, Clone, Default)]
pub struct Os2Table {
    pub version: u16,
    pub weight_class: u16,
    pub fs_selection: u16,
    pub win_ascent: u16,
    pub win_descent: u16,
    /// ulCodePageRange1, zero before version 1
    pub code_page_range: u32,
}

impl Os2Table {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut r = FontReader::new(data);
        let version = r.read_u16()?;
        r.skip(2)?; // avg char width
        let weight_class = r.read_u16()?;

        let mut r = FontReader::at(data, 62)?;
        let fs_selection = r.read_u16()?;

        let mut r = FontReader::at(data, 74)?;
        let win_ascent = r.read_u16()?;
        let win_descent = r.read_u16()?;

        let code_page_range = if version >= 1 {
            r.read_u32().unwrap_or(0)
        } else {
            0
        };

        Ok(Self {
            version,
            weight_class,
            fs_selection,
            win_ascent,
            win_descent,
            code_page_range,
        })
    }

    pub fn is_italic(&self) -> bool {
        self.fs_selection & 0x0001 != 0
    }

    pub fn is_bold(&self) -> bool {
        self.fs_selection & 0x0020 != 0
    }
}

/// One embedded bitmap strike from an EBLC/CBLC table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeRecord {
    pub ascender: i8,
    pub descender: i8,
    pub width_max: u8,
    pub ppem_x: u8,
    pub ppem_y: u8,
    pub bit_depth: u8,
}

impl StrikeRecord {
    /// Cell height of the strike in pixels
    pub fn height(&self) -> u16 {
        (self.ascender as i16 - self.descender as i16).max(0) as u16
    }
}

const BITMAP_SIZE_RECORD_LEN: usize = 48;

/// Parse the strike list of an EBLC or CBLC table
pub fn parse_strikes(data: &[u8]) -> Result<Vec<StrikeRecord>, ParseError> {
    let mut r = FontReader::new(data);
    let major = r.read_u16()?;
    let _minor = r.read_u16()?;
    if !(2..=3).contains(&major) {
        return Err(ParseError::UnsupportedVersion(major as u32));
    }
    let num_sizes = r.read_u32()? as usize;

    let mut strikes = Vec::with_capacity(num_sizes.min(64));
    for i in 0..num_sizes {
        let mut r = FontReader::at(data, 8 + i * BITMAP_SIZE_RECORD_LEN)?;
        r.skip(16)?; // index subtable array, sizes, color ref
        let ascender = r.read_i8()?;
        let descender = r.read_i8()?;
        let width_max = r.read_u8()?;
        r.skip(9)?; // rest of hori line metrics
        r.skip(12)?; // vert line metrics
        r.skip(4)?; // start/end glyph index
        let ppem_x = r.read_u8()?;
        let ppem_y = r.read_u8()?;
        let bit_depth = r.read_u8()?;

        strikes.push(StrikeRecord {
            ascender,
            descender,
            width_max,
            ppem_x,
            ppem_y,
            bit_depth,
        });
    }

    Ok(strikes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_bytes(revision: u32, upem: u16, mac_style: u16) -> Vec<u8> {
        let mut data = vec![0u8; 54];
        data[4..8].copy_from_slice(&revision.to_be_bytes());
        data[18..20].copy_from_slice(&upem.to_be_bytes());
        data[44..46].copy_from_slice(&mac_style.to_be_bytes());
        data
    }

    #[test]
    fn test_head_table() {
        let head = HeadTable::parse(&head_bytes(0x0002_8000, 2048, 0x0003)).unwrap();
        assert_eq!(head.font_revision, 0x0002_8000);
        assert_eq!(head.units_per_em, 2048);
        assert!(head.is_bold());
        assert!(head.is_italic());
    }

    #[test]
    fn test_os2_code_page_range() {
        let mut data = vec![0u8; 86];
        data[0..2].copy_from_slice(&1u16.to_be_bytes());
        data[4..6].copy_from_slice(&700u16.to_be_bytes());
        data[62..64].copy_from_slice(&0x0021u16.to_be_bytes());
        data[74..76].copy_from_slice(&1854u16.to_be_bytes());
        data[76..78].copy_from_slice(&434u16.to_be_bytes());
        data[78..82].copy_from_slice(&0x0000_0005u32.to_be_bytes());

        let os2 = Os2Table::parse(&data).unwrap();
        assert_eq!(os2.weight_class, 700);
        assert!(os2.is_bold());
        assert!(os2.is_italic());
        assert_eq!(os2.win_ascent + os2.win_descent, 2288);
        assert_eq!(os2.code_page_range, 5);
    }

    #[test]
    fn test_os2_version0_has_no_code_pages() {
        let data = vec![0u8; 78];
        let os2 = Os2Table::parse(&data).unwrap();
        assert_eq!(os2.code_page_range, 0);
    }

    #[test]
    fn test_parse_strikes() {
        let mut data = vec![0u8; 8 + 2 * BITMAP_SIZE_RECORD_LEN];
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        data[4..8].copy_from_slice(&2u32.to_be_bytes());
        for (i, (asc, desc, ppem)) in [(8i8, -2i8, 9u8), (11, -3, 13)].into_iter().enumerate() {
            let base = 8 + i * BITMAP_SIZE_RECORD_LEN;
            data[base + 16] = asc as u8;
            data[base + 17] = desc as u8;
            data[base + 18] = ppem / 2;
            data[base + 44] = ppem;
            data[base + 45] = ppem;
            data[base + 46] = 1;
        }

        let strikes = parse_strikes(&data).unwrap();
        assert_eq!(strikes.len(), 2);
        assert_eq!(strikes[0].height(), 10);
        assert_eq!(strikes[1].height(), 14);
        assert_eq!(strikes[1].ppem_y, 13);
    }

    #[test]
    fn test_truncated_strikes_fail() {
        let mut data = vec![0u8; 8];
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        data[4..8].copy_from_slice(&1u32.to_be_bytes());
        assert!(parse_strikes(&data).is_err());
    }
}
