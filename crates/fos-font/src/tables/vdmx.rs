//! Vertical device metrics table (VDMX)
//!
//! Maps a requested height to the integral ppem a renderer must use, per
//! device aspect ratio.

use super::reader::FontReader;
use super::ParseError;

/// Matched VDMX record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VdmxEntry {
    pub ppem: u16,
    pub y_max: i16,
    pub y_min: i16,
}

impl VdmxEntry {
    /// Cell height covered by this entry
    pub fn height(&self) -> i32 {
        self.y_max as i32 - self.y_min as i32
    }
}

/// Look up the entry for `height` on a device with the given aspect ratio.
///
/// Positive heights are cell heights and match against `yMax - yMin`,
/// stepping back to the previous record when the exact height is skipped.
/// Negative heights are em heights and must match a record's ppem exactly.
pub fn lookup(data: &[u8], aspect: (u8, u8), height: i32) -> Result<Option<VdmxEntry>, ParseError> {
    if height == 0 {
        return Ok(None);
    }

    let mut r = FontReader::new(data);
    let version = r.read_u16()?;
    if version > 1 {
        return Err(ParseError::UnsupportedVersion(version as u32));
    }
    let _num_recs = r.read_u16()?;
    let num_ratios = r.read_u16()? as usize;

    let ratios_start = r.pos();
    let offsets_start = ratios_start + num_ratios * 4;

    let mut group_offset = None;
    for i in 0..num_ratios {
        let mut rr = FontReader::at(data, ratios_start + i * 4)?;
        let _charset = rr.read_u8()?;
        let x_ratio = rr.read_u8()?;
        let y_start = rr.read_u8()?;
        let y_end = rr.read_u8()?;

        let is_default = x_ratio == 0 && y_start == 0 && y_end == 0;
        let matches = x_ratio == aspect.0 && (y_start..=y_end).contains(&aspect.1);
        if is_default || matches {
            let mut or = FontReader::at(data, offsets_start + i * 2)?;
            group_offset = Some(or.read_u16()? as usize);
            break;
        }
    }

    let Some(group_offset) = group_offset else {
        tracing::trace!("No VDMX ratio for aspect {}:{}", aspect.0, aspect.1);
        return Ok(None);
    };

    let mut g = FontReader::at(data, group_offset)?;
    let recs = g.read_u16()? as usize;
    let start_size = g.read_u8()? as i32;
    let end_size = g.read_u8()? as i32;

    let mut entries = Vec::with_capacity(recs);
    for _ in 0..recs {
        entries.push(VdmxEntry {
            ppem: g.read_u16()?,
            y_max: g.read_i16()?,
            y_min: g.read_i16()?,
        });
    }

    if height > 0 {
        for (i, entry) in entries.iter().enumerate() {
            if entry.height() == height {
                return Ok(Some(*entry));
            }
            if entry.height() > height {
                return Ok(if i == 0 { None } else { Some(entries[i - 1]) });
            }
        }
        Ok(None)
    } else {
        let ppem = -height;
        if ppem < start_size || ppem > end_size {
            return Ok(None);
        }
        Ok(entries.iter().find(|e| e.ppem as i32 == ppem).copied())
    }
}
