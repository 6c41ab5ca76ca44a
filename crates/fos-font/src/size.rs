//! Pixel size resolution
//!
//! Scalable faces are sized to an integral ppem, taken from the VDMX table
//! when the font carries one. Bitmap faces are drawn from one strike scaled
//! by an integer factor.

use crate::raster::{BitmapStrike, FaceProperties};
use crate::tables::vdmx::{self, VdmxEntry};

/// Height used when a request leaves it at zero
pub const DEFAULT_HEIGHT: i32 = 16;

/// Largest ppem a face can be opened at
pub const MAX_PPEM: u32 = 0xFFFF;

/// Resolved size of a scalable instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalableSize {
    pub ppem: u32,
    /// VDMX record the size came from, if any
    pub vdmx: Option<VdmxEntry>,
}

/// `a * b / c` rounded to nearest, halves away from zero; 0 when `c` is 0
pub fn mul_div(a: i32, b: i32, c: i32) -> i32 {
    if c == 0 {
        return 0;
    }
    let product = a as i64 * b as i64;
    let c = c as i64;
    let half = if (product < 0) != (c < 0) { -(c.abs() / 2) } else { c.abs() / 2 };
    let rounded = (product + half * c.signum()) / c;
    rounded.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Ppem for a scalable face at the requested height.
///
/// Positive heights are cell heights and are scaled by the em against the
/// face's win ascent plus descent (hhea ascender minus descender when those
/// are zero). Negative heights are em heights and used as is.
pub fn ppem_for_height(props: &FaceProperties, height: i32) -> u32 {
    let height = if height == 0 { DEFAULT_HEIGHT } else { height };

    let ppem = if height > 0 {
        let mut units = props.win_ascent as i32 + props.win_descent as i32;
        if units == 0 {
            units = props.ascender as i32 - props.descender as i32;
        }
        mul_div(props.units_per_em as i32, height, units)
    } else {
        height.saturating_neg()
    };

    match u32::try_from(ppem) {
        Ok(ppem) if ppem <= MAX_PPEM => ppem,
        _ => {
            tracing::debug!("Ppem {} out of range, clamping to 1", ppem);
            1
        }
    }
}

/// Size a scalable face, preferring the VDMX table
pub fn scalable_size(props: &FaceProperties, vdmx_table: Option<&[u8]>, aspect: (u8, u8), height: i32) -> ScalableSize {
    if let Some(data) = vdmx_table {
        match vdmx::lookup(data, aspect, height) {
            Ok(Some(entry)) if entry.ppem > 0 => {
                tracing::trace!("VDMX: height {} -> ppem {}", height, entry.ppem);
                return ScalableSize {
                    ppem: entry.ppem as u32,
                    vdmx: Some(entry),
                };
            }
            Ok(_) => {}
            Err(e) => tracing::debug!("Ignoring unreadable VDMX table: {}", e),
        }
    }

    ScalableSize {
        ppem: ppem_for_height(props, height),
        vdmx: None,
    }
}

/// Cell height a bitmap request targets.
///
/// Positive heights are cell heights, negative ones em heights (so the
/// strike's internal leading is added back). Zero means the strike's own
/// height.
pub fn bitmap_target_height(strike: &BitmapStrike, height: i32) -> i32 {
    match height {
        0 => strike.height as i32,
        h if h > 0 => h,
        h => h.saturating_neg().saturating_add(strike.internal_leading as i32),
    }
}

/// Integer factor a strike is scaled by to approach the requested height.
///
/// Rounds up, then backs off one step when the overshoot is more than a
/// quarter of the strike.
pub fn bitmap_scale(strike: &BitmapStrike, height: i32) -> u32 {
    let strike_height = strike.height as i32;
    if strike_height <= 0 {
        return 1;
    }

    let target = bitmap_target_height(strike, height).max(1);
    let mut scale = (target + strike_height - 1) / strike_height;
    let overshoot = scale * strike_height - target;
    if scale > 2 && overshoot > strike_height / 4 {
        scale -= 1;
    } else if scale == 2 && overshoot > strike_height / 4 - 1 {
        scale -= 1;
    }
    scale.max(1) as u32
}
