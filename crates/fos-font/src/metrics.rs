//! Glyph metrics
//!
//! Metrics are computed from the rasterizer's glyph box, scaled to the
//! instance size, adjusted for synthetic bold and italic and transformed by
//! the instance matrix. Untransformed results are cached per glyph in
//! fixed-size blocks allocated on first use.

use crate::descriptor::Matrix;
use crate::raster::LoadedGlyph;

/// Glyphs per cache block
pub const METRICS_BLOCK_SIZE: usize = 128;

/// Metrics of one glyph at one instance size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphMetrics {
    /// Transformed black box size, never zero
    pub black_box_x: u32,
    pub black_box_y: u32,
    /// Top-left corner of the transformed black box relative to the origin
    pub origin_x: i32,
    pub origin_y: i32,
    /// Transformed advance vector
    pub cell_inc_x: i32,
    pub cell_inc_y: i32,
    /// Untransformed advance width
    pub advance: i32,
    pub left_side_bearing: i32,
    /// Untransformed black box width
    pub black_box_width: i32,
}

/// How design units become pixels for one instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphScale {
    pub x: f64,
    pub y: f64,
}

impl GlyphScale {
    /// Scale for a scalable face at `ppem`
    pub fn outline(ppem: u32, units_per_em: u16) -> Self {
        let s = if units_per_em == 0 { 0.0 } else { ppem as f64 / units_per_em as f64 };
        Self { x: s, y: s }
    }

    /// Scale for a bitmap strike magnified by an integer factor
    pub fn bitmap(factor: u32) -> Self {
        Self {
            x: factor as f64,
            y: factor as f64,
        }
    }
}

/// Synthetic styling applied on top of the face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Emulation {
    pub bold: bool,
    pub italic: bool,
}

/// Compute metrics for a loaded glyph
pub fn compute_glyph_metrics(glyph: &LoadedGlyph, scale: GlyphScale, emulation: Emulation, transform: &Matrix) -> GlyphMetrics {
    let mut left = (glyph.x_min as f64 * scale.x).floor() as i32;
    let mut right = (glyph.x_max as f64 * scale.x).ceil() as i32;
    let top = (glyph.y_max as f64 * scale.y).ceil() as i32;
    let bottom = (glyph.y_min as f64 * scale.y).floor() as i32;
    let mut advance = (glyph.advance as f64 * scale.x).round() as i32;

    if emulation.italic {
        // Shear by a quarter of the height
        right += (top as f64 / 4.0).ceil() as i32;
        left += (bottom as f64 / 4.0).floor() as i32;
    }
    if emulation.bold && right > left {
        right += 1;
        advance += 1;
    }

    let black_box_width = right - left;
    let mut metrics = GlyphMetrics {
        advance,
        left_side_bearing: left,
        black_box_width,
        ..Default::default()
    };

    if transform.is_identity() {
        metrics.black_box_x = black_box_width.max(1) as u32;
        metrics.black_box_y = (top - bottom).max(1) as u32;
        metrics.origin_x = left;
        metrics.origin_y = top;
        metrics.cell_inc_x = advance;
        metrics.cell_inc_y = 0;
        return metrics;
    }

    let corners = [
        transform.apply(left as f64, top as f64),
        transform.apply(right as f64, top as f64),
        transform.apply(left as f64, bottom as f64),
        transform.apply(right as f64, bottom as f64),
    ];
    let (min_x, max_x, min_y, max_y) = corners.iter().fold(
        (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
        |(min_x, max_x, min_y, max_y), &(x, y)| (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y)),
    );
    let (x0, x1) = (min_x.floor() as i32, max_x.ceil() as i32);
    let (y0, y1) = (min_y.floor() as i32, max_y.ceil() as i32);
    let (inc_x, inc_y) = transform.apply(advance as f64, 0.0);

    metrics.black_box_x = (x1 - x0).max(1) as u32;
    metrics.black_box_y = (y1 - y0).max(1) as u32;
    metrics.origin_x = x0;
    metrics.origin_y = y1;
    metrics.cell_inc_x = inc_x.round() as i32;
    metrics.cell_inc_y = inc_y.round() as i32;
    metrics
}

type Block = Box<[Option<GlyphMetrics>; METRICS_BLOCK_SIZE]>;

/// Sparse per-glyph metrics cache
#[derive(Debug, Default)]
pub struct GlyphMetricsCache {
    blocks: Vec<Option<Block>>,
    glyph_count: u32,
    cached: usize,
}

impl GlyphMetricsCache {
    /// Cache for a face with `glyph_count` glyphs
    pub fn new(glyph_count: u32) -> Self {
        let blocks = (glyph_count as usize).div_ceil(METRICS_BLOCK_SIZE);
        Self {
            blocks: (0..blocks).map(|_| None).collect(),
            glyph_count,
            cached: 0,
        }
    }

    fn split(&self, glyph: u32) -> Option<(usize, usize)> {
        if glyph >= self.glyph_count {
            return None;
        }
        let glyph = glyph as usize;
        Some((glyph / METRICS_BLOCK_SIZE, glyph % METRICS_BLOCK_SIZE))
    }

    pub fn get(&self, glyph: u32) -> Option<GlyphMetrics> {
        let (block, slot) = self.split(glyph)?;
        self.blocks[block].as_ref()?[slot]
    }

    /// Store metrics for a glyph; out-of-range glyphs are ignored
    pub fn insert(&mut self, glyph: u32, metrics: GlyphMetrics) {
        let Some((block, slot)) = self.split(glyph) else {
            debug_assert!(false, "glyph {glyph} beyond face glyph count {}", self.glyph_count);
            return;
        };
        let block = self.blocks[block].get_or_insert_with(|| Box::new([None; METRICS_BLOCK_SIZE]));
        if block[slot].replace(metrics).is_none() {
            self.cached += 1;
        }
    }

    /// Number of glyphs with cached metrics
    pub fn len(&self) -> usize {
        self.cached
    }

    pub fn is_empty(&self) -> bool {
        self.cached == 0
    }

    /// Number of blocks allocated so far
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }
}
