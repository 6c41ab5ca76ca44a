//! Font instances
//!
//! A [`FontInstance`] is one face opened at one size and transform. It owns
//! its rasterizer face and a reference to the shared file mapping, and
//! lazily builds the glyph metrics, kerning and vertical-substitution
//! tables. Fallback children are opened on first use and owned by their
//! base instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::catalog::{Catalog, Face, FaceId, FaceSource};
use crate::charset::Charset;
use crate::config::EngineConfig;
use crate::descriptor::{FontDescriptor, Matrix};
use crate::mapping::{FontBytes, MappingPool, MappingRef};
use crate::metrics::{compute_glyph_metrics, Emulation, GlyphMetrics, GlyphMetricsCache, GlyphScale};
use crate::raster::{BitmapStrike, CharMapEncoding, RasterFace, Rasterizer};
use crate::select::Selection;
use crate::size::{bitmap_scale, mul_div, scalable_size};
use crate::tables::gsub::VerticalSubstitution;
use crate::tables::kern::{parse_kern, to_char_pairs, KerningPair};
use crate::tables::vdmx::VdmxEntry;
use crate::tables::Tag;
use crate::{FontError, Result};

/// Caller-side handle referencing an instance (one per selecting context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontHandle(pub u64);

/// Identity of an opened instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Everything opening an instance or its children needs
pub struct InstanceEnv<'a> {
    pub catalog: &'a Catalog,
    pub pool: &'a mut MappingPool,
    pub rasterizer: &'a dyn Rasterizer,
    pub config: &'a EngineConfig,
}

/// Glyph resolved through the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedGlyph {
    pub glyph: u32,
    /// 0 for the base face, n for the n-th fallback child
    pub link_level: usize,
    pub face: FaceId,
}

/// Run of consecutive mapped code points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeRange {
    pub first: u32,
    pub count: u32,
}

/// Code points a face maps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnicodeCoverage {
    pub ranges: Vec<UnicodeRange>,
    /// Total number of mapped code points
    pub total: u32,
}

/// Device metrics of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceMetrics {
    pub ppem: u32,
    pub ascent: i32,
    pub descent: i32,
    pub height: i32,
    pub internal_leading: i32,
    /// Integer magnification of a bitmap strike, 1 for scalable faces
    pub scale: u32,
    pub scalable: bool,
    pub fake_bold: bool,
    pub fake_italic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstanceSize {
    Scalable { ppem: u32, vdmx: Option<VdmxEntry> },
    Bitmap { strike: BitmapStrike, scale: u32 },
}

enum ChildState {
    Unopened,
    Open(Box<FontInstance>),
    Failed,
}

struct ChildSlot {
    face: FaceId,
    state: ChildState,
}

/// One face opened at one size and transform
pub struct FontInstance {
    id: InstanceId,
    desc: FontDescriptor,
    hash: u64,
    face: FaceId,
    display_name: String,
    charset: Charset,
    scalable: bool,
    vertical: bool,
    emulation: Emulation,
    size: InstanceSize,
    /// Transform applied to glyph metrics; bitmap instances ignore the
    /// requested matrix
    transform: Matrix,
    encoding: Option<CharMapEncoding>,
    raster: Box<dyn RasterFace>,
    mapping: Option<MappingRef>,
    metrics: GlyphMetricsCache,
    kerning: Option<Vec<KerningPair>>,
    vertical_subst: Option<Option<VerticalSubstitution>>,
    children: Vec<ChildSlot>,
    base: Option<InstanceId>,
    handles: Vec<FontHandle>,
}

fn acquire_bytes(pool: &mut MappingPool, source: &FaceSource) -> Result<(Option<MappingRef>, FontBytes)> {
    match source {
        FaceSource::File { path, .. } => {
            let (mapping, bytes) = pool.open(path)?;
            Ok((Some(mapping), bytes))
        }
        FaceSource::Memory { data, .. } => Ok((None, FontBytes::Owned(data.clone()))),
    }
}

fn open_sized(
    rasterizer: &dyn Rasterizer,
    config: &EngineConfig,
    face: &Face,
    desc: &FontDescriptor,
    bytes: FontBytes,
) -> Result<(Box<dyn RasterFace>, InstanceSize)> {
    let mut raster = rasterizer.open_face(bytes, face.source.index())?;
    let height = desc.logfont.height;

    let size = if face.scalable {
        let size = scalable_size(raster.properties(), raster.table(Tag::VDMX), config.device_aspect, height);
        raster.set_pixel_size(0, size.ppem)?;
        InstanceSize::Scalable {
            ppem: size.ppem,
            vdmx: size.vdmx,
        }
    } else {
        let strike = face
            .bitmap
            .ok_or_else(|| FontError::Malformed(format!("{} {} has no bitmap strike", face.family, face.style_name)))?;
        raster.set_pixel_size(strike.x_ppem as u32, strike.y_ppem as u32)?;
        InstanceSize::Bitmap {
            strike,
            scale: bitmap_scale(&strike, height),
        }
    };
    Ok((raster, size))
}

impl FontInstance {
    /// Open `face` for a request. Nothing is retained on failure.
    pub fn open(
        pool: &mut MappingPool,
        rasterizer: &dyn Rasterizer,
        config: &EngineConfig,
        face: &Face,
        desc: FontDescriptor,
        selection: &Selection,
    ) -> Result<Self> {
        let (mapping, bytes) = acquire_bytes(pool, &face.source)?;

        let (mut raster, size) = match open_sized(rasterizer, config, face, &desc, bytes) {
            Ok(opened) => opened,
            Err(e) => {
                if let Some(mapping) = mapping {
                    pool.close(mapping);
                }
                tracing::warn!("Failed to open {:?}: {}", face.source, e);
                return Err(e);
            }
        };

        let preferred = if selection.charset == Charset::SYMBOL {
            [CharMapEncoding::Symbol, CharMapEncoding::Unicode]
        } else {
            [CharMapEncoding::Unicode, CharMapEncoding::Symbol]
        };
        let encoding = preferred.into_iter().find(|enc| raster.select_character_map(*enc));
        if encoding.is_none() {
            tracing::debug!("{:?}: no usable character map", face.source);
        }

        let transform = if face.scalable { desc.matrix } else { Matrix::IDENTITY };
        let glyph_count = raster.properties().glyph_count;
        let instance = Self {
            id: InstanceId::next(),
            hash: desc.hash_value(),
            desc,
            face: face.id,
            display_name: selection.display_name.clone(),
            charset: selection.charset,
            scalable: face.scalable,
            vertical: face.vertical,
            emulation: Emulation {
                bold: selection.fake_bold,
                italic: selection.fake_italic,
            },
            size,
            transform,
            encoding,
            raster,
            mapping,
            metrics: GlyphMetricsCache::new(glyph_count),
            kerning: None,
            vertical_subst: None,
            children: Vec::new(),
            base: None,
            handles: Vec::new(),
        };
        tracing::debug!(
            "Opened instance {:?}: {} {} at {} ppem",
            instance.id,
            face.family,
            face.style_name,
            instance.ppem()
        );
        Ok(instance)
    }

    /// Release the rasterizer face, the mapping and every opened child
    pub fn close(self, pool: &mut MappingPool) {
        let FontInstance {
            id,
            raster,
            mapping,
            children,
            ..
        } = self;

        for slot in children {
            if let ChildState::Open(child) = slot.state {
                child.close(pool);
            }
        }
        drop(raster);
        if let Some(mapping) = mapping {
            pool.close(mapping);
        }
        tracing::trace!("Closed instance {:?}", id);
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn descriptor(&self) -> &FontDescriptor {
        &self.desc
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn face(&self) -> FaceId {
        self.face
    }

    /// Name the caller asked for, before substitution
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn is_scalable(&self) -> bool {
        self.scalable
    }

    pub fn is_vertical(&self) -> bool {
        self.vertical
    }

    pub fn emulation(&self) -> Emulation {
        self.emulation
    }

    /// Instance this one is a fallback child of
    pub fn base(&self) -> Option<InstanceId> {
        self.base
    }

    /// Effective pixels per em
    pub fn ppem(&self) -> u32 {
        match self.size {
            InstanceSize::Scalable { ppem, .. } => ppem,
            InstanceSize::Bitmap { strike, scale } => strike.y_ppem as u32 * scale,
        }
    }

    /// Bitmap magnification, 1 for scalable faces
    pub fn scale(&self) -> u32 {
        match self.size {
            InstanceSize::Scalable { .. } => 1,
            InstanceSize::Bitmap { scale, .. } => scale,
        }
    }

    // -- Handles --

    /// Attach a caller handle; attaching the same handle twice is a no-op
    pub fn attach(&mut self, handle: FontHandle) -> bool {
        if self.handles.contains(&handle) {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Detach a caller handle. Returns false if it was not attached.
    pub fn detach(&mut self, handle: FontHandle) -> bool {
        match self.handles.iter().position(|h| *h == handle) {
            Some(pos) => {
                self.handles.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    // -- Fallback children --

    /// Append a fallback face; duplicates and the instance's own face are ignored
    pub fn add_child(&mut self, face: FaceId) {
        if face == self.face || self.children.iter().any(|c| c.face == face) {
            return;
        }
        self.children.push(ChildSlot {
            face,
            state: ChildState::Unopened,
        });
    }

    pub fn child_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.children.iter().map(|c| c.face)
    }

    /// Number of children currently opened
    pub fn open_child_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c.state, ChildState::Open(_)))
            .count()
    }

    fn open_child(&self, env: &mut InstanceEnv<'_>, face_id: FaceId) -> Option<FontInstance> {
        let face = env.catalog.face(face_id)?;
        let mut logfont = self.desc.logfont.clone();
        logfont.height = -(self.ppem() as i32);
        logfont.face_name = face.family.clone();
        let desc = FontDescriptor {
            logfont,
            matrix: self.desc.matrix,
            can_use_bitmap: self.desc.can_use_bitmap,
        };
        let selection = Selection {
            face: face_id,
            display_name: face.family.clone(),
            charset: self.charset,
            fake_bold: self.emulation.bold,
            fake_italic: self.emulation.italic,
        };

        match FontInstance::open(env.pool, env.rasterizer, env.config, face, desc, &selection) {
            Ok(mut child) => {
                child.base = Some(self.id);
                Some(child)
            }
            Err(e) => {
                tracing::debug!("Fallback {} for {:?} unavailable: {}", face.family, self.id, e);
                None
            }
        }
    }

    // -- Glyphs --

    /// Glyph for a character in this face only
    pub fn glyph_index(&mut self, ch: u32) -> Option<u32> {
        let mut glyph = self.raster.char_index(ch);
        if glyph.is_none() && self.encoding == Some(CharMapEncoding::Symbol) && ch < 0x100 {
            glyph = self.raster.char_index(ch + 0xF000);
        }
        let glyph = glyph?;

        if !self.vertical {
            return Some(glyph);
        }
        match (u16::try_from(glyph), self.vertical_substitution()) {
            (Ok(id), Some(subst)) => Some(subst.apply(id) as u32),
            _ => Some(glyph),
        }
    }

    /// Resolve a character through the base face and then its fallback chain
    pub fn glyph_for_char(&mut self, env: &mut InstanceEnv<'_>, ch: u32) -> Option<LinkedGlyph> {
        if let Some(glyph) = self.glyph_index(ch) {
            return Some(LinkedGlyph {
                glyph,
                link_level: 0,
                face: self.face,
            });
        }

        for i in 0..self.children.len() {
            if matches!(self.children[i].state, ChildState::Unopened) {
                let face = self.children[i].face;
                self.children[i].state = match self.open_child(env, face) {
                    Some(child) => ChildState::Open(Box::new(child)),
                    None => ChildState::Failed,
                };
            }

            let slot = &mut self.children[i];
            let ChildState::Open(child) = &mut slot.state else {
                continue;
            };
            if let Some(glyph) = child.glyph_index(ch) {
                return Some(LinkedGlyph {
                    glyph,
                    link_level: i + 1,
                    face: slot.face,
                });
            }
        }
        None
    }

    fn glyph_scale(&self) -> GlyphScale {
        match self.size {
            InstanceSize::Scalable { ppem, .. } => GlyphScale::outline(ppem, self.raster.properties().units_per_em),
            InstanceSize::Bitmap { scale, .. } => GlyphScale::bitmap(scale),
        }
    }

    /// Metrics of a glyph with an extra transform applied after the
    /// instance's own. Identity-transform results are cached.
    pub fn glyph_metrics(&mut self, glyph: u32, extra: &Matrix) -> Option<GlyphMetrics> {
        let count = self.raster.properties().glyph_count;
        if glyph >= count {
            debug_assert!(false, "glyph {glyph} out of range (face has {count} glyphs)");
            return None;
        }

        let cacheable = extra.is_identity();
        if cacheable {
            if let Some(metrics) = self.metrics.get(glyph) {
                return Some(metrics);
            }
        }

        let loaded = self.raster.load_glyph(glyph)?;
        let transform = self.transform.then(extra);
        let metrics = compute_glyph_metrics(&loaded, self.glyph_scale(), self.emulation, &transform);
        if cacheable {
            self.metrics.insert(glyph, metrics);
        }
        Some(metrics)
    }

    /// Number of glyphs with cached metrics
    pub fn cached_metrics(&self) -> usize {
        self.metrics.len()
    }

    pub fn metrics(&self) -> InstanceMetrics {
        let props = self.raster.properties();
        let (ppem, ascent, descent, internal_leading) = match self.size {
            InstanceSize::Scalable { ppem, vdmx: Some(entry) } => {
                let ascent = entry.y_max as i32;
                let descent = -(entry.y_min as i32);
                (ppem, ascent, descent, ascent + descent - ppem as i32)
            }
            InstanceSize::Scalable { ppem, vdmx: None } => {
                let (asc, desc) = if props.win_ascent as u32 + props.win_descent as u32 > 0 {
                    (props.win_ascent as i32, props.win_descent as i32)
                } else {
                    (props.ascender as i32, -(props.descender as i32))
                };
                let upem = props.units_per_em as i32;
                let ascent = mul_div(asc, ppem as i32, upem);
                let descent = mul_div(desc, ppem as i32, upem);
                (ppem, ascent, descent, ascent + descent - ppem as i32)
            }
            InstanceSize::Bitmap { strike, scale } => {
                let scale = scale as i32;
                let ascent = strike.ascent as i32 * scale;
                let height = strike.height as i32 * scale;
                (self.ppem(), ascent, height - ascent, strike.internal_leading as i32 * scale)
            }
        };

        InstanceMetrics {
            ppem,
            ascent,
            descent,
            height: ascent + descent,
            internal_leading: internal_leading.max(0),
            scale: self.scale(),
            scalable: self.scalable,
            fake_bold: self.emulation.bold,
            fake_italic: self.emulation.italic,
        }
    }

    // -- Tables --

    /// Copy table bytes (or the whole file when `tag` is `None`) starting at
    /// `offset`. Without a buffer, returns the number of bytes available.
    pub fn table_bytes(&self, tag: Option<Tag>, offset: usize, buffer: Option<&mut [u8]>) -> Option<usize> {
        let data = match tag {
            Some(tag) => self.raster.table(tag)?,
            None => self.raster.font_data(),
        };
        let available = data.get(offset..)?;
        match buffer {
            None => Some(available.len()),
            Some(buffer) => {
                let n = buffer.len().min(available.len());
                buffer[..n].copy_from_slice(&available[..n]);
                Some(n)
            }
        }
    }

    /// Kerning pairs scaled to this instance, parsed on first use
    pub fn kerning_pairs(&mut self) -> &[KerningPair] {
        if self.kerning.is_none() {
            self.kerning = Some(self.load_kerning());
        }
        self.kerning.as_deref().unwrap_or_default()
    }

    fn load_kerning(&self) -> Vec<KerningPair> {
        let Some(data) = self.raster.table(Tag::KERN) else {
            return Vec::new();
        };
        let pairs = match parse_kern(data) {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::debug!("{:?}: unreadable kern table: {}", self.id, e);
                return Vec::new();
            }
        };
        if pairs.is_empty() {
            return Vec::new();
        }

        // Characters come in ascending order, so each glyph keeps its lowest code
        let mut glyph_to_char = HashMap::new();
        let mut next = self.raster.first_char();
        while let Some((code, glyph)) = next {
            glyph_to_char.entry(glyph).or_insert(code);
            next = self.raster.next_char(code);
        }

        let kerning = to_char_pairs(&pairs, &glyph_to_char, self.ppem(), self.raster.properties().units_per_em);
        tracing::trace!("{:?}: {} kerning pairs", self.id, kerning.len());
        kerning
    }

    fn vertical_substitution(&mut self) -> Option<&VerticalSubstitution> {
        if self.vertical_subst.is_none() {
            let parsed = self.raster.table(Tag::GSUB).and_then(|data| {
                VerticalSubstitution::parse(data, self.charset.opentype_script(), None)
                    .map_err(|e| tracing::debug!("{:?}: unreadable GSUB table: {}", self.id, e))
                    .ok()
                    .flatten()
            });
            self.vertical_subst = Some(parsed);
        }
        self.vertical_subst.as_ref()?.as_ref()
    }

    /// Consecutive runs of mapped code points in the Unicode character map
    pub fn unicode_coverage(&self) -> UnicodeCoverage {
        let mut coverage = UnicodeCoverage::default();
        if self.encoding != Some(CharMapEncoding::Unicode) {
            tracing::debug!("{:?}: no Unicode character map", self.id);
            return coverage;
        }

        let mut next = self.raster.first_char();
        while let Some((code, _)) = next {
            match coverage.ranges.last_mut() {
                Some(range) if range.first + range.count == code => range.count += 1,
                _ => coverage.ranges.push(UnicodeRange { first: code, count: 1 }),
            }
            coverage.total += 1;
            next = self.raster.next_char(code);
        }
        coverage
    }
}

impl std::fmt::Debug for FontInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontInstance")
            .field("id", &self.id)
            .field("face", &self.face)
            .field("display_name", &self.display_name)
            .field("ppem", &self.ppem())
            .field("handles", &self.handles)
            .finish()
    }
}
