//! Shared fixtures for fos-font integration tests
//!
//! Font files here are JSON face descriptions read by [`FakeRasterizer`],
//! so tests go through the real catalog, mapping pool and instance cache
//! without shipping binary fonts.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use serde::{Deserialize, Serialize};

use fos_font::raster::{BitmapStrike, CharMapEncoding, LoadedGlyph, LocalizedName, LANG_ENGLISH_US};
use fos_font::{
    CharsetMask, ConfigStore, EngineConfig, FaceProperties, FontBytes, FontEngine, FontError, MemoryStore,
    RasterFace, Rasterizer, Result, StoreValue, Tag,
};

static INIT: Once = Once::new();

/// Route engine logs to the test harness; RUST_LOG selects the level
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One bitmap strike of a fake face
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FakeStrike {
    pub height: i16,
    pub ppem: u16,
    pub internal_leading: i16,
    pub ascent: i16,
}

/// One face inside a fake font file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeFace {
    pub family: String,
    /// Localized family name with its language id
    pub localized: Option<(u16, String)>,
    pub style: String,
    pub full_name: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub weight: u16,
    pub coverage: u32,
    pub version: u32,
    pub strikes: Vec<FakeStrike>,
    pub vertical: bool,
    pub fixed_pitch: bool,
    /// (code point, glyph), ascending by code point
    pub chars: Vec<(u32, u32)>,
    /// Glyph kerning pairs in design units
    pub kern: Vec<(u16, u16, i16)>,
    pub glyph_count: u32,
}

impl FakeFace {
    /// Scalable Latin face mapping A-Z to glyphs 1-26
    pub fn scalable(family: &str, style: &str) -> Self {
        let lower = style.to_lowercase();
        Self {
            family: family.to_string(),
            localized: None,
            style: style.to_string(),
            full_name: Some(format!("{family} {style}")),
            bold: lower.contains("bold"),
            italic: lower.contains("italic"),
            weight: if lower.contains("bold") { 700 } else { 400 },
            coverage: CharsetMask::LATIN1.0,
            version: 0x0001_0000,
            strikes: Vec::new(),
            vertical: false,
            fixed_pitch: false,
            chars: ('A' as u32..='Z' as u32).map(|c| (c, c - 0x40)).collect(),
            kern: Vec::new(),
            glyph_count: 64,
        }
    }

    /// Bitmap face with one strike per cell height
    pub fn bitmap(family: &str, heights: &[i16]) -> Self {
        let mut face = Self::scalable(family, "Regular");
        face.strikes = heights
            .iter()
            .map(|&height| FakeStrike {
                height,
                ppem: height as u16,
                internal_leading: 0,
                ascent: height - height / 4,
            })
            .collect();
        face
    }

    pub fn with_chars(mut self, chars: impl IntoIterator<Item = (u32, u32)>) -> Self {
        self.chars = chars.into_iter().collect();
        self.chars.sort_unstable();
        self
    }

    pub fn with_coverage(mut self, coverage: CharsetMask) -> Self {
        self.coverage = coverage.0;
        self
    }

    pub fn with_kern(mut self, pairs: &[(u16, u16, i16)]) -> Self {
        self.kern = pairs.to_vec();
        self
    }

    pub fn with_localized(mut self, language: u16, name: &str) -> Self {
        self.localized = Some((language, name.to_string()));
        self
    }

    fn properties(&self) -> FaceProperties {
        let mut family_names = vec![LocalizedName {
            language: LANG_ENGLISH_US,
            name: self.family.clone(),
        }];
        if let Some((language, name)) = &self.localized {
            family_names.push(LocalizedName {
                language: *language,
                name: name.clone(),
            });
        }

        FaceProperties {
            family_names,
            style_name: self.style.clone(),
            full_name: self.full_name.clone(),
            bold: self.bold,
            italic: self.italic,
            weight: self.weight,
            scalable: self.strikes.is_empty(),
            strikes: self
                .strikes
                .iter()
                .map(|s| BitmapStrike {
                    height: s.height,
                    width: s.height / 2,
                    size: s.height,
                    x_ppem: s.ppem,
                    y_ppem: s.ppem,
                    internal_leading: s.internal_leading,
                    ascent: s.ascent,
                })
                .collect(),
            coverage: CharsetMask(self.coverage),
            revision: self.version,
            has_vertical_metrics: self.vertical,
            units_per_em: 1024,
            ascender: 800,
            descender: -224,
            win_ascent: 800,
            win_descent: 224,
            glyph_count: self.glyph_count,
            fixed_pitch: self.fixed_pitch,
        }
    }

    fn kern_table(&self) -> Option<Vec<u8>> {
        if self.kern.is_empty() {
            return None;
        }
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&((14 + self.kern.len() * 6) as u16).to_be_bytes());
        data.extend_from_slice(&0x0001u16.to_be_bytes());
        data.extend_from_slice(&(self.kern.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0u8; 6]);
        for &(left, right, value) in &self.kern {
            data.extend_from_slice(&left.to_be_bytes());
            data.extend_from_slice(&right.to_be_bytes());
            data.extend_from_slice(&value.to_be_bytes());
        }
        Some(data)
    }
}

/// Contents of a fake font file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FakeFont {
    pub faces: Vec<FakeFace>,
}

impl FakeFont {
    pub fn single(face: FakeFace) -> Self {
        Self { faces: vec![face] }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("serialize fake font")
    }

    fn parse(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| FontError::UnsupportedFormat(e.to_string()))
    }
}

/// Rasterizer for [`FakeFont`] files
#[derive(Debug, Default)]
pub struct FakeRasterizer;

impl Rasterizer for FakeRasterizer {
    fn face_count(&self, data: &[u8]) -> Result<u32> {
        Ok(FakeFont::parse(data)?.faces.len() as u32)
    }

    fn open_face(&self, data: FontBytes, index: u32) -> Result<Box<dyn RasterFace>> {
        let font = FakeFont::parse(&data)?;
        let count = font.faces.len() as u32;
        let desc = font
            .faces
            .into_iter()
            .nth(index as usize)
            .ok_or(FontError::FaceIndexOutOfRange { index, count })?;
        Ok(Box::new(FakeRasterFace {
            props: desc.properties(),
            kern: desc.kern_table(),
            desc,
            data,
            pixel_size: (0, 0),
            encoding: None,
        }))
    }
}

struct FakeRasterFace {
    desc: FakeFace,
    props: FaceProperties,
    kern: Option<Vec<u8>>,
    data: FontBytes,
    pixel_size: (u32, u32),
    encoding: Option<CharMapEncoding>,
}

impl RasterFace for FakeRasterFace {
    fn properties(&self) -> &FaceProperties {
        &self.props
    }

    fn set_pixel_size(&mut self, width: u32, height: u32) -> Result<()> {
        if height == 0 {
            return Err(FontError::InvalidPixelSize { width, height });
        }
        self.pixel_size = (if width == 0 { height } else { width }, height);
        Ok(())
    }

    fn pixel_size(&self) -> (u32, u32) {
        self.pixel_size
    }

    fn load_glyph(&self, glyph: u32) -> Option<LoadedGlyph> {
        if glyph >= self.props.glyph_count {
            return None;
        }
        if self.props.scalable {
            Some(LoadedGlyph {
                x_min: 0,
                y_min: 0,
                x_max: 512,
                y_max: 768,
                advance: 640,
                left_bearing: 0,
            })
        } else {
            let (w, h) = (self.pixel_size.0 as i32, self.pixel_size.1 as i32);
            Some(LoadedGlyph {
                x_min: 0,
                y_min: 0,
                x_max: w / 2,
                y_max: h,
                advance: w / 2,
                left_bearing: 0,
            })
        }
    }

    fn table(&self, tag: Tag) -> Option<&[u8]> {
        if tag == Tag::KERN {
            return self.kern.as_deref();
        }
        None
    }

    fn font_data(&self) -> &[u8] {
        &self.data
    }

    fn select_character_map(&mut self, encoding: CharMapEncoding) -> bool {
        if encoding == CharMapEncoding::Unicode {
            self.encoding = Some(encoding);
            return true;
        }
        false
    }

    fn first_char(&self) -> Option<(u32, u32)> {
        self.desc.chars.first().copied()
    }

    fn next_char(&self, code: u32) -> Option<(u32, u32)> {
        self.desc.chars.iter().find(|(c, _)| *c > code).copied()
    }

    fn char_index(&self, code: u32) -> Option<u32> {
        self.desc.chars.iter().find(|(c, _)| *c == code).map(|(_, g)| *g)
    }
}

/// Temporary font directory, removed on drop
pub struct FontDir {
    pub path: PathBuf,
}

impl FontDir {
    pub fn new(name: &str) -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("fos-font-{}-{}-{}", name, std::process::id(), n));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("create font dir");
        Self { path }
    }

    /// Write a font file and return its path
    pub fn add(&self, file_name: &str, font: &FakeFont) -> PathBuf {
        let path = self.path.join(file_name);
        fs::write(&path, font.to_bytes()).expect("write font file");
        path
    }

    pub fn add_face(&self, file_name: &str, face: FakeFace) -> PathBuf {
        self.add(file_name, &FakeFont::single(face))
    }

    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            font_dirs: vec![self.path.clone()],
            scan_system_fonts: false,
            persist_catalog: false,
            ..Default::default()
        }
    }
}

impl Drop for FontDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn engine_with(config: EngineConfig, store: impl ConfigStore + 'static) -> FontEngine {
    init_tracing();
    FontEngine::with_rasterizer(config, Box::new(store), Arc::new(FakeRasterizer)).expect("engine")
}

/// Engine over `dir` with an empty store
pub fn engine(dir: &FontDir) -> FontEngine {
    engine_with(dir.config(), MemoryStore::new())
}

pub fn file_name(path: &Path) -> String {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string()
}

/// Store handle that outlives the engine it is given to
#[derive(Clone, Default)]
pub struct SharedStore(pub Arc<Mutex<MemoryStore>>);

impl SharedStore {
    pub fn read(&self, key: &str, name: &str) -> Option<StoreValue> {
        self.0.lock().unwrap().read_value(key, name).unwrap()
    }

    pub fn values(&self, key: &str) -> Vec<(String, StoreValue)> {
        self.0.lock().unwrap().enumerate_values(key).unwrap()
    }
}

impl ConfigStore for SharedStore {
    fn enumerate_subkeys(&self, key: &str) -> Result<Vec<String>> {
        self.0.lock().unwrap().enumerate_subkeys(key)
    }

    fn enumerate_values(&self, key: &str) -> Result<Vec<(String, StoreValue)>> {
        self.0.lock().unwrap().enumerate_values(key)
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<StoreValue>> {
        self.0.lock().unwrap().read_value(key, name)
    }

    fn write_value(&mut self, key: &str, name: &str, value: StoreValue) -> Result<()> {
        self.0.lock().unwrap().write_value(key, name, value)
    }

    fn create_key(&mut self, key: &str) -> Result<()> {
        self.0.lock().unwrap().create_key(key)
    }

    fn delete_key(&mut self, key: &str) -> Result<()> {
        self.0.lock().unwrap().delete_key(key)
    }

    fn delete_value(&mut self, key: &str, name: &str) -> Result<bool> {
        self.0.lock().unwrap().delete_value(key, name)
    }
}
