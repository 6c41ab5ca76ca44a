//! Font requests and the instance cache key

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::charset::Charset;
use crate::names::{fold_name, names_equal};

/// Pitch (low nibble) and family class (high nibble) of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PitchFamily(pub u8);

impl PitchFamily {
    pub const DEFAULT_PITCH: u8 = 0;
    pub const FIXED_PITCH: u8 = 1;
    pub const VARIABLE_PITCH: u8 = 2;

    pub const FF_DONTCARE: u8 = 0x00;
    pub const FF_ROMAN: u8 = 0x10;
    pub const FF_SWISS: u8 = 0x20;
    pub const FF_MODERN: u8 = 0x30;
    pub const FF_SCRIPT: u8 = 0x40;
    pub const FF_DECORATIVE: u8 = 0x50;

    pub const fn new(pitch: u8, family: u8) -> Self {
        Self((pitch & 0x0F) | (family & 0xF0))
    }

    pub const fn pitch(self) -> u8 {
        self.0 & 0x0F
    }

    pub const fn family(self) -> u8 {
        self.0 & 0xF0
    }

    pub const fn is_fixed(self) -> bool {
        self.0 & Self::FIXED_PITCH != 0
    }
}

/// Logical font request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFont {
    /// Cell height if positive, character (em) height if negative, 0 for default
    pub height: i32,
    pub width: i32,
    /// Tenths of a degree
    pub escapement: i32,
    pub orientation: i32,
    pub weight: i32,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
    pub charset: Charset,
    pub pitch_family: PitchFamily,
    pub face_name: String,
}

impl LogFont {
    /// Request for `face_name` at the given height
    pub fn new(face_name: &str, height: i32) -> Self {
        Self {
            height,
            weight: 400,
            face_name: face_name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    pub fn with_pitch_family(mut self, pitch_family: PitchFamily) -> Self {
        self.pitch_family = pitch_family;
        self
    }

    pub fn is_bold(&self) -> bool {
        self.weight > 550
    }
}

/// 2x2 transform applied to a font
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        m11: 1.0,
        m12: 0.0,
        m21: 0.0,
        m22: 1.0,
    };

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            m11: sx,
            m12: 0.0,
            m21: 0.0,
            m22: sy,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// `self` followed by `other`
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            m11: self.m11 * other.m11 + self.m12 * other.m21,
            m12: self.m11 * other.m12 + self.m12 * other.m22,
            m21: self.m21 * other.m11 + self.m22 * other.m21,
            m22: self.m21 * other.m12 + self.m22 * other.m22,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.m11 + y * self.m21, x * self.m12 + y * self.m22)
    }

    fn hash_bits<H: Hasher>(&self, state: &mut H) {
        for v in [self.m11, self.m12, self.m21, self.m22] {
            // -0.0 and 0.0 compare equal, so they must hash equal
            let v = if v == 0.0 { 0.0 } else { v };
            v.to_bits().hash(state);
        }
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A request as the instance cache sees it.
///
/// The cache key is the logical font plus the transform. Bitmap permission
/// is not part of the key: the cache checks it against the cached face.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FontDescriptor {
    pub logfont: LogFont,
    pub matrix: Matrix,
    pub can_use_bitmap: bool,
}

impl FontDescriptor {
    pub fn new(logfont: LogFont) -> Self {
        Self {
            logfont,
            matrix: Matrix::IDENTITY,
            can_use_bitmap: true,
        }
    }

    pub fn with_matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_bitmaps(mut self, can_use_bitmap: bool) -> Self {
        self.can_use_bitmap = can_use_bitmap;
        self
    }

    /// Hash used as a fast pre-check before [`FontDescriptor::matches`]
    pub fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let lf = &self.logfont;
        lf.height.hash(&mut hasher);
        lf.width.hash(&mut hasher);
        lf.escapement.hash(&mut hasher);
        lf.orientation.hash(&mut hasher);
        lf.weight.hash(&mut hasher);
        lf.italic.hash(&mut hasher);
        lf.underline.hash(&mut hasher);
        lf.strikeout.hash(&mut hasher);
        lf.charset.hash(&mut hasher);
        lf.pitch_family.hash(&mut hasher);
        fold_name(&lf.face_name).hash(&mut hasher);
        self.matrix.hash_bits(&mut hasher);
        hasher.finish()
    }

    /// Key equality; face names compare case-insensitively
    pub fn matches(&self, other: &FontDescriptor) -> bool {
        let (a, b) = (&self.logfont, &other.logfont);
        self.matrix == other.matrix
            && a.height == b.height
            && a.width == b.width
            && a.escapement == b.escapement
            && a.orientation == b.orientation
            && a.weight == b.weight
            && a.italic == b.italic
            && a.underline == b.underline
            && a.strikeout == b.strikeout
            && a.charset == b.charset
            && a.pitch_family == b.pitch_family
            && names_equal(&a.face_name, &b.face_name)
    }
}
