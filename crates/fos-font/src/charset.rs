//! Character sets and coverage signatures
//!
//! A [`Charset`] is the legacy one-byte character-set id carried by font
//! requests. A [`CharsetMask`] is the 32-bit code page signature a face
//! advertises (the OS/2 `ulCodePageRange1` bits). The translation table
//! between the two, and the codepage each one maps to, lives here.

use std::fmt;

/// Legacy character-set identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Charset(pub u8);

impl Charset {
    pub const ANSI: Charset = Charset(0);
    /// Pseudo-charset: resolve through the active codepage
    pub const DEFAULT: Charset = Charset(1);
    pub const SYMBOL: Charset = Charset(2);
    pub const MAC: Charset = Charset(77);
    pub const SHIFTJIS: Charset = Charset(128);
    pub const HANGUL: Charset = Charset(129);
    pub const JOHAB: Charset = Charset(130);
    pub const GB2312: Charset = Charset(134);
    pub const BIG5: Charset = Charset(136);
    pub const GREEK: Charset = Charset(161);
    pub const TURKISH: Charset = Charset(162);
    pub const VIETNAMESE: Charset = Charset(163);
    pub const HEBREW: Charset = Charset(177);
    pub const ARABIC: Charset = Charset(178);
    pub const BALTIC: Charset = Charset(186);
    pub const RUSSIAN: Charset = Charset(204);
    pub const THAI: Charset = Charset(222);
    pub const EASTEUROPE: Charset = Charset(238);
    pub const OEM: Charset = Charset(255);

    /// Coverage bit this charset maps to, if it is a known charset
    pub fn mask(self) -> Option<CharsetMask> {
        CHARSET_TABLE
            .iter()
            .find(|info| info.charset == self)
            .map(|info| CharsetMask(1 << info.bit))
    }

    /// Codepage used to encode text in this charset
    pub fn codepage(self) -> Option<u16> {
        CHARSET_TABLE
            .iter()
            .find(|info| info.charset == self)
            .map(|info| info.codepage)
    }

    /// Charset matching a Windows-style codepage number
    pub fn from_codepage(codepage: u16) -> Option<Charset> {
        CHARSET_TABLE
            .iter()
            .find(|info| info.codepage == codepage)
            .map(|info| info.charset)
    }

    /// Whether this charset belongs to an East Asian script
    pub fn is_east_asian(self) -> bool {
        matches!(
            self,
            Charset::SHIFTJIS | Charset::HANGUL | Charset::JOHAB | Charset::GB2312 | Charset::BIG5
        )
    }

    /// OpenType script tag used when looking up GSUB features for this charset
    pub fn opentype_script(self) -> [u8; 4] {
        match self {
            Charset::BIG5 | Charset::GB2312 => *b"hani",
            Charset::GREEK => *b"grek",
            Charset::HANGUL => *b"hang",
            Charset::RUSSIAN => *b"cyrl",
            Charset::SHIFTJIS => *b"kana",
            Charset::ARABIC => *b"arab",
            Charset::HEBREW => *b"hebr",
            Charset::THAI => *b"thai",
            _ => *b"latn",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Code page coverage signature (one bit per supported charset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharsetMask(pub u32);

impl CharsetMask {
    pub const EMPTY: Self = Self(0);
    pub const LATIN1: Self = Self(1 << 0);
    pub const SYMBOL: Self = Self(1 << 31);

    /// Mask covering every East Asian charset
    pub const EAST_ASIAN: Self = Self((1 << 17) | (1 << 18) | (1 << 19) | (1 << 20) | (1 << 21));

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Charsets whose coverage bit is set, in table order
    pub fn charsets(self) -> impl Iterator<Item = Charset> {
        CHARSET_TABLE
            .iter()
            .filter(move |info| self.0 & (1 << info.bit) != 0)
            .map(|info| info.charset)
    }

    /// First charset present in this mask
    pub fn first_charset(self) -> Option<Charset> {
        self.charsets().next()
    }
}

impl std::ops::BitOr for CharsetMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CharsetMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Requested coverage: either unrestricted or a concrete signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coverage {
    #[default]
    Any,
    Mask(CharsetMask),
}

impl Coverage {
    /// Whether a face advertising `native | linked` satisfies this request
    pub fn accepts(self, native: CharsetMask, linked: CharsetMask) -> bool {
        match self {
            Coverage::Any => true,
            Coverage::Mask(mask) => mask.intersects(native | linked),
        }
    }
}

struct CharsetInfo {
    charset: Charset,
    codepage: u16,
    bit: u8,
}

const CHARSET_TABLE: &[CharsetInfo] = &[
    CharsetInfo { charset: Charset::ANSI, codepage: 1252, bit: 0 },
    CharsetInfo { charset: Charset::EASTEUROPE, codepage: 1250, bit: 1 },
    CharsetInfo { charset: Charset::RUSSIAN, codepage: 1251, bit: 2 },
    CharsetInfo { charset: Charset::GREEK, codepage: 1253, bit: 3 },
    CharsetInfo { charset: Charset::TURKISH, codepage: 1254, bit: 4 },
    CharsetInfo { charset: Charset::HEBREW, codepage: 1255, bit: 5 },
    CharsetInfo { charset: Charset::ARABIC, codepage: 1256, bit: 6 },
    CharsetInfo { charset: Charset::BALTIC, codepage: 1257, bit: 7 },
    CharsetInfo { charset: Charset::VIETNAMESE, codepage: 1258, bit: 8 },
    CharsetInfo { charset: Charset::THAI, codepage: 874, bit: 16 },
    CharsetInfo { charset: Charset::SHIFTJIS, codepage: 932, bit: 17 },
    CharsetInfo { charset: Charset::GB2312, codepage: 936, bit: 18 },
    CharsetInfo { charset: Charset::HANGUL, codepage: 949, bit: 19 },
    CharsetInfo { charset: Charset::BIG5, codepage: 950, bit: 20 },
    CharsetInfo { charset: Charset::JOHAB, codepage: 1361, bit: 21 },
    CharsetInfo { charset: Charset::MAC, codepage: 10000, bit: 29 },
    CharsetInfo { charset: Charset::OEM, codepage: 437, bit: 30 },
    CharsetInfo { charset: Charset::SYMBOL, codepage: 42, bit: 31 },
];

/// Translate a requested charset into the coverage a face must offer.
///
/// The default pseudo-charset resolves through `active_codepage`. Unknown
/// charsets, or a codepage with no charset, fall back to [`Coverage::Any`].
pub fn requested_coverage(charset: Charset, active_codepage: u16) -> (Charset, Coverage) {
    if charset == Charset::DEFAULT {
        return match Charset::from_codepage(active_codepage).and_then(|cs| cs.mask().map(|m| (cs, m))) {
            Some((resolved, mask)) => (resolved, Coverage::Mask(mask)),
            None => {
                tracing::debug!("Codepage {} has no charset, matching any coverage", active_codepage);
                (charset, Coverage::Any)
            }
        };
    }

    match charset.mask() {
        Some(mask) => (charset, Coverage::Mask(mask)),
        None => {
            tracing::warn!("Untranslated charset {}, matching any coverage", charset);
            (charset, Coverage::Any)
        }
    }
}
