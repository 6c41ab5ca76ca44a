//! Face name normalization
//!
//! Face names are compared case-insensitively. A leading `@` selects the
//! vertical-writing variant of a family and a leading `.` marks a face that
//! must never be exposed.

use crate::charset::Charset;

/// Prefix marking a vertical-writing family
pub const VERTICAL_PREFIX: char = '@';

/// Prefix marking a hidden face or family
pub const HIDDEN_PREFIX: char = '.';

/// Longest face name kept from a request (in characters)
pub const MAX_FACE_NAME: usize = 31;

/// Family name that forces the symbol charset
pub const SYMBOL_FAMILY: &str = "Symbol";

/// Case-insensitive face name comparison
pub fn names_equal(a: &str, b: &str) -> bool {
    if a.len() == b.len() && a.eq_ignore_ascii_case(b) {
        return true;
    }
    if a.is_ascii() && b.is_ascii() {
        return false;
    }
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Key used to index names in hash maps
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Split the vertical prefix off a name
pub fn strip_vertical(name: &str) -> (&str, bool) {
    match name.strip_prefix(VERTICAL_PREFIX) {
        Some(rest) => (rest, true),
        None => (name, false),
    }
}

/// Vertical variant of a family name
pub fn vertical_name(name: &str) -> String {
    format!("{VERTICAL_PREFIX}{name}")
}

/// Whether a name marks a face that must be skipped
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with(HIDDEN_PREFIX)
}

/// Trim and truncate a requested face name
pub fn normalize_face_name(name: &str) -> String {
    name.trim().chars().take(MAX_FACE_NAME).collect()
}

/// Apply the symbol-font special case to a request.
///
/// A request for the literal `Symbol` family always uses the symbol charset,
/// whatever the caller asked for.
pub fn effective_charset(face_name: &str, charset: Charset) -> Charset {
    if names_equal(face_name, SYMBOL_FAMILY) {
        Charset::SYMBOL
    } else {
        charset
    }
}
