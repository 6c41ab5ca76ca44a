//! Face selection
//!
//! Turns a [`FontDescriptor`] into one catalog face. Families are tried in
//! tiers, first match wins:
//!
//! 1. The requested name (after substitution), its full face name, or the
//!    fallback chain registered under that name
//! 2. The default family for the requested pitch and family class
//! 3. Any family with a face in the requested direction and charset,
//!    preferring scalable faces
//!
//! Inside the chosen family the face closest in style wins, with
//! deterministic tie-breaks.

use crate::catalog::{Catalog, Face, FaceId, Family};
use crate::charset::{requested_coverage, Charset, Coverage};
use crate::config::EngineConfig;
use crate::descriptor::{FontDescriptor, PitchFamily};
use crate::names::{effective_charset, names_equal, normalize_face_name, vertical_name, VERTICAL_PREFIX};
use crate::subst::SubstTable;
use crate::system_link::SystemLinks;

/// Read-only view of the tables selection consults
#[derive(Clone, Copy)]
pub struct SelectContext<'a> {
    pub catalog: &'a Catalog,
    pub subst: &'a SubstTable,
    pub links: &'a SystemLinks,
    pub config: &'a EngineConfig,
}

/// Outcome of a successful selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub face: FaceId,
    /// Name reported for the instance: the requested alias when a
    /// substitution was applied, otherwise the family name
    pub display_name: String,
    /// Charset the request resolved to
    pub charset: Charset,
    pub fake_bold: bool,
    pub fake_italic: bool,
}

enum Found<'a> {
    Family(&'a Family),
    Face(&'a Face),
}

struct Request {
    coverage: Coverage,
    can_use_bitmap: bool,
}

impl Request {
    fn accepts(&self, face: &Face) -> bool {
        (face.scalable || self.can_use_bitmap) && self.coverage.accepts(face.coverage, face.linked_coverage)
    }
}

/// Pick the face for a request, or `None` if nothing in the catalog fits
pub fn select_face(ctx: SelectContext<'_>, desc: &FontDescriptor) -> Option<Selection> {
    let catalog = ctx.catalog;
    if catalog.is_empty() {
        tracing::debug!("Catalog is empty, no face for {:?}", desc.logfont.face_name);
        return None;
    }

    let lf = &desc.logfont;
    let face_name = normalize_face_name(&lf.face_name);
    let (mut charset, coverage) =
        requested_coverage(effective_charset(&face_name, lf.charset), ctx.config.ansi_codepage);
    let mut request = Request {
        coverage,
        can_use_bitmap: desc.can_use_bitmap,
    };
    let want_vertical = face_name.starts_with(VERTICAL_PREFIX);

    let mut display_name = None;
    let mut found = None;

    if !face_name.is_empty() {
        let mut target = face_name.as_str();
        if let Some(entry) = ctx.subst.resolve(&face_name, Some(charset)) {
            tracing::trace!("Substituting {} -> {}", entry.from, entry.to);
            target = &entry.to.name;
            if let Some(to_charset) = entry.to.charset {
                let (resolved, coverage) = requested_coverage(to_charset, ctx.config.ansi_codepage);
                charset = resolved;
                request.coverage = coverage;
            }
            display_name = Some(face_name.clone());
        }

        found = find_by_name(ctx, &request, target);
        if found.is_none() {
            display_name = None;
        }
    }

    if found.is_none() {
        found = find_default_family(ctx, &request, lf.pitch_family, want_vertical);
    }

    if found.is_none() {
        found = find_any_family(ctx, &request, want_vertical);
    }

    let face = match found {
        Some(Found::Face(face)) => face,
        Some(Found::Family(family)) => best_face_in_family(catalog, family, &request, desc)?,
        None => {
            tracing::warn!("No face matches {:?} (charset {})", lf.face_name, charset);
            return None;
        }
    };

    let bold = lf.is_bold();
    let selection = Selection {
        face: face.id,
        display_name: display_name.unwrap_or_else(|| face.family.clone()),
        charset,
        fake_bold: bold && !face.is_bold(),
        fake_italic: lf.italic && !face.is_italic(),
    };
    tracing::debug!(
        "Selected {} {} for {:?} (fake bold {}, fake italic {})",
        face.family,
        face.style_name,
        lf.face_name,
        selection.fake_bold,
        selection.fake_italic
    );
    Some(selection)
}

/// Name tier: family name, then full face name, then fallback chain
fn find_by_name<'a>(ctx: SelectContext<'a>, request: &Request, name: &str) -> Option<Found<'a>> {
    let catalog = ctx.catalog;

    if let Some(family) = catalog
        .families()
        .find(|family| family.matches(name) && catalog.faces_of(family).any(|f| request.accepts(f)))
    {
        return Some(Found::Family(family));
    }

    if let Some(face) = catalog
        .all_faces()
        .find(|face| face.full_name.as_deref().is_some_and(|n| names_equal(n, name)) && request.accepts(face))
    {
        return Some(Found::Face(face));
    }

    let link = ctx.links.chain_for(name)?;
    link.children
        .iter()
        .filter_map(|id| catalog.face(*id))
        .find(|face| request.accepts(face))
        .map(Found::Face)
}

fn find_default_family<'a>(
    ctx: SelectContext<'a>,
    request: &Request,
    pitch_family: PitchFamily,
    want_vertical: bool,
) -> Option<Found<'a>> {
    let config = ctx.config;
    let defaults = if pitch_family.is_fixed() || pitch_family.family() == PitchFamily::FF_MODERN {
        &config.default_fixed
    } else if pitch_family.family() == PitchFamily::FF_ROMAN {
        &config.default_serif
    } else {
        &config.default_sans
    };

    for name in defaults {
        let name = if want_vertical { vertical_name(name) } else { name.clone() };
        if let Some(family) = ctx
            .catalog
            .families()
            .find(|family| family.matches(&name) && ctx.catalog.faces_of(family).any(|f| request.accepts(f)))
        {
            return Some(Found::Family(family));
        }
    }
    None
}

fn find_any_family<'a>(ctx: SelectContext<'a>, request: &Request, want_vertical: bool) -> Option<Found<'a>> {
    let catalog = ctx.catalog;
    let mut last_resort = None;

    for family in catalog.families() {
        for face in catalog.faces_of(family) {
            if face.vertical != want_vertical || !request.coverage.accepts(face.coverage, face.linked_coverage) {
                continue;
            }
            if face.scalable {
                return Some(Found::Family(family));
            }
            if request.can_use_bitmap && last_resort.is_none() {
                last_resort = Some(family);
            }
        }
    }

    if last_resort.is_some() {
        tracing::debug!("Falling back to a bitmap-only family");
    }
    last_resort.map(Found::Family)
}

/// Pick the face of `family` closest to the requested style and size.
///
/// Score is one point per italic or bold mismatch. Among the lowest
/// scores a scalable face wins. Otherwise the bitmap whose height is at
/// or above the request with the least overshoot wins, then the tallest
/// one below it. Remaining ties go to the first face in family order.
fn best_face_in_family<'a>(
    catalog: &'a Catalog,
    family: &'a Family,
    request_filter: &Request,
    desc: &FontDescriptor,
) -> Option<&'a Face> {
    let lf = &desc.logfont;
    let (italic, bold) = (lf.italic, lf.is_bold());
    let score = |face: &Face| (face.is_italic() != italic) as u32 + (face.is_bold() != bold) as u32;

    let candidates: Vec<&Face> = catalog.faces_of(family).filter(|f| request_filter.accepts(f)).collect();
    let best_score = candidates.iter().map(|f| score(f)).min()?;
    let best: Vec<&Face> = candidates.into_iter().filter(|f| score(f) == best_score).collect();

    if let Some(face) = best.iter().find(|f| f.scalable) {
        return Some(face);
    }

    let target = lf.height.saturating_abs();
    let strike_height = |face: &Face| {
        let strike = face.bitmap.unwrap_or_default();
        if lf.height > 0 {
            strike.height as i32
        } else {
            strike.height as i32 - strike.internal_leading as i32
        }
    };

    let overshoot = best
        .iter()
        .filter(|f| strike_height(f) >= target)
        .min_by_key(|f| strike_height(f).saturating_sub(target));
    if let Some(face) = overshoot {
        return Some(face);
    }

    // Reverse so the first of several equally tall strikes wins
    best.iter().rev().max_by_key(|f| strike_height(f)).copied()
}
