//! Font catalog
//!
//! Families in discovery order, each holding its faces in presentation
//! order (regular, bold, italic, bold italic). Faces live in an arena and
//! are referred to by [`FaceId`]; system links and instances hold ids, never
//! owning references.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::charset::CharsetMask;
use crate::mapping::FontBytes;
use crate::names::{fold_name, is_hidden_name, names_equal, vertical_name};
use crate::raster::{BitmapStrike, FaceProperties, Rasterizer};
use crate::subst::{SubstEntry, SubstName, SubstTable};

/// Unique face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub u32);

/// Style classification of a face.
///
/// Combine with the `|` operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StyleFlags(u8);

impl StyleFlags {
    pub const REGULAR: Self = Self(0);
    pub const BOLD: Self = Self(1 << 0);
    pub const ITALIC: Self = Self(1 << 1);

    #[inline]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b11)
    }

    pub fn from_bold_italic(bold: bool, italic: bool) -> Self {
        let mut flags = Self::REGULAR;
        if bold {
            flags = flags | Self::BOLD;
        }
        if italic {
            flags = flags | Self::ITALIC;
        }
        flags
    }

    /// Presentation rank: regular < bold < italic < bold italic
    pub const fn rank(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for StyleFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Flags controlling how faces are added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddFlags(u32);

impl AddFlags {
    pub const NONE: Self = Self(0);
    /// Never reported by enumeration
    pub const HIDDEN: Self = Self(1 << 0);
    /// Discovered in a system location rather than supplied by a caller
    pub const EXTERNAL: Self = Self(1 << 1);
    /// Caller-supplied replacement for a face that may already exist
    pub const REPLACEMENT: Self = Self(1 << 2);

    #[inline]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & 0b111)
    }
}

impl std::ops::BitOr for AddFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

/// Font data a caller hands to the catalog
#[derive(Debug, Clone)]
pub enum FontResource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

/// Where a face's bytes come from
#[derive(Clone)]
pub enum FaceSource {
    File { path: PathBuf, index: u32 },
    Memory { data: Arc<[u8]>, index: u32 },
}

impl FaceSource {
    pub fn index(&self) -> u32 {
        match self {
            FaceSource::File { index, .. } | FaceSource::Memory { index, .. } => *index,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            FaceSource::File { path, .. } => Some(path),
            FaceSource::Memory { .. } => None,
        }
    }

    /// File name component of a file source
    pub fn file_name(&self) -> Option<&str> {
        self.path().and_then(|p| p.file_name()).and_then(|n| n.to_str())
    }
}

impl PartialEq for FaceSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FaceSource::File { path: a, index: i }, FaceSource::File { path: b, index: j }) => a == b && i == j,
            (FaceSource::Memory { data: a, index: i }, FaceSource::Memory { data: b, index: j }) => {
                Arc::ptr_eq(a, b) && i == j
            }
            _ => false,
        }
    }
}

impl fmt::Debug for FaceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceSource::File { path, index } => write!(f, "File({}, {})", path.display(), index),
            FaceSource::Memory { data, index } => write!(f, "Memory({} bytes, {})", data.len(), index),
        }
    }
}

/// One concrete, openable face
#[derive(Debug, Clone)]
pub struct Face {
    pub id: FaceId,
    /// Name of the owning family
    pub family: String,
    pub style_name: String,
    pub full_name: Option<String>,
    pub source: FaceSource,
    pub scalable: bool,
    /// Strike this entry stands for (non-scalable faces only)
    pub bitmap: Option<BitmapStrike>,
    pub style: StyleFlags,
    pub weight: u16,
    pub coverage: CharsetMask,
    /// Coverage reachable through this face's fallback chain, always a
    /// superset of `coverage`
    pub linked_coverage: CharsetMask,
    pub version: u32,
    pub flags: AddFlags,
    pub vertical: bool,
    pub fixed_pitch: bool,
}

impl Face {
    pub fn is_external(&self) -> bool {
        self.flags.has(AddFlags::EXTERNAL)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.has(AddFlags::HIDDEN)
    }

    pub fn is_bold(&self) -> bool {
        self.style.has(StyleFlags::BOLD)
    }

    pub fn is_italic(&self) -> bool {
        self.style.has(StyleFlags::ITALIC)
    }

    /// Whether two faces occupy the same slot in a family
    fn same_slot(&self, other: &Face) -> bool {
        if !names_equal(&self.style_name, &other.style_name) {
            return false;
        }
        if other.scalable {
            return true;
        }
        self.bitmap.map(|b| b.y_ppem) == other.bitmap.map(|b| b.y_ppem) && self.coverage == other.coverage
    }
}

/// A named group of faces
#[derive(Debug, Clone)]
pub struct Family {
    pub name: String,
    /// English name when it differs from `name`
    pub english_name: Option<String>,
    faces: Vec<FaceId>,
}

impl Family {
    pub fn face_ids(&self) -> &[FaceId] {
        &self.faces
    }

    /// Whether `name` is this family's name or English alias
    pub fn matches(&self, name: &str) -> bool {
        names_equal(&self.name, name) || self.english_name.as_deref().is_some_and(|e| names_equal(e, name))
    }
}

/// Everything the catalog needs to add faces
pub struct AddContext<'a> {
    pub rasterizer: &'a dyn Rasterizer,
    /// Language used to pick localized family names
    pub language: u16,
    /// Receives English-to-localized name aliases
    pub subst: &'a mut SubstTable,
}

/// Font catalog
#[derive(Debug, Default)]
pub struct Catalog {
    faces: Vec<Option<Face>>,
    families: Vec<Family>,
    by_name: HashMap<String, usize>,
    by_english_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every face found in `resource`, returning how many were added.
    ///
    /// With a family hint, only faces of that family are added. Faces that
    /// fail to open or carry hidden names are skipped.
    pub fn add_face(
        &mut self,
        ctx: &mut AddContext<'_>,
        resource: &FontResource,
        family_hint: Option<&str>,
        flags: AddFlags,
    ) -> usize {
        let (bytes, describe) = match resource {
            FontResource::File(path) => match FontBytes::map_file(path) {
                Ok(bytes) => (bytes, path.display().to_string()),
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", path.display(), e);
                    return 0;
                }
            },
            FontResource::Memory(data) => (FontBytes::Owned(data.clone()), format!("<memory {} bytes>", data.len())),
        };

        let count = match ctx.rasterizer.face_count(&bytes) {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", describe, e);
                return 0;
            }
        };

        let mut added = 0;
        for index in 0..count {
            let props = match ctx.rasterizer.open_face(bytes.clone(), index) {
                Ok(face) => face.properties().clone(),
                Err(e) => {
                    tracing::debug!("Skipping face {} of {}: {}", index, describe, e);
                    continue;
                }
            };

            let source = match resource {
                FontResource::File(path) => FaceSource::File {
                    path: path.clone(),
                    index,
                },
                FontResource::Memory(data) => FaceSource::Memory {
                    data: data.clone(),
                    index,
                },
            };
            added += self.add_properties(ctx, &props, source, family_hint, flags, &describe);
        }
        added
    }

    fn add_properties(
        &mut self,
        ctx: &mut AddContext<'_>,
        props: &FaceProperties,
        source: FaceSource,
        family_hint: Option<&str>,
        flags: AddFlags,
        describe: &str,
    ) -> usize {
        let (Some(english), Some(localized)) = (props.english_family(), props.localized_family(ctx.language)) else {
            tracing::debug!("Skipping face {} of {}: no family name", source.index(), describe);
            return 0;
        };

        if is_hidden_name(english) || is_hidden_name(localized) || is_hidden_name(&props.style_name) {
            tracing::trace!("Skipping hidden face {} {}", english, props.style_name);
            return 0;
        }

        if let Some(hint) = family_hint {
            if !names_equal(hint, english) && !names_equal(hint, localized) {
                return 0;
            }
        }

        if !names_equal(english, localized) {
            let alias = SubstEntry::new(SubstName::new(english, None), SubstName::new(localized, None));
            ctx.subst.add(alias, false);
        }

        let strikes: Vec<Option<BitmapStrike>> = if props.scalable {
            vec![None]
        } else {
            props.strikes.iter().copied().map(Some).collect()
        };

        let mut added = 0;
        for strike in strikes {
            let face = Face {
                id: FaceId(0),
                family: localized.to_string(),
                style_name: props.style_name.clone(),
                full_name: props.full_name.clone(),
                source: source.clone(),
                scalable: props.scalable,
                bitmap: strike,
                style: StyleFlags::from_bold_italic(props.bold, props.italic),
                weight: props.weight,
                coverage: props.coverage,
                linked_coverage: props.coverage,
                version: props.revision,
                flags,
                vertical: false,
                fixed_pitch: props.fixed_pitch,
            };

            if props.has_vertical_metrics {
                let mut vertical = face.clone();
                vertical.family = vertical_name(localized);
                vertical.vertical = true;
                let alias = (!names_equal(english, localized)).then(|| vertical_name(english));
                if self.insert_face(vertical, alias).is_some() {
                    added += 1;
                }
            }

            let alias = (!names_equal(english, localized)).then(|| english.to_string());
            if self.insert_face(face, alias).is_some() {
                added += 1;
            }
        }

        if added > 0 {
            tracing::debug!("Added {} face(s) of {} {} from {}", added, localized, props.style_name, describe);
        }
        added
    }

    /// Insert a fully described face into its family, creating the family
    /// if needed. Returns the new id, or `None` if an existing face wins.
    pub fn insert_face(&mut self, mut face: Face, english_name: Option<String>) -> Option<FaceId> {
        let family_idx = match self.family_index(&face.family) {
            Some(idx) => idx,
            None => self.create_family(&face.family, english_name),
        };

        let existing = self.families[family_idx]
            .faces
            .iter()
            .copied()
            .find(|id| self.face(*id).is_some_and(|e| e.same_slot(&face)));

        if let Some(existing_id) = existing {
            let Some(existing) = self.face(existing_id) else {
                return None;
            };
            if face.flags.has(AddFlags::REPLACEMENT) && existing.coverage.contains(face.coverage) {
                tracing::debug!(
                    "Dropping replacement {} {}: original is more complete",
                    face.family,
                    face.style_name
                );
                return None;
            }
            if face.version <= existing.version {
                tracing::debug!(
                    "Skipping {} {}: already loaded version {:#x} (this one {:#x})",
                    face.family,
                    face.style_name,
                    existing.version,
                    face.version
                );
                return None;
            }
            tracing::debug!("Replacing {} {} with newer version {:#x}", face.family, face.style_name, face.version);
            self.families[family_idx].faces.retain(|id| *id != existing_id);
            self.faces[existing_id.0 as usize] = None;
        }

        let id = FaceId(self.faces.len() as u32);
        face.id = id;
        let rank = face.style.rank();

        let family = &mut self.families[family_idx];
        let pos = family
            .faces
            .iter()
            .position(|fid| {
                self.faces[fid.0 as usize]
                    .as_ref()
                    .is_some_and(|f| f.style.rank() > rank)
            })
            .unwrap_or(family.faces.len());
        family.faces.insert(pos, id);
        self.faces.push(Some(face));
        Some(id)
    }

    fn create_family(&mut self, name: &str, english_name: Option<String>) -> usize {
        let idx = self.families.len();
        let english_name = english_name.filter(|e| !names_equal(e, name));
        self.by_name.insert(fold_name(name), idx);
        if let Some(english) = &english_name {
            self.by_english_name.entry(fold_name(english)).or_insert(idx);
        }
        self.families.push(Family {
            name: name.to_string(),
            english_name,
            faces: Vec::new(),
        });
        idx
    }

    fn family_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(&fold_name(name)).copied()
    }

    /// Family with exactly this name
    pub fn find_family(&self, name: &str) -> Option<&Family> {
        self.family_index(name).map(|idx| &self.families[idx])
    }

    /// Family by name or English alias
    pub fn find_family_any_alias(&self, name: &str) -> Option<&Family> {
        self.find_family(name).or_else(|| {
            self.by_english_name
                .get(&fold_name(name))
                .map(|idx| &self.families[*idx])
        })
    }

    /// Face by file name, optionally restricted to a family name
    pub fn find_face_by_filename(&self, file_name: &str, face_name: Option<&str>) -> Option<&Face> {
        self.families.iter().find_map(|family| {
            if face_name.is_some_and(|name| !family.matches(name)) {
                return None;
            }
            self.faces_of(family)
                .find(|face| face.source.file_name().is_some_and(|f| names_equal(f, file_name)))
        })
    }

    /// Face whose full name matches
    pub fn find_face_by_full_name(&self, full_name: &str) -> Option<&Face> {
        self.all_faces()
            .find(|face| face.full_name.as_deref().is_some_and(|n| names_equal(n, full_name)))
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn families(&self) -> impl Iterator<Item = &Family> {
        self.families.iter()
    }

    /// Faces of a family, in presentation order
    pub fn faces_of<'a>(&'a self, family: &'a Family) -> impl Iterator<Item = &'a Face> + 'a {
        family.faces.iter().filter_map(|id| self.face(*id))
    }

    /// Every live face, family by family
    pub fn all_faces(&self) -> impl Iterator<Item = &Face> {
        self.families.iter().flat_map(|family| self.faces_of(family))
    }

    /// OR `mask` into the linked coverage of every face in `family`
    pub fn merge_linked_coverage(&mut self, family: &str, mask: CharsetMask) {
        let Some(idx) = self.family_index(family) else {
            return;
        };
        for id in self.families[idx].faces.clone() {
            if let Some(Some(face)) = self.faces.get_mut(id.0 as usize) {
                face.linked_coverage |= mask;
            }
        }
    }

    /// Remove every face matching `pred`, dropping families left empty
    pub fn remove_faces(&mut self, mut pred: impl FnMut(&Face) -> bool) -> Vec<Face> {
        let mut removed = Vec::new();
        for slot in &mut self.faces {
            if slot.as_ref().is_some_and(&mut pred) {
                if let Some(face) = slot.take() {
                    removed.push(face);
                }
            }
        }
        if removed.is_empty() {
            return removed;
        }

        let faces = &self.faces;
        for family in &mut self.families {
            family.faces.retain(|id| faces[id.0 as usize].is_some());
        }
        self.families.retain(|family| !family.faces.is_empty());
        self.reindex();
        removed
    }

    fn reindex(&mut self) {
        self.by_name.clear();
        self.by_english_name.clear();
        for (idx, family) in self.families.iter().enumerate() {
            self.by_name.insert(fold_name(&family.name), idx);
            if let Some(english) = &family.english_name {
                self.by_english_name.entry(fold_name(english)).or_insert(idx);
            }
        }
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.iter().filter(|f| f.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}
