//! Catalog persistence
//!
//! After a full scan the catalog is written into the configuration store so
//! the next start can skip scanning. The cache is only trusted when it was
//! built from the same font directories.
//!
//! Layout:
//!
//! ```text
//! FontCache
//!   Directories        multi-string of scanned directories
//!   Families/<family>  Name, English
//!     <style[ (h)]>    StyleName, File, Index, Flags, Version, Coverage, Weight,
//!                      FullName, External, Vertical, FixedPitch, Scalable, Bitmap
//!   External           name -> file of faces mirrored into `Fonts`
//! ```

use std::path::{Path, PathBuf};

use crate::catalog::{AddFlags, Catalog, Face, FaceId, FaceSource, StyleFlags};
use crate::charset::CharsetMask;
use crate::names::names_equal;
use crate::raster::BitmapStrike;
use crate::store::{ConfigStore, StoreValue};
use crate::subst::{SubstEntry, SubstName, SubstTable};
use crate::Result;

/// Root of the persisted catalog
pub const FONT_CACHE_KEY: &str = "FontCache";
pub const FAMILIES_KEY: &str = "FontCache/Families";
/// Faces mirrored into `Fonts` by the previous run
pub const EXTERNAL_KEY: &str = "FontCache/External";
/// Installed fonts: display name -> file
pub const FONTS_KEY: &str = "Fonts";

const DIRECTORIES_VALUE: &str = "Directories";
const BITMAP_RECORD_LEN: usize = 14;

fn key_component(name: &str) -> String {
    name.replace('/', "%2F")
}

fn face_key(face: &Face) -> String {
    let style = key_component(&face.style_name);
    match face.bitmap {
        Some(strike) if !face.scalable => format!("{style} ({})", strike.height),
        _ => style,
    }
}

fn dword(flag: bool) -> StoreValue {
    StoreValue::Dword(flag as u32)
}

fn encode_strike(strike: &BitmapStrike) -> Vec<u8> {
    let mut out = Vec::with_capacity(BITMAP_RECORD_LEN);
    for v in [strike.height, strike.width, strike.size] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&strike.x_ppem.to_le_bytes());
    out.extend_from_slice(&strike.y_ppem.to_le_bytes());
    out.extend_from_slice(&strike.internal_leading.to_le_bytes());
    out.extend_from_slice(&strike.ascent.to_le_bytes());
    out
}

fn decode_strike(data: &[u8]) -> Option<BitmapStrike> {
    if data.len() != BITMAP_RECORD_LEN {
        return None;
    }
    let field = |i: usize| [data[i * 2], data[i * 2 + 1]];
    Some(BitmapStrike {
        height: i16::from_le_bytes(field(0)),
        width: i16::from_le_bytes(field(1)),
        size: i16::from_le_bytes(field(2)),
        x_ppem: u16::from_le_bytes(field(3)),
        y_ppem: u16::from_le_bytes(field(4)),
        internal_leading: i16::from_le_bytes(field(5)),
        ascent: i16::from_le_bytes(field(6)),
    })
}

fn directory_list(font_dirs: &[PathBuf]) -> Vec<String> {
    font_dirs.iter().map(|d| d.display().to_string()).collect()
}

/// Write the catalog. Memory-backed faces are not persisted.
pub fn save_catalog(catalog: &Catalog, store: &mut dyn ConfigStore, font_dirs: &[PathBuf]) -> Result<usize> {
    store.delete_key(FAMILIES_KEY)?;
    store.write_value(FONT_CACHE_KEY, DIRECTORIES_VALUE, StoreValue::MultiString(directory_list(font_dirs)))?;

    let mut saved = 0;
    for family in catalog.families() {
        let family_key = format!("{FAMILIES_KEY}/{}", key_component(&family.name));
        let mut wrote_family = false;

        for face in catalog.faces_of(family) {
            let FaceSource::File { path, index } = &face.source else {
                continue;
            };
            if !wrote_family {
                store.write_value(&family_key, "Name", StoreValue::String(family.name.clone()))?;
                if let Some(english) = &family.english_name {
                    store.write_value(&family_key, "English", StoreValue::String(english.clone()))?;
                }
                wrote_family = true;
            }

            let key = format!("{family_key}/{}", face_key(face));
            store.write_value(&key, "StyleName", StoreValue::String(face.style_name.clone()))?;
            store.write_value(&key, "File", StoreValue::String(path.display().to_string()))?;
            store.write_value(&key, "Index", StoreValue::Dword(*index))?;
            store.write_value(&key, "Flags", StoreValue::Dword(face.style.bits() as u32))?;
            store.write_value(&key, "Version", StoreValue::Dword(face.version))?;
            store.write_value(&key, "Coverage", StoreValue::Dword(face.coverage.0))?;
            store.write_value(&key, "Weight", StoreValue::Dword(face.weight as u32))?;
            if let Some(full_name) = &face.full_name {
                store.write_value(&key, "FullName", StoreValue::String(full_name.clone()))?;
            }
            store.write_value(&key, "External", dword(face.is_external()))?;
            store.write_value(&key, "Vertical", dword(face.vertical))?;
            store.write_value(&key, "FixedPitch", dword(face.fixed_pitch))?;
            store.write_value(&key, "Scalable", dword(face.scalable))?;
            if let Some(strike) = &face.bitmap {
                store.write_value(&key, "Bitmap", StoreValue::Binary(encode_strike(strike)))?;
            }
            saved += 1;
        }
    }

    tracing::debug!("Persisted {} faces", saved);
    Ok(saved)
}

/// Whether the store holds a catalog built from `font_dirs`
pub fn is_cache_valid(store: &dyn ConfigStore, font_dirs: &[PathBuf]) -> Result<bool> {
    let Some(value) = store.read_value(FONT_CACHE_KEY, DIRECTORIES_VALUE)? else {
        return Ok(false);
    };
    let expected = directory_list(font_dirs);
    Ok(value.as_strings().is_some_and(|dirs| dirs == expected))
}

fn read_string(store: &dyn ConfigStore, key: &str, name: &str) -> Result<Option<String>> {
    Ok(store.read_value(key, name)?.and_then(|v| v.as_str().map(str::to_string)))
}

fn read_dword(store: &dyn ConfigStore, key: &str, name: &str) -> Result<u32> {
    Ok(store.read_value(key, name)?.and_then(|v| v.as_dword()).unwrap_or(0))
}

fn load_face(store: &dyn ConfigStore, key: &str, family: &str) -> Result<Option<Face>> {
    let Some(file) = read_string(store, key, "File")? else {
        tracing::warn!("Persisted face {} has no file", key);
        return Ok(None);
    };
    let path = PathBuf::from(file);
    if !path.exists() {
        tracing::debug!("Persisted face {} points at missing {}", key, path.display());
        return Ok(None);
    }

    let scalable = read_dword(store, key, "Scalable")? != 0;
    let bitmap = store
        .read_value(key, "Bitmap")?
        .and_then(|v| v.as_binary().and_then(decode_strike));
    if !scalable && bitmap.is_none() {
        tracing::warn!("Persisted bitmap face {} has no strike record", key);
        return Ok(None);
    }

    let style_name = match read_string(store, key, "StyleName")? {
        Some(name) => name,
        None => key.rsplit('/').next().unwrap_or_default().to_string(),
    };
    let external = read_dword(store, key, "External")? != 0;
    let coverage = CharsetMask(read_dword(store, key, "Coverage")?);

    Ok(Some(Face {
        id: FaceId(0),
        family: family.to_string(),
        style_name,
        full_name: read_string(store, key, "FullName")?,
        source: FaceSource::File {
            path,
            index: read_dword(store, key, "Index")?,
        },
        scalable,
        bitmap,
        style: StyleFlags::from_bits(read_dword(store, key, "Flags")? as u8),
        weight: read_dword(store, key, "Weight")? as u16,
        coverage,
        linked_coverage: coverage,
        version: read_dword(store, key, "Version")?,
        flags: if external { AddFlags::EXTERNAL } else { AddFlags::NONE },
        vertical: read_dword(store, key, "Vertical")? != 0,
        fixed_pitch: read_dword(store, key, "FixedPitch")? != 0,
    }))
}

/// Load a persisted catalog built from `font_dirs`, or `None` when there is
/// no usable cache. English aliases are registered as substitutions.
pub fn load_catalog(store: &dyn ConfigStore, font_dirs: &[PathBuf], subst: &mut SubstTable) -> Result<Option<Catalog>> {
    if !is_cache_valid(store, font_dirs)? {
        tracing::debug!("No valid persisted catalog");
        return Ok(None);
    }

    let mut catalog = Catalog::new();
    for family_component in store.enumerate_subkeys(FAMILIES_KEY)? {
        let family_key = format!("{FAMILIES_KEY}/{family_component}");
        let name = read_string(store, &family_key, "Name")?.unwrap_or_else(|| family_component.clone());
        let english = read_string(store, &family_key, "English")?;

        if let Some(english) = &english {
            if !names_equal(english, &name) {
                subst.add(
                    SubstEntry::new(SubstName::new(english.clone(), None), SubstName::new(name.clone(), None)),
                    false,
                );
            }
        }

        for face_component in store.enumerate_subkeys(&family_key)? {
            let key = format!("{family_key}/{face_component}");
            if let Some(face) = load_face(store, &key, &name)? {
                catalog.insert_face(face, english.clone());
            }
        }
    }

    if catalog.is_empty() {
        return Ok(None);
    }
    tracing::info!(
        "Loaded persisted catalog: {} families, {} faces",
        catalog.family_count(),
        catalog.face_count()
    );
    Ok(Some(catalog))
}

/// Name a face is registered under in `Fonts`
pub fn registration_name(face: &Face) -> String {
    if names_equal(&face.style_name, "Regular") {
        format!("{} (TrueType)", face.family)
    } else {
        format!("{} {} (TrueType)", face.family, face.style_name)
    }
}

/// Mirror externally discovered faces into `Fonts` and remember them so the
/// next start can retract them
pub fn record_external(catalog: &Catalog, store: &mut dyn ConfigStore) -> Result<usize> {
    let mut recorded = 0;
    for face in catalog.all_faces().filter(|f| f.is_external() && !f.vertical) {
        let Some(path) = face.source.path() else {
            continue;
        };
        let name = registration_name(face);
        let file = StoreValue::String(path.display().to_string());
        store.write_value(FONTS_KEY, &name, file.clone())?;
        store.write_value(EXTERNAL_KEY, &name, file)?;
        recorded += 1;
    }
    Ok(recorded)
}

/// Remove the previous run's external entries from `Fonts`
pub fn retract_external(store: &mut dyn ConfigStore) -> Result<usize> {
    let mut retracted = 0;
    for (name, _) in store.enumerate_values(EXTERNAL_KEY)? {
        if store.delete_value(FONTS_KEY, &name)? {
            retracted += 1;
        }
    }
    store.delete_key(EXTERNAL_KEY)?;
    if retracted > 0 {
        tracing::debug!("Retracted {} external font entries", retracted);
    }
    Ok(retracted)
}

/// Files listed under `Fonts`, relative names resolved against `base_dirs`
pub fn registered_files(store: &dyn ConfigStore, base_dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for (name, value) in store.enumerate_values(FONTS_KEY)? {
        let Some(file) = value.as_str() else {
            tracing::debug!("Ignoring non-string font entry {}", name);
            continue;
        };
        let path = Path::new(file);
        let resolved = if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            base_dirs.iter().map(|d| d.join(path)).find(|p| p.exists())
        };
        match resolved {
            Some(path) if !files.contains(&path) => files.push(path),
            Some(_) => {}
            None => tracing::debug!("Font entry {} -> {} not found", name, file),
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::face;
    use crate::store::MemoryStore;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fos-font-persist-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn file_face(dir: &Path, family: &str, style: &str, flags: StyleFlags) -> Face {
        let path = dir.join(format!("{}-{}.ttf", family.to_lowercase(), style.to_lowercase()));
        fs::write(&path, b"font").unwrap();
        let mut f = face(family, style, flags, 1);
        f.source = FaceSource::File { path, index: 0 };
        f
    }

    #[test]
    fn test_save_and_load() {
        let dir = temp_dir("roundtrip");
        let mut catalog = Catalog::new();
        catalog.insert_face(file_face(&dir, "Sans", "Regular", StyleFlags::REGULAR), None);
        let mut bold = file_face(&dir, "Sans", "Bold", StyleFlags::BOLD);
        bold.flags = AddFlags::EXTERNAL;
        catalog.insert_face(bold, None);
        let mut bitmap = file_face(&dir, "Fixed", "Regular", StyleFlags::REGULAR);
        bitmap.scalable = false;
        bitmap.bitmap = Some(BitmapStrike {
            height: 13,
            x_ppem: 10,
            y_ppem: 10,
            internal_leading: 3,
            ascent: 11,
            ..Default::default()
        });
        catalog.insert_face(bitmap, Some("Fixed Sys".into()));

        let dirs = vec![dir.clone()];
        let mut store = MemoryStore::new();
        assert_eq!(save_catalog(&catalog, &mut store, &dirs).unwrap(), 3);

        let mut subst = SubstTable::new();
        let loaded = load_catalog(&store, &dirs, &mut subst).unwrap().unwrap();
        assert_eq!(loaded.face_count(), 3);

        let sans = loaded.find_family("Sans").unwrap();
        let styles: Vec<_> = loaded.faces_of(sans).map(|f| (f.style_name.clone(), f.is_external())).collect();
        assert_eq!(styles, vec![("Regular".to_string(), false), ("Bold".to_string(), true)]);

        let fixed = loaded.find_family_any_alias("Fixed Sys").unwrap();
        let strike = loaded.faces_of(fixed).next().unwrap().bitmap.unwrap();
        assert_eq!((strike.height, strike.y_ppem, strike.ascent), (13, 10, 11));
        assert_eq!(subst.resolve("Fixed Sys", None).unwrap().to.name, "Fixed");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cache_invalid_for_other_directories() {
        let dir = temp_dir("dirs");
        let mut catalog = Catalog::new();
        catalog.insert_face(file_face(&dir, "Sans", "Regular", StyleFlags::REGULAR), None);

        let mut store = MemoryStore::new();
        save_catalog(&catalog, &mut store, &[dir.clone()]).unwrap();

        assert!(is_cache_valid(&store, &[dir.clone()]).unwrap());
        assert!(!is_cache_valid(&store, &[PathBuf::from("/elsewhere")]).unwrap());
        assert!(load_catalog(&store, &[], &mut SubstTable::new()).unwrap().is_none());
        assert!(!is_cache_valid(&MemoryStore::new(), &[]).unwrap());

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_external_record_and_retract() {
        let mut catalog = Catalog::new();
        let mut ext = face("Sans", "Bold", StyleFlags::BOLD, 1);
        ext.flags = AddFlags::EXTERNAL;
        catalog.insert_face(ext, None);
        catalog.insert_face(face("Serif", "Regular", StyleFlags::REGULAR, 1), None);

        let mut store = MemoryStore::new();
        store
            .write_value(FONTS_KEY, "Courier (TrueType)", StoreValue::String("cour.ttf".into()))
            .unwrap();
        assert_eq!(record_external(&catalog, &mut store).unwrap(), 1);
        assert!(store.read_value(FONTS_KEY, "Sans Bold (TrueType)").unwrap().is_some());

        assert_eq!(retract_external(&mut store).unwrap(), 1);
        assert!(store.read_value(FONTS_KEY, "Sans Bold (TrueType)").unwrap().is_none());
        assert!(store.read_value(FONTS_KEY, "Courier (TrueType)").unwrap().is_some());
        assert!(store.enumerate_values(EXTERNAL_KEY).unwrap().is_empty());
    }

    #[test]
    fn test_registration_name() {
        assert_eq!(registration_name(&face("Sans", "Regular", StyleFlags::REGULAR, 1)), "Sans (TrueType)");
        assert_eq!(registration_name(&face("Sans", "Italic", StyleFlags::ITALIC, 1)), "Sans Italic (TrueType)");
    }

    #[test]
    fn test_registered_files_resolve_relative() {
        let dir = temp_dir("registered");
        fs::write(dir.join("serif.ttf"), b"font").unwrap();
        let mut store = MemoryStore::new();
        store
            .write_value(FONTS_KEY, "Serif (TrueType)", StoreValue::String("serif.ttf".into()))
            .unwrap();
        store
            .write_value(FONTS_KEY, "Gone (TrueType)", StoreValue::String("gone.ttf".into()))
            .unwrap();

        let files = registered_files(&store, &[dir.clone()]).unwrap();
        assert_eq!(files, vec![dir.join("serif.ttf")]);
        fs::remove_dir_all(&dir).ok();
    }
}
