//! Font file discovery
//!
//! Fonts come from three places: files registered under the `Fonts` store
//! key, the configured font directories, and (with the `system-fonts`
//! feature) the host's installed fonts as found by fontdb. Faces from the
//! last two are flagged external.

use std::path::{Path, PathBuf};

use crate::catalog::{AddContext, AddFlags, Catalog, FontResource};
use crate::config::EngineConfig;
use crate::persist::registered_files;
use crate::store::ConfigStore;
use crate::Result;

/// Extensions treated as font files
pub const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc", "otc"];

pub fn is_font_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| FONT_EXTENSIONS.contains(&ext.as_str()))
}

/// Font files below `dir`, recursively, in sorted order
pub fn scan_directory(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    scan_into(dir, &mut found);
    found.sort();
    found
}

fn scan_into(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read font directory {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_into(&path, found);
        } else if is_font_file(&path) {
            found.push(path);
        }
    }
}

/// Font files installed on the host
#[cfg(feature = "system-fonts")]
pub fn system_font_paths() -> Vec<PathBuf> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    let mut paths: Vec<PathBuf> = Vec::new();
    for face in db.faces() {
        let path = match &face.source {
            fontdb::Source::File(path) => path,
            fontdb::Source::SharedFile(path, _) => path,
            fontdb::Source::Binary(_) => continue,
        };
        if !paths.contains(path) {
            paths.push(path.clone());
        }
    }
    tracing::debug!("Found {} system font files", paths.len());
    paths
}

/// Font files installed on the host
#[cfg(not(feature = "system-fonts"))]
pub fn system_font_paths() -> Vec<PathBuf> {
    Vec::new()
}

/// Add every discoverable font to the catalog. Returns the number of faces added.
pub fn populate_catalog(
    catalog: &mut Catalog,
    ctx: &mut AddContext<'_>,
    store: &dyn ConfigStore,
    config: &EngineConfig,
) -> Result<usize> {
    let mut added = 0;

    for path in registered_files(store, &config.font_dirs)? {
        added += catalog.add_face(ctx, &FontResource::File(path), None, AddFlags::NONE);
    }

    for dir in &config.font_dirs {
        for path in scan_directory(dir) {
            added += catalog.add_face(ctx, &FontResource::File(path), None, AddFlags::EXTERNAL);
        }
    }

    if config.scan_system_fonts {
        for path in system_font_paths() {
            added += catalog.add_face(ctx, &FontResource::File(path), None, AddFlags::EXTERNAL);
        }
    }

    tracing::info!(
        "Font scan complete: {} faces in {} families",
        catalog.face_count(),
        catalog.family_count()
    );
    Ok(added)
}
