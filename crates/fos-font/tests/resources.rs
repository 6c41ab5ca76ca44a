//! Font resource tests for fos-font
//!
//! Registration at runtime, enumeration, and the catalog persisted in the
//! configuration store.

mod common;

use std::path::PathBuf;

use common::*;
use fos_font::*;

fn desc(name: &str, height: i32) -> FontDescriptor {
    FontDescriptor::new(LogFont::new(name, height))
}

fn families(engine: &FontEngine) -> Vec<String> {
    let mut names = Vec::new();
    engine.enumerate_faces(None, |face| {
        if !names.contains(&face.family) {
            names.push(face.family.clone());
        }
        true
    });
    names
}

// ============================================================================
// REGISTRATION TESTS
// ============================================================================

#[test]
fn test_register_and_unregister_file() {
    let dir = FontDir::new("register");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let engine = engine(&dir);

    let extra_dir = FontDir::new("register-extra");
    let path = extra_dir.add_face("deco.ttf", FakeFace::scalable("Deco Display", "Regular"));

    assert_eq!(engine.register_font_resource(&FontResource::File(path.clone()), AddFlags::NONE), 1);
    let id = engine.select_and_open(&desc("Deco Display", -12), FontHandle(1)).unwrap();
    assert_eq!(engine.text_face(id).as_deref(), Some("Deco Display"));
    assert!(engine.release(id, FontHandle(1)));

    // Visibility must match the registration
    assert!(!engine.unregister_font_resource(&path, AddFlags::HIDDEN));
    assert!(engine.unregister_font_resource(&path, AddFlags::NONE));
    assert!(!engine.unregister_font_resource(&path, AddFlags::NONE));

    // The warm instance went with the face
    assert!(engine.instance_metrics(id).is_none());
    let id = engine.select_and_open(&desc("Deco Display", -12), FontHandle(1)).unwrap();
    assert_eq!(engine.text_face(id).as_deref(), Some("Latin Sans"));
}

#[test]
fn test_active_instance_survives_unregister() {
    let dir = FontDir::new("unregister-active");
    let path = dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let engine = engine(&dir);

    let id = engine.select_and_open(&desc("Latin Sans", -12), FontHandle(1)).unwrap();
    assert!(engine.unregister_font_resource(&path, AddFlags::NONE));
    assert_eq!(engine.stats().faces, 0);

    assert!(engine.instance_metrics(id).is_some());
    assert_eq!(engine.glyph_for_char(id, 'A' as u32).map(|g| g.glyph), Some(1));
    assert!(engine.release(id, FontHandle(1)));
}

#[test]
fn test_register_memory_font() {
    let dir = FontDir::new("memory");
    let engine = engine(&dir);
    assert_eq!(engine.stats().faces, 0);

    let font = FakeFont::single(FakeFace::scalable("Embedded Sans", "Regular"));
    let data: std::sync::Arc<[u8]> = font.to_bytes().into();
    assert_eq!(engine.register_font_resource(&FontResource::Memory(data.clone()), AddFlags::NONE), 1);

    let id = engine.select_and_open(&desc("Embedded Sans", -12), FontHandle(1)).unwrap();
    assert_eq!(engine.get_font_table_bytes(id, None, 0, None), Some(data.len()));
    // Memory fonts are never mapped from disk
    assert_eq!(engine.stats().mapped_files, 0);
}

#[test]
fn test_register_rejects_garbage() {
    let dir = FontDir::new("garbage");
    let engine = engine(&dir);
    let path = dir.path.join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();

    assert_eq!(engine.register_font_resource(&FontResource::File(path), AddFlags::NONE), 0);
    assert_eq!(
        engine.register_font_resource(&FontResource::File(PathBuf::from("/nonexistent/font.ttf")), AddFlags::NONE),
        0
    );
}

#[test]
fn test_older_version_does_not_replace() {
    let dir = FontDir::new("versions");
    let mut newer = FakeFace::scalable("Latin Sans", "Regular");
    newer.version = 0x0002_0000;
    dir.add_face("latin2.ttf", newer);
    let engine = engine(&dir);

    let other = FontDir::new("versions-old");
    let old = other.add_face("latin1.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    assert_eq!(engine.register_font_resource(&FontResource::File(old), AddFlags::NONE), 0);

    let mut newest = FakeFace::scalable("Latin Sans", "Regular");
    newest.version = 0x0003_0000;
    let newest = other.add_face("latin3.ttf", newest);
    assert_eq!(engine.register_font_resource(&FontResource::File(newest), AddFlags::NONE), 1);
    assert_eq!(engine.stats().faces, 1);
}

// ============================================================================
// ENUMERATION TESTS
// ============================================================================

#[test]
fn test_enumerate_all_and_by_family() {
    let dir = FontDir::new("enumerate");
    dir.add_face("latinbi.ttf", FakeFace::scalable("Latin Sans", "Bold Italic"));
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    dir.add_face("latinb.ttf", FakeFace::scalable("Latin Sans", "Bold"));
    dir.add_face("serif.ttf", FakeFace::scalable("Book Serif", "Regular"));
    let engine = engine(&dir);

    let mut all = 0;
    let delivered = engine.enumerate_faces(None, |_| {
        all += 1;
        true
    });
    assert_eq!((all, delivered), (4, 4));

    let mut styles = Vec::new();
    engine.enumerate_faces(Some("latin sans"), |face| {
        styles.push(face.style_name.clone());
        true
    });
    assert_eq!(styles, ["Regular", "Bold", "Bold Italic"]);

    assert_eq!(engine.enumerate_faces(Some("Missing"), |_| true), 0);
}

#[test]
fn test_enumerate_skips_hidden() {
    let dir = FontDir::new("hidden");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let engine = engine(&dir);

    let other = FontDir::new("hidden-private");
    let path = other.add_face("private.ttf", FakeFace::scalable("Private Sans", "Regular"));
    assert_eq!(engine.register_font_resource(&FontResource::File(path.clone()), AddFlags::HIDDEN), 1);

    assert_eq!(families(&engine), ["Latin Sans"]);
    // Hidden faces are still selectable
    let id = engine.select_and_open(&desc("Private Sans", -12), FontHandle(1)).unwrap();
    assert_eq!(engine.text_face(id).as_deref(), Some("Private Sans"));

    assert!(engine.unregister_font_resource(&path, AddFlags::HIDDEN));
}

#[test]
fn test_enumerate_through_substitute_and_alias() {
    let dir = FontDir::new("alias");
    dir.add_face(
        "gothic.ttf",
        FakeFace::scalable("MS Gothic", "Regular").with_localized(0x0411, "ＭＳ ゴシック"),
    );
    let mut store = MemoryStore::new();
    store
        .write_value("FontSubstitutes", "Gothic UI", StoreValue::String("MS Gothic".into()))
        .unwrap();
    let mut config = dir.config();
    config.language = 0x0411;
    let engine = engine_with(config, store);

    let mut found = Vec::new();
    engine.enumerate_faces(Some("MS Gothic"), |face| {
        found.push((face.family.clone(), face.english_family.clone()));
        true
    });
    assert_eq!(found, [("ＭＳ ゴシック".to_string(), Some("MS Gothic".to_string()))]);
    assert_eq!(engine.enumerate_faces(Some("Gothic UI"), |_| true), 1);

    // Selecting by the English name reaches the localized family
    let id = engine.select_and_open(&desc("MS Gothic", -12), FontHandle(1)).unwrap();
    assert_eq!(engine.instance_face(id).unwrap().family, "ＭＳ ゴシック");
}

#[test]
fn test_enumerate_callback_may_reenter() {
    let dir = FontDir::new("reenter");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let engine = engine(&dir);

    let mut opened = Vec::new();
    engine.enumerate_faces(None, |face| {
        opened.push(engine.select_and_open(&desc(&face.family, -12), FontHandle(1)));
        true
    });
    assert_eq!(opened.len(), 1);
    assert!(opened[0].is_some());
}

// ============================================================================
// PERSISTENCE TESTS
// ============================================================================

#[test]
fn test_catalog_persisted_and_reloaded() {
    let dir = FontDir::new("persist");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    dir.add_face("fixed.ttf", FakeFace::bitmap("Terminal", &[10, 14]));
    let mut config = dir.config();
    config.persist_catalog = true;
    let store = SharedStore::default();

    let first = engine_with(config.clone(), store.clone());
    let before = first.stats();
    drop(first);
    assert!(store.read("FontCache", "Directories").is_some());

    // A cached catalog skips the scan, so a new file is not picked up
    dir.add_face("late.ttf", FakeFace::scalable("Late Sans", "Regular"));
    let second = engine_with(config.clone(), store.clone());
    let after = second.stats();
    assert_eq!((after.families, after.faces), (before.families, before.faces));
    assert!(!families(&second).contains(&"Late Sans".to_string()));

    let id = second.select_and_open(&desc("Terminal", 12), FontHandle(1)).unwrap();
    assert_eq!(second.instance_face(id).unwrap().bitmap_height, Some(14));
    drop(second);

    // Different directories invalidate the cache
    let extra = FontDir::new("persist-extra");
    config.font_dirs.push(extra.path.clone());
    let third = engine_with(config, store);
    assert!(families(&third).contains(&"Late Sans".to_string()));
}

#[test]
fn test_missing_file_dropped_from_cached_catalog() {
    let dir = FontDir::new("persist-missing");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let gone = dir.add_face("serif.ttf", FakeFace::scalable("Book Serif", "Regular"));
    let mut config = dir.config();
    config.persist_catalog = true;
    let store = SharedStore::default();

    drop(engine_with(config.clone(), store.clone()));
    std::fs::remove_file(gone).unwrap();

    let engine = engine_with(config, store);
    assert_eq!(families(&engine), ["Latin Sans"]);
}

#[test]
fn test_external_fonts_mirrored_into_fonts_key() {
    let dir = FontDir::new("external");
    let path = dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    dir.add_face("latinb.ttf", FakeFace::scalable("Latin Sans", "Bold"));
    let store = SharedStore::default();

    let engine = engine_with(dir.config(), store.clone());
    assert_eq!(
        store.read("Fonts", "Latin Sans (TrueType)"),
        Some(StoreValue::String(path.display().to_string()))
    );
    assert!(store.read("Fonts", "Latin Sans Bold (TrueType)").is_some());
    assert_eq!(store.values("FontCache/External").len(), 2);
    drop(engine);

    // Retracted and re-recorded on the next start, without duplicates
    let engine = engine_with(dir.config(), store.clone());
    assert_eq!(store.values("Fonts").len(), 2);
    assert_eq!(engine.stats().faces, 2);
    let mut external = Vec::new();
    engine.enumerate_faces(None, |face| {
        external.push(face.external);
        true
    });
    assert_eq!(external, [true, true]);
}

#[test]
fn test_registered_fonts_loaded_from_store() {
    let dir = FontDir::new("registered");
    let other = FontDir::new("registered-elsewhere");
    let path = other.add_face("deco.ttf", FakeFace::scalable("Deco Display", "Regular"));
    let mut store = MemoryStore::new();
    store
        .write_value("Fonts", "Deco Display (TrueType)", StoreValue::String(path.display().to_string()))
        .unwrap();
    let engine = engine_with(dir.config(), store);

    let mut summaries = Vec::new();
    engine.enumerate_faces(Some("Deco Display"), |face| {
        summaries.push(face.clone());
        true
    });
    assert_eq!(summaries.len(), 1);
    assert!(!summaries[0].external);
}

#[test]
fn test_config_from_json() {
    let dir = FontDir::new("json");
    dir.add_face("latin.ttf", FakeFace::scalable("Latin Sans", "Regular"));
    let json = format!(
        r#"{{ "font_dirs": [{:?}], "warm_pool_size": 1, "persist_catalog": false }}"#,
        dir.path.display().to_string()
    );
    let config = EngineConfig::from_json(&json).unwrap();
    assert_eq!(config.warm_pool_size, 1);

    let engine = engine_with(config, MemoryStore::new());
    assert_eq!(engine.stats().cache.warm_bound, 1);
    assert!(EngineConfig::from_json(r#"{ "device_aspect": [0, 1] }"#).is_err());
}
