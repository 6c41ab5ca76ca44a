//! Font engine
//!
//! [`FontEngine`] owns the catalog, the substitution and system-link
//! tables, the mapping pool and the instance cache. Every public operation
//! takes the single engine lock for its whole duration, except
//! [`FontEngine::enumerate_faces`], which snapshots under the lock and runs
//! the caller's callback after releasing it.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheStats, InstanceCache};
use crate::catalog::{AddContext, AddFlags, Catalog, Face, FaceId, StyleFlags};
use crate::charset::{Charset, CharsetMask};
use crate::config::EngineConfig;
use crate::descriptor::{FontDescriptor, Matrix};
use crate::discovery::populate_catalog;
use crate::instance::{FontHandle, FontInstance, InstanceEnv, InstanceId};
use crate::mapping::{MappingPool, MappingStats};
use crate::metrics::GlyphMetrics;
use crate::names::names_equal;
use crate::persist;
use crate::raster::{Rasterizer, TtfRasterizer};
use crate::select::{select_face, SelectContext};
use crate::store::ConfigStore;
use crate::subst::SubstTable;
use crate::system_link::SystemLinks;
use crate::tables::kern::KerningPair;
use crate::tables::Tag;
use crate::Result;

pub use crate::catalog::FontResource;
pub use crate::instance::{InstanceMetrics, LinkedGlyph, UnicodeCoverage, UnicodeRange};

/// What enumeration reports for one face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceSummary {
    pub id: FaceId,
    pub family: String,
    pub english_family: Option<String>,
    pub style_name: String,
    pub full_name: Option<String>,
    pub style: StyleFlags,
    pub weight: u16,
    pub coverage: CharsetMask,
    pub scalable: bool,
    /// Cell height of a bitmap face
    pub bitmap_height: Option<i16>,
    pub vertical: bool,
    pub fixed_pitch: bool,
    pub external: bool,
}

impl FaceSummary {
    fn new(face: &Face, english_family: Option<&str>) -> Self {
        Self {
            id: face.id,
            family: face.family.clone(),
            english_family: english_family.map(str::to_string),
            style_name: face.style_name.clone(),
            full_name: face.full_name.clone(),
            style: face.style,
            weight: face.weight,
            coverage: face.coverage,
            scalable: face.scalable,
            bitmap_height: face.bitmap.map(|b| b.height),
            vertical: face.vertical,
            fixed_pitch: face.fixed_pitch,
            external: face.is_external(),
        }
    }
}

/// Engine statistics
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub families: usize,
    pub faces: usize,
    pub substitutions: usize,
    pub system_links: usize,
    pub mapped_files: usize,
    pub cache: CacheStats,
    pub mapping: MappingStats,
}

struct EngineState {
    catalog: Catalog,
    subst: SubstTable,
    links: SystemLinks,
    pool: MappingPool,
    cache: InstanceCache,
    store: Box<dyn ConfigStore>,
}

impl EngineState {
    fn select_ctx<'a>(&'a self, config: &'a EngineConfig) -> SelectContext<'a> {
        SelectContext {
            catalog: &self.catalog,
            subst: &self.subst,
            links: &self.links,
            config,
        }
    }
}

/// Font resolution and instance caching engine
pub struct FontEngine {
    state: Mutex<EngineState>,
    rasterizer: Arc<dyn Rasterizer>,
    config: EngineConfig,
}

impl FontEngine {
    /// Create an engine backed by the ttf-parser rasterizer
    pub fn new(config: EngineConfig, store: Box<dyn ConfigStore>) -> Result<Self> {
        Self::with_rasterizer(config, store, Arc::new(TtfRasterizer::new()))
    }

    /// Create an engine with a custom rasterization backend.
    ///
    /// Loads substitutions, then the persisted catalog when it is still
    /// valid for the configured font directories. Otherwise fonts are
    /// rescanned and, with `persist_catalog`, the catalog is written back.
    /// System links are built last since they resolve against the catalog.
    pub fn with_rasterizer(
        config: EngineConfig,
        mut store: Box<dyn ConfigStore>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Result<Self> {
        config.validate()?;

        let mut subst = SubstTable::new();
        subst.load_from_store(store.as_ref(), config.allow_cross_charset_subst)?;

        let retracted = persist::retract_external(store.as_mut())?;
        if retracted > 0 {
            tracing::debug!("Retracted {} external font registrations", retracted);
        }

        let cached = if config.persist_catalog {
            persist::load_catalog(store.as_ref(), &config.font_dirs, &mut subst)?
        } else {
            None
        };

        let mut catalog = match cached {
            Some(catalog) => {
                tracing::info!("Loaded font catalog cache: {} faces", catalog.face_count());
                catalog
            }
            None => {
                let mut catalog = Catalog::new();
                let mut ctx = AddContext {
                    rasterizer: rasterizer.as_ref(),
                    language: config.language,
                    subst: &mut subst,
                };
                populate_catalog(&mut catalog, &mut ctx, store.as_ref(), &config)?;
                if config.persist_catalog {
                    persist::save_catalog(&catalog, store.as_mut(), &config.font_dirs)?;
                }
                catalog
            }
        };
        persist::record_external(&catalog, store.as_mut())?;

        let links = SystemLinks::build(&mut catalog, &subst, store.as_ref(), &config)?;

        tracing::info!(
            "Font engine ready: {} families, {} faces, {} substitutions, {} system links",
            catalog.family_count(),
            catalog.face_count(),
            subst.len(),
            links.len()
        );

        Ok(Self {
            state: Mutex::new(EngineState {
                catalog,
                subst,
                links,
                pool: MappingPool::new(),
                cache: InstanceCache::new(config.warm_pool_size),
                store,
            }),
            rasterizer,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve `desc` to an instance and attach `handle` to it.
    ///
    /// A cached instance matching the request is reused; otherwise a face is
    /// selected and opened. Returns `None` when no face qualifies or the
    /// chosen face cannot be opened.
    pub fn select_and_open(&self, desc: &FontDescriptor, handle: FontHandle) -> Option<InstanceId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(id) = state.cache.lookup(desc, handle) {
            return Some(id);
        }

        let Some(selection) = select_face(state.select_ctx(&self.config), desc) else {
            tracing::debug!("No face for {:?} (height {})", desc.logfont.face_name, desc.logfont.height);
            return None;
        };
        let face = state.catalog.face(selection.face)?;

        let mut instance = match FontInstance::open(
            &mut state.pool,
            self.rasterizer.as_ref(),
            &self.config,
            face,
            desc.clone(),
            &selection,
        ) {
            Ok(instance) => instance,
            Err(e) => {
                tracing::warn!("Cannot open {} {}: {}", face.family, face.style_name, e);
                return None;
            }
        };

        if let Some(link) = state.links.chain_for(&face.family) {
            for child in &link.children {
                instance.add_child(*child);
            }
        }

        let fallback = &self.config.default_fallback_link;
        if self.config.default_fallback_enabled()
            && selection.charset != Charset::SYMBOL
            && selection.charset != Charset::OEM
            && !names_equal(&face.family, fallback)
        {
            if let Some(link) = state.links.chain_for(fallback) {
                for child in &link.children {
                    instance.add_child(*child);
                }
            }
        }

        tracing::debug!(
            "Opened {} {} as {:?} for {:?}",
            face.family,
            face.style_name,
            instance.id(),
            desc.logfont.face_name
        );
        Some(state.cache.insert(instance, handle))
    }

    /// Detach `handle` from an instance. Returns false if it was not attached.
    pub fn release(&self, id: InstanceId, handle: FontHandle) -> bool {
        let mut guard = self.state.lock();
        let EngineState { cache, pool, .. } = &mut *guard;
        cache.release(id, handle, pool)
    }

    /// Add the faces of a file or memory buffer. Returns the number of faces added.
    pub fn register_font_resource(&self, resource: &FontResource, flags: AddFlags) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut ctx = AddContext {
            rasterizer: self.rasterizer.as_ref(),
            language: self.config.language,
            subst: &mut state.subst,
        };
        let added = state.catalog.add_face(&mut ctx, resource, None, flags);

        if added > 0 {
            for link in state.links.iter() {
                state.catalog.merge_linked_coverage(&link.font_name, link.coverage);
            }
        }
        tracing::debug!("Registered {:?}: {} faces", resource, added);
        added
    }

    /// Remove the faces that came from `path` and were added with the same
    /// visibility. Warm instances of those faces are closed; active ones stay
    /// usable until released.
    pub fn unregister_font_resource(&self, path: &Path, flags: AddFlags) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let hidden = flags.has(AddFlags::HIDDEN);
        let removed = state
            .catalog
            .remove_faces(|face| face.source.path() == Some(path) && face.is_hidden() == hidden);
        if removed.is_empty() {
            tracing::debug!("Unregister {}: no matching faces", path.display());
            return false;
        }

        let ids: Vec<FaceId> = removed.iter().map(|f| f.id).collect();
        let evicted = state.cache.evict_faces(&ids, &mut state.pool);
        tracing::debug!(
            "Unregistered {}: {} faces, {} warm instances closed",
            path.display(),
            ids.len(),
            evicted
        );
        true
    }

    /// Report visible faces, optionally limited to one family, to `callback`.
    ///
    /// A family name is resolved through the substitution table when no
    /// family of that name exists. The callback returns false to stop.
    /// Returns the number of faces delivered.
    pub fn enumerate_faces(&self, family: Option<&str>, mut callback: impl FnMut(&FaceSummary) -> bool) -> usize {
        let snapshot = {
            let state = self.state.lock();
            let catalog = &state.catalog;
            let families: Vec<_> = match family {
                None => catalog.families().collect(),
                Some(name) => catalog
                    .find_family_any_alias(name)
                    .or_else(|| {
                        state
                            .subst
                            .resolve(name, None)
                            .and_then(|entry| catalog.find_family_any_alias(&entry.to.name))
                    })
                    .into_iter()
                    .collect(),
            };

            families
                .into_iter()
                .flat_map(|fam| {
                    catalog
                        .faces_of(fam)
                        .filter(|face| !face.is_hidden())
                        .map(move |face| FaceSummary::new(face, fam.english_name.as_deref()))
                })
                .collect::<Vec<_>>()
        };

        let mut delivered = 0;
        for summary in &snapshot {
            delivered += 1;
            if !callback(summary) {
                break;
            }
        }
        delivered
    }

    /// Copy raw font bytes, from a table or the whole file when `tag` is
    /// `None`, starting at `offset`.
    ///
    /// Without a buffer the available length is returned. With one, the
    /// number of bytes copied is returned. `None` when the instance or table
    /// does not exist or `offset` is past the end.
    pub fn get_font_table_bytes(
        &self,
        id: InstanceId,
        tag: Option<Tag>,
        offset: usize,
        buffer: Option<&mut [u8]>,
    ) -> Option<usize> {
        let state = self.state.lock();
        state.cache.get(id)?.table_bytes(tag, offset, buffer)
    }

    /// Copy kerning pairs into `out`. An empty `out` returns the total count.
    pub fn get_kerning_pairs(&self, id: InstanceId, out: &mut [KerningPair]) -> usize {
        let mut state = self.state.lock();
        let Some(instance) = state.cache.get_mut(id) else {
            return 0;
        };
        let pairs = instance.kerning_pairs();
        if out.is_empty() {
            return pairs.len();
        }
        let n = pairs.len().min(out.len());
        out[..n].copy_from_slice(&pairs[..n]);
        n
    }

    pub fn get_unicode_coverage(&self, id: InstanceId) -> Option<UnicodeCoverage> {
        let state = self.state.lock();
        state.cache.get(id).map(FontInstance::unicode_coverage)
    }

    /// Glyph for `ch`, searching the instance and then its linked faces
    pub fn glyph_for_char(&self, id: InstanceId, ch: u32) -> Option<LinkedGlyph> {
        let mut guard = self.state.lock();
        let EngineState { catalog, pool, cache, .. } = &mut *guard;
        let instance = cache.get_mut(id)?;
        let mut env = InstanceEnv {
            catalog,
            pool,
            rasterizer: self.rasterizer.as_ref(),
            config: &self.config,
        };
        instance.glyph_for_char(&mut env, ch)
    }

    /// Metrics of a glyph of the instance's own face, with an extra
    /// transform applied on top of the instance's
    pub fn glyph_metrics(&self, id: InstanceId, glyph: u32, extra: &Matrix) -> Option<GlyphMetrics> {
        let mut state = self.state.lock();
        state.cache.get_mut(id)?.glyph_metrics(glyph, extra)
    }

    pub fn instance_metrics(&self, id: InstanceId) -> Option<InstanceMetrics> {
        let state = self.state.lock();
        state.cache.get(id).map(FontInstance::metrics)
    }

    /// Face an instance was opened from
    pub fn instance_face(&self, id: InstanceId) -> Option<FaceSummary> {
        let state = self.state.lock();
        let face = state.catalog.face(state.cache.get(id)?.face())?;
        let english = state.catalog.find_family(&face.family).and_then(|f| f.english_name.as_deref());
        Some(FaceSummary::new(face, english))
    }

    /// Name an instance reports as its face name
    pub fn text_face(&self, id: InstanceId) -> Option<String> {
        let state = self.state.lock();
        state.cache.get(id).map(|i| i.display_name().to_string())
    }

    /// Write the current catalog to the store
    pub fn save_catalog(&self) -> Result<usize> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let saved = persist::save_catalog(&state.catalog, state.store.as_mut(), &self.config.font_dirs)?;
        persist::record_external(&state.catalog, state.store.as_mut())?;
        Ok(saved)
    }

    /// Run `f` against the configuration store
    pub fn with_store<R>(&self, f: impl FnOnce(&dyn ConfigStore) -> R) -> R {
        let state = self.state.lock();
        f(state.store.as_ref())
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.lock();
        EngineStats {
            families: state.catalog.family_count(),
            faces: state.catalog.face_count(),
            substitutions: state.subst.len(),
            system_links: state.links.len(),
            mapped_files: state.pool.len(),
            cache: state.cache.stats(),
            mapping: *state.pool.stats(),
        }
    }
}

impl Drop for FontEngine {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.cache.close_all(&mut state.pool);
    }
}

impl std::fmt::Debug for FontEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LogFont;
    use crate::raster::testing::StubRasterizer;
    use crate::store::MemoryStore;

    fn config() -> EngineConfig {
        EngineConfig {
            scan_system_fonts: false,
            persist_catalog: false,
            ..Default::default()
        }
    }

    fn engine() -> FontEngine {
        let engine = FontEngine::with_rasterizer(
            config(),
            Box::new(MemoryStore::new()),
            Arc::new(StubRasterizer::scalable()),
        )
        .unwrap();
        let data: Arc<[u8]> = Arc::from(vec![0u8; 16]);
        assert_eq!(engine.register_font_resource(&FontResource::Memory(data), AddFlags::NONE), 1);
        engine
    }

    fn desc(name: &str, height: i32) -> FontDescriptor {
        FontDescriptor::new(LogFont::new(name, height))
    }

    #[test]
    fn test_empty_engine_selects_nothing() {
        let engine = FontEngine::with_rasterizer(
            config(),
            Box::new(MemoryStore::new()),
            Arc::new(StubRasterizer::scalable()),
        )
        .unwrap();
        assert_eq!(engine.select_and_open(&desc("Anything", -12), FontHandle(1)), None);
        assert_eq!(engine.stats().faces, 0);
    }

    #[test]
    fn test_select_reuses_instance() {
        let engine = engine();
        let family = engine.enumerate_snapshot()[0].family.clone();

        let a = engine.select_and_open(&desc(&family, -12), FontHandle(1)).unwrap();
        let b = engine.select_and_open(&desc(&family, -12), FontHandle(2)).unwrap();
        let c = engine.select_and_open(&desc(&family, -13), FontHandle(3)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let stats = engine.stats();
        assert_eq!(stats.cache.active, 2);
        assert_eq!((stats.cache.hits, stats.cache.misses), (1, 2));
    }

    #[test]
    fn test_release_moves_to_warm() {
        let engine = engine();
        let family = engine.enumerate_snapshot()[0].family.clone();
        let id = engine.select_and_open(&desc(&family, -12), FontHandle(1)).unwrap();

        assert!(engine.release(id, FontHandle(1)));
        assert!(!engine.release(id, FontHandle(1)));
        let stats = engine.stats();
        assert_eq!((stats.cache.active, stats.cache.warm), (0, 1));

        // Still queryable while warm
        assert!(engine.instance_metrics(id).is_some());
        assert_eq!(engine.select_and_open(&desc(&family, -12), FontHandle(2)), Some(id));
    }

    #[test]
    fn test_glyph_and_metrics() {
        let engine = engine();
        let family = engine.enumerate_snapshot()[0].family.clone();
        let id = engine.select_and_open(&desc(&family, -16), FontHandle(1)).unwrap();

        let glyph = engine.glyph_for_char(id, 'A' as u32).unwrap();
        assert_eq!(glyph.glyph, 1);
        assert_eq!(glyph.link_level, 0);
        assert!(engine.glyph_for_char(id, '€' as u32).is_none());

        let m = engine.glyph_metrics(id, glyph.glyph, &Matrix::IDENTITY).unwrap();
        assert_eq!(m.advance, 10);
        assert_eq!(engine.instance_metrics(id).unwrap().ppem, 16);
        assert_eq!(engine.text_face(id).as_deref(), Some(family.as_str()));
    }

    #[test]
    fn test_unknown_instance() {
        let engine = engine();
        let id = InstanceId(u64::MAX);
        assert_eq!(engine.get_kerning_pairs(id, &mut []), 0);
        assert!(engine.get_unicode_coverage(id).is_none());
        assert!(engine.get_font_table_bytes(id, None, 0, None).is_none());
        assert!(!engine.release(id, FontHandle(1)));
    }

    #[test]
    fn test_enumerate_stops_when_asked() {
        let engine = engine();
        let mut seen = 0;
        let delivered = engine.enumerate_faces(None, |_| {
            seen += 1;
            false
        });
        assert_eq!((seen, delivered), (1, 1));
    }

    impl FontEngine {
        fn enumerate_snapshot(&self) -> Vec<FaceSummary> {
            let mut all = Vec::new();
            self.enumerate_faces(None, |s| {
                all.push(s.clone());
                true
            });
            all
        }
    }
}
