//! System links (fallback chains)
//!
//! A system link names the faces to consult, in order, when a font lacks a
//! glyph. Chains come from the `FontLink/SystemLink` store key and from the
//! built-in locale tables. Children are [`FaceId`]s looked up in the catalog
//! on use; a child whose face has since been removed is skipped.

use crate::catalog::{Catalog, FaceId};
use crate::charset::CharsetMask;
use crate::config::EngineConfig;
use crate::names::names_equal;
use crate::store::ConfigStore;
use crate::subst::SubstTable;
use crate::Result;

/// Store key holding configured system links
pub const SYSTEM_LINK_KEY: &str = "FontLink/SystemLink";

/// One fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLink {
    pub font_name: String,
    pub children: Vec<FaceId>,
    /// Union of the children's coverage
    pub coverage: CharsetMask,
}

impl SystemLink {
    fn new(font_name: &str) -> Self {
        Self {
            font_name: font_name.to_string(),
            children: Vec::new(),
            coverage: CharsetMask::EMPTY,
        }
    }

    fn push(&mut self, catalog: &Catalog, id: FaceId) {
        if self.children.contains(&id) {
            return;
        }
        if let Some(face) = catalog.face(id) {
            self.coverage |= face.coverage;
            self.children.push(id);
        }
    }
}

/// All system links, in build order
#[derive(Debug, Default, Clone)]
pub struct SystemLinks {
    links: Vec<SystemLink>,
}

impl SystemLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every chain and fold the linked coverage into the catalog
    pub fn build(
        catalog: &mut Catalog,
        subst: &SubstTable,
        store: &dyn ConfigStore,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut links = Self::new();
        links.load_configured(catalog, store)?;
        links.add_locale_defaults(catalog, subst, config);
        links.add_system_font(catalog, config);

        for link in &links.links {
            catalog.merge_linked_coverage(&link.font_name, link.coverage);
        }
        tracing::debug!("Built {} system links", links.links.len());
        Ok(links)
    }

    fn load_configured(&mut self, catalog: &Catalog, store: &dyn ConfigStore) -> Result<()> {
        for (name, value) in store.enumerate_values(SYSTEM_LINK_KEY)? {
            let Some(entries) = value.as_strings() else {
                tracing::warn!("Ignoring system link {} with non-string value", name);
                continue;
            };

            let link = self.entry(&name);
            for entry in entries {
                let (file, face_name) = match entry.split_once(',') {
                    Some((file, face)) => (file.trim(), Some(face.trim())),
                    None => (entry.trim(), None),
                };
                match catalog.find_face_by_filename(file, face_name) {
                    Some(face) => link.push(catalog, face.id),
                    None => tracing::trace!("System link {}: could not find {}", name, entry),
                }
            }
        }
        Ok(())
    }

    fn add_locale_defaults(&mut self, catalog: &Catalog, subst: &SubstTable, config: &EngineConfig) {
        let shell_dlg = subst
            .resolve(&config.shell_dlg_name, None)
            .map(|e| e.to.name.clone())
            .unwrap_or_else(|| config.default_ui_font.clone());

        for locale in &config.locale_fallbacks {
            let aliased = subst
                .resolve(&locale.shell_dlg, None)
                .is_some_and(|e| names_equal(&e.to.name, &shell_dlg));
            if !names_equal(&locale.shell_dlg, &shell_dlg) && !aliased {
                continue;
            }

            for bridge in &config.bridge_fonts {
                self.populate(catalog, subst, bridge, &locale.substitutes);
            }
            if locale.substitutes.first().is_some_and(|first| names_equal(first, &shell_dlg)) {
                self.populate(catalog, subst, &shell_dlg, &locale.substitutes);
            }
        }
    }

    /// Append the first face of each named family to the chain for `name`
    fn populate(&mut self, catalog: &Catalog, subst: &SubstTable, name: &str, values: &[String]) {
        if subst.resolve(name, None).is_some() {
            tracing::trace!("{}: skipping built-in link for substituted font", name);
            return;
        }

        let link = self.entry(name);
        for value in values {
            if names_equal(name, value) {
                continue;
            }
            let value = subst.resolve(value, None).map_or(value.as_str(), |e| e.to.name.as_str());
            let Some(family) = catalog.find_family(value) else {
                continue;
            };
            let Some(file) = catalog.faces_of(family).find_map(|f| f.source.file_name()) else {
                continue;
            };
            if let Some(face) = catalog.find_face_by_filename(file, Some(value)) {
                link.push(catalog, face.id);
            }
        }
    }

    /// The system font links to the default UI font plus that font's own chain
    fn add_system_font(&mut self, catalog: &Catalog, config: &EngineConfig) {
        let ui_chain: Vec<FaceId> = self
            .chain_for(&config.default_ui_font)
            .map(|l| l.children.clone())
            .unwrap_or_default();

        let link = self.entry(&config.system_font_name);
        if let Some(face) = catalog.find_face_by_filename(&config.default_ui_font_file, Some(&config.default_ui_font)) {
            link.push(catalog, face.id);
        }
        for id in ui_chain {
            link.push(catalog, id);
        }
    }

    fn entry(&mut self, name: &str) -> &mut SystemLink {
        let pos = match self.links.iter().position(|l| names_equal(&l.font_name, name)) {
            Some(pos) => pos,
            None => {
                self.links.push(SystemLink::new(name));
                self.links.len() - 1
            }
        };
        &mut self.links[pos]
    }

    /// Chain for a font name
    pub fn chain_for(&self, name: &str) -> Option<&SystemLink> {
        self.links.iter().find(|l| names_equal(&l.font_name, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SystemLink> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
