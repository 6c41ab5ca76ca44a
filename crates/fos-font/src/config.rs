//! Engine configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{FontError, Result};

/// Built-in fallback chain used when a given UI font backs the shell dialog alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleFallback {
    /// Font the shell dialog alias resolves to in this locale
    pub shell_dlg: String,
    /// Fallback faces, in lookup order
    pub substitutes: Vec<String>,
}

impl LocaleFallback {
    fn new(shell_dlg: &str, substitutes: &[&str]) -> Self {
        Self {
            shell_dlg: shell_dlg.to_string(),
            substitutes: substitutes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Default locale tables: non East-Asian, Japanese, Simplified Chinese,
/// Korean and Traditional Chinese
pub fn default_locale_fallbacks() -> Vec<LocaleFallback> {
    vec![
        LocaleFallback::new("Tahoma", &["MS UI Gothic", "SimSun", "Gulim", "PMingLiU"]),
        LocaleFallback::new("MS UI Gothic", &["MS UI Gothic", "PMingLiU", "SimSun", "Gulim"]),
        LocaleFallback::new("SimSun", &["SimSun", "PMingLiU", "MS UI Gothic", "Batang"]),
        LocaleFallback::new("Gulim", &["Gulim", "PMingLiU", "MS UI Gothic", "SimSun"]),
        LocaleFallback::new("PMingLiU", &["PMingLiU", "SimSun", "MS UI Gothic", "Batang"]),
    ]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories scanned for font files
    pub font_dirs: Vec<PathBuf>,
    /// Also load fonts installed on the host system
    pub scan_system_fonts: bool,
    /// Number of released instances kept open
    pub warm_pool_size: usize,
    /// Active ANSI codepage, used to resolve the default charset
    pub ansi_codepage: u16,
    /// User locale language id, used to pick localized family names
    pub language: u16,
    pub default_sans: Vec<String>,
    pub default_serif: Vec<String>,
    pub default_fixed: Vec<String>,
    /// Font whose fallback chain is appended to every instance
    pub default_fallback_link: String,
    /// Force the default fallback link on or off; unset means on for
    /// East-Asian codepages only
    pub use_default_fallback: Option<bool>,
    /// Fonts that always get the locale fallback chain
    pub bridge_fonts: Vec<String>,
    pub shell_dlg_name: String,
    pub system_font_name: String,
    /// UI font the system font links to, and its file name
    pub default_ui_font: String,
    pub default_ui_font_file: String,
    pub locale_fallbacks: Vec<LocaleFallback>,
    /// Accept configured substitutions that cross charsets
    pub allow_cross_charset_subst: bool,
    /// Device aspect ratio (x, y) used for VDMX lookups
    pub device_aspect: (u8, u8),
    /// Persist the catalog into the store after a scan and reuse it at start-up
    pub persist_catalog: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            font_dirs: Vec::new(),
            scan_system_fonts: false,
            warm_pool_size: 10,
            ansi_codepage: 1252,
            language: 0x0409,
            default_sans: strings(&["Arial", "Liberation Sans", "Bitstream Vera Sans", "DejaVu Sans"]),
            default_serif: strings(&["Times New Roman", "Liberation Serif", "Bitstream Vera Serif", "DejaVu Serif"]),
            default_fixed: strings(&["Courier New", "Liberation Mono", "Bitstream Vera Sans Mono", "DejaVu Sans Mono"]),
            default_fallback_link: "Microsoft Sans Serif".to_string(),
            use_default_fallback: None,
            bridge_fonts: strings(&["Lucida Sans Unicode", "Microsoft Sans Serif", "Tahoma"]),
            shell_dlg_name: "MS Shell Dlg".to_string(),
            system_font_name: "System".to_string(),
            default_ui_font: "Tahoma".to_string(),
            default_ui_font_file: "tahoma.ttf".to_string(),
            locale_fallbacks: default_locale_fallbacks(),
            allow_cross_charset_subst: false,
            device_aspect: (1, 1),
            persist_catalog: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| FontError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FontError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_aspect.0 == 0 || self.device_aspect.1 == 0 {
            return Err(FontError::Config("device aspect ratio must be non-zero".into()));
        }
        Ok(())
    }

    /// Whether instances also get the default fallback link's children
    pub fn default_fallback_enabled(&self) -> bool {
        self.use_default_fallback
            .unwrap_or(matches!(self.ansi_codepage, 932 | 936 | 949 | 950))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.warm_pool_size, 10);
        assert_eq!(config.ansi_codepage, 1252);
        assert!(!config.default_fallback_enabled());
        assert_eq!(config.locale_fallbacks.len(), 5);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{ "ansi_codepage": 932, "warm_pool_size": 4 }"#).unwrap();
        assert_eq!(config.warm_pool_size, 4);
        assert!(config.default_fallback_enabled());
        assert_eq!(config.shell_dlg_name, "MS Shell Dlg");
    }

    #[test]
    fn test_fallback_override() {
        let config = EngineConfig {
            use_default_fallback: Some(true),
            ..Default::default()
        };
        assert!(config.default_fallback_enabled());
    }

    #[test]
    fn test_invalid_config() {
        assert!(EngineConfig::from_json("[1, 2]").is_err());
        assert!(EngineConfig::from_json(r#"{ "device_aspect": [0, 1] }"#).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig::default();
        let restored = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
