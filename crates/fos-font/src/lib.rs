//! fOS Font - Font Resolution and Instance Caching
//!
//! This crate resolves abstract font requests to installed faces and keeps
//! opened font instances around for reuse:
//! - Font catalog (families, faces, aliases) built from font directories,
//!   the configuration store, or a persisted catalog cache
//! - Substitution and system-link (fallback chain) tables
//! - Fuzzy face selection with deterministic tie-breaks
//! - Reference-counted pool of memory-mapped font files
//! - Instance cache with an LRU pool of warm, unreferenced instances
//! - Per-instance glyph metrics, kerning pairs and vertical substitution
//!
//! Everything is driven through [`FontEngine`], which serializes access to
//! the shared state behind a single lock.

pub mod charset;
pub mod names;
pub mod tables;
pub mod raster;
pub mod mapping;
pub mod catalog;
pub mod subst;
pub mod system_link;
pub mod descriptor;
pub mod select;
pub mod size;
pub mod metrics;
pub mod instance;
pub mod cache;
pub mod store;
pub mod persist;
pub mod config;
pub mod discovery;
pub mod engine;

pub use charset::{Charset, CharsetMask};
pub use catalog::{AddFlags, Catalog, Face, FaceId, FaceSource, Family, StyleFlags};
pub use config::EngineConfig;
pub use descriptor::{FontDescriptor, LogFont, Matrix, PitchFamily};
pub use engine::{
    EngineStats, FaceSummary, FontEngine, FontResource, InstanceMetrics, LinkedGlyph,
    UnicodeCoverage, UnicodeRange,
};
pub use instance::{FontHandle, InstanceId};
pub use mapping::{FontBytes, MappingPool};
pub use metrics::GlyphMetrics;
pub use raster::{FaceProperties, RasterFace, Rasterizer, TtfRasterizer};
pub use store::{ConfigStore, MemoryStore, StoreValue};
pub use tables::kern::KerningPair;
pub use tables::Tag;

use std::path::PathBuf;

/// Font engine error types
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed font data: {0}")]
    Malformed(String),

    #[error("Missing required table: {0}")]
    MissingTable(&'static str),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Face index {index} out of range (file has {count} faces)")]
    FaceIndexOutOfRange { index: u32, count: u32 },

    #[error("Invalid pixel size {width}x{height}")]
    InvalidPixelSize { width: u32, height: u32 },

    #[error("Configuration store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<tables::ParseError> for FontError {
    fn from(err: tables::ParseError) -> Self {
        FontError::Malformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FontError>;
