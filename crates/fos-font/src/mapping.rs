//! Memory-Mapped Font Files
//!
//! Every distinct font file on disk is mapped once and shared by all the
//! instances drawn from it. Mappings are keyed by the file's device and
//! inode numbers, so two paths to the same file share one mapping. The map
//! is dropped when the last reference is released.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;

use crate::{FontError, Result};

/// Font bytes handed to the rasterizer
#[derive(Clone)]
pub enum FontBytes {
    /// Shared view of a mapped file
    Mapped(Arc<Mmap>),
    /// Caller-supplied buffer owned by the face
    Owned(Arc<[u8]>),
}

impl FontBytes {
    /// Map a file for a short-lived scan, outside of any pool
    pub fn map_file(path: &Path) -> Result<Self> {
        let (mmap, _) = map_path(path)?;
        Ok(FontBytes::Mapped(Arc::new(mmap)))
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, FontBytes::Mapped(_))
    }
}

impl Deref for FontBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FontBytes::Mapped(map) => map,
            FontBytes::Owned(data) => data,
        }
    }
}

impl AsRef<[u8]> for FontBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl fmt::Debug for FontBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontBytes::Mapped(map) => write!(f, "FontBytes::Mapped({} bytes)", map.len()),
            FontBytes::Owned(data) => write!(f, "FontBytes::Owned({} bytes)", data.len()),
        }
    }
}

/// Identity of a file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

#[cfg(unix)]
fn file_identity(file: &File, _path: &Path) -> std::io::Result<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    let meta = file.metadata()?;
    Ok(FileIdentity {
        device: meta.dev(),
        inode: meta.ino(),
    })
}

#[cfg(not(unix))]
fn file_identity(_file: &File, path: &Path) -> std::io::Result<FileIdentity> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = std::fs::canonicalize(path)?;
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    Ok(FileIdentity {
        device: 0,
        inode: hasher.finish(),
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FontError + '_ {
    move |source| FontError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn open_identified(path: &Path) -> Result<(File, FileIdentity)> {
    let file = File::open(path).map_err(io_error(path))?;
    let identity = file_identity(&file, path).map_err(io_error(path))?;
    Ok((file, identity))
}

fn map_open_file(file: &File, path: &Path) -> Result<Mmap> {
    let len = file.metadata().map_err(io_error(path))?.len();
    if len == 0 {
        return Err(FontError::Malformed(format!("{} is empty", path.display())));
    }

    // SAFETY: font files are treated as read-only for the lifetime of the map
    unsafe { Mmap::map(file) }.map_err(io_error(path))
}

fn map_path(path: &Path) -> Result<(Mmap, FileIdentity)> {
    let (file, identity) = open_identified(path)?;
    let mmap = map_open_file(&file, path)?;
    Ok((mmap, identity))
}

/// Reference to one pool mapping, held by an open instance.
///
/// Not cloneable: each open is matched by exactly one close.
#[derive(Debug, PartialEq, Eq)]
pub struct MappingRef {
    identity: FileIdentity,
}

impl MappingRef {
    pub fn identity(&self) -> FileIdentity {
        self.identity
    }
}

#[derive(Debug)]
struct FontMapping {
    data: Arc<Mmap>,
    path: PathBuf,
    refcount: usize,
}

/// Mapping statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingStats {
    pub total_mapped: usize,
    pub total_unmapped: usize,
    pub bytes_mapped: usize,
    pub reuse_hits: usize,
    pub mapping_failures: usize,
}

/// Pool of reference-counted file mappings
#[derive(Debug, Default)]
pub struct MappingPool {
    mappings: HashMap<FileIdentity, FontMapping>,
    stats: MappingStats,
}

impl MappingPool {
    /// Create new pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a file, or take another reference to its existing mapping
    pub fn open(&mut self, path: &Path) -> Result<(MappingRef, FontBytes)> {
        let (file, identity) = match open_identified(path) {
            Ok(opened) => opened,
            Err(e) => {
                self.stats.mapping_failures += 1;
                return Err(e);
            }
        };

        if let Some(existing) = self.mappings.get_mut(&identity) {
            existing.refcount += 1;
            self.stats.reuse_hits += 1;
            tracing::trace!(
                "Reusing mapping of {} (refcount {})",
                existing.path.display(),
                existing.refcount
            );
            return Ok((MappingRef { identity }, FontBytes::Mapped(existing.data.clone())));
        }

        let mmap = match map_open_file(&file, path) {
            Ok(mmap) => mmap,
            Err(e) => {
                self.stats.mapping_failures += 1;
                return Err(e);
            }
        };
        let data = Arc::new(mmap);
        self.stats.total_mapped += 1;
        self.stats.bytes_mapped += data.len();
        tracing::debug!("Mapped {} ({} bytes)", path.display(), data.len());

        self.mappings.insert(
            identity,
            FontMapping {
                data: data.clone(),
                path: path.to_path_buf(),
                refcount: 1,
            },
        );
        Ok((MappingRef { identity }, FontBytes::Mapped(data)))
    }

    /// Release one reference. Returns true when the file was unmapped.
    pub fn close(&mut self, mapping: MappingRef) -> bool {
        let Some(entry) = self.mappings.get_mut(&mapping.identity) else {
            tracing::warn!("Closing unknown mapping {:?}", mapping.identity);
            return false;
        };

        entry.refcount -= 1;
        if entry.refcount > 0 {
            return false;
        }

        if let Some(entry) = self.mappings.remove(&mapping.identity) {
            self.stats.total_unmapped += 1;
            self.stats.bytes_mapped -= entry.data.len();
            tracing::debug!("Unmapped {}", entry.path.display());
        }
        true
    }

    /// Current reference count of a mapping (0 once unmapped)
    pub fn refcount(&self, identity: FileIdentity) -> usize {
        self.mappings.get(&identity).map_or(0, |m| m.refcount)
    }

    /// Whether `path` is currently mapped
    pub fn is_mapped(&self, path: &Path) -> bool {
        open_identified(path).is_ok_and(|(_, identity)| self.mappings.contains_key(&identity))
    }

    /// Get stats
    pub fn stats(&self) -> &MappingStats {
        &self.stats
    }

    /// Active mappings count
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
