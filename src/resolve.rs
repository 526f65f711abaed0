//! Resolution bridge between the execution unit and the archive store.
//!
//! The worker asks for bytecode by symbolic name (`com.foo.Bar`,
//! `com/foo/Bar`, with or without the `.class` suffix). Names are normalized
//! to archive paths before lookup, and absence is a normal answer: most
//! resolution requests name platform classes that live outside the archive.

use crate::archive::JarArchive;
use anyhow::Result;
use std::path::Path;
use std::sync::{Arc, RwLock};

const CLASS_SUFFIX: &str = ".class";

/// Normalizes a symbolic class name into an archive path.
///
/// The `.class` suffix is stripped before dot conversion so that already
/// normalized paths pass through unchanged; `normalize(normalize(p))` equals
/// `normalize(p)` for every input.
pub fn normalize_class_path(raw: &str) -> String {
    let stem = raw.strip_suffix(CLASS_SUFFIX).unwrap_or(raw);

    let mut path = if stem.contains('.') && !stem.contains('/') {
        stem.replace('.', "/")
    } else {
        stem.to_string()
    };
    path.push_str(CLASS_SUFFIX);

    match path.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// Shared holder of the currently loaded archive.
///
/// Replaced atomically on reload: a resolution arriving after a new archive
/// is loaded resolves against the new archive, never a stale one.
#[derive(Debug, Clone, Default)]
pub struct ArchiveSlot {
    current: Arc<RwLock<Option<Arc<JarArchive>>>>,
}

impl ArchiveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &Path) -> Result<Arc<JarArchive>> {
        let archive = Arc::new(JarArchive::open(path)?);
        *self.current.write().expect("archive slot poisoned") = Some(Arc::clone(&archive));
        Ok(archive)
    }

    pub fn replace(&self, archive: Arc<JarArchive>) {
        *self.current.write().expect("archive slot poisoned") = Some(archive);
    }

    pub fn clear(&self) {
        *self.current.write().expect("archive slot poisoned") = None;
    }

    pub fn archive(&self) -> Option<Arc<JarArchive>> {
        self.current.read().expect("archive slot poisoned").clone()
    }

    /// Answers one resolution request. Bytes are handed over by value; the
    /// slot retains no reference to them.
    pub fn resolve(&self, raw_path: &str) -> Option<Vec<u8>> {
        let normalized = normalize_class_path(raw_path);
        let archive = self.archive()?;
        match archive.read_bytes(&normalized) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %normalized, error = %e, "resolution read failed");
                None
            }
        }
    }
}
