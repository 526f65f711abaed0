//! Archive store for jar/zip/war containers.
//!
//! The archive is memory-mapped once on open; entry lookups re-walk the
//! central directory over the mapping, so bytes are read lazily and delivered
//! exactly as stored. Decompilation correctness depends on bit-exact bytecode,
//! so `read_bytes` never transcodes.

use anyhow::{Context, Result};
use memmap2::Mmap;
use serde::Serialize;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jar", "zip", "war"];

#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub path: String,
    pub is_dir: bool,
}

#[derive(Debug)]
pub struct JarArchive {
    path: PathBuf,
    mmap: Mmap,
    entries: Vec<EntryInfo>,
}

impl JarArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open archive: {}", path.display()))?;
        let mmap = unsafe {
            Mmap::map(&file).with_context(|| format!("mmap failed: {}", path.display()))?
        };

        let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
            .with_context(|| format!("Failed to read zip structure: {}", path.display()))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            entries.push(EntryInfo {
                path: entry.name().to_string(),
                is_dir: entry.is_dir(),
            });
        }
        drop(archive);

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn contains(&self, entry_path: &str) -> bool {
        self.entries.iter().any(|e| e.path == entry_path)
    }

    /// Raw, unmodified bytes of an entry. `None` when the archive has no
    /// entry at `entry_path`.
    pub fn read_bytes(&self, entry_path: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = ZipArchive::new(Cursor::new(&self.mmap[..]))
            .with_context(|| format!("Failed to read zip structure: {}", self.path.display()))?;

        let mut entry = match archive.by_name(entry_path) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read entry: {entry_path}"));
            }
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to decompress entry: {entry_path}"))?;
        Ok(Some(bytes))
    }

    pub fn read_text(&self, entry_path: &str) -> Result<Option<String>> {
        Ok(self
            .read_bytes(entry_path)?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }
}

pub fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::{FileOptions, ZipWriter};

    fn temp_archive_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jarview_archive_test_{}_{}_{}.jar",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn read_bytes_is_bit_exact() {
        let path = temp_archive_path("bit_exact");
        let payload: &[u8] = &[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34, 0xFF];
        write_jar(&path, &[("a/B.class", payload), ("META-INF/MANIFEST.MF", b"Main-Class: a.B\n")]);

        let archive = JarArchive::open(&path).unwrap();
        assert_eq!(archive.read_bytes("a/B.class").unwrap().as_deref(), Some(payload));
        assert_eq!(archive.read_bytes("a/Missing.class").unwrap(), None);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn entries_keep_archive_order() {
        let path = temp_archive_path("order");
        write_jar(&path, &[("z/Last.class", b"z"), ("a/First.class", b"a")]);

        let archive = JarArchive::open(&path).unwrap();
        let names: Vec<&str> = archive.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, vec!["z/Last.class", "a/First.class"]);
        assert!(archive.contains("a/First.class"));
        assert!(!archive.contains("a/Other.class"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn read_text_decodes_lossy_utf8() {
        let path = temp_archive_path("text");
        write_jar(&path, &[("doc/readme.txt", b"hello \xFF world")]);

        let archive = JarArchive::open(&path).unwrap();
        let text = archive.read_text("doc/readme.txt").unwrap().unwrap();
        assert!(text.starts_with("hello "));
        assert!(text.ends_with(" world"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn supported_extensions_match_loader_rules() {
        assert!(has_supported_extension(Path::new("demo.jar")));
        assert!(has_supported_extension(Path::new("demo.WAR")));
        assert!(has_supported_extension(Path::new("demo.zip")));
        assert!(!has_supported_extension(Path::new("demo.tar.gz")));
        assert!(!has_supported_extension(Path::new("demo")));
    }
}
