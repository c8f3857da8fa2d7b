//! The physical container: a ZIP archive of named entries.
//!
//! The package model only needs a handful of operations on the container,
//! captured by the [`Archive`] trait. [`ZipArchiveStore`] implements it on top
//! of the `zip` crate: the original file is held in memory, writes and deletes
//! are staged, and [`Archive::persist`] builds a complete new archive and moves
//! it into place atomically.

use crate::opc::options::{CompressionMethod, PackageOptions};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use zip::ZipArchive;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

/// Errors from the container layer.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Entry {name} exceeds the size limit of {limit} bytes")]
    EntryTooLarge { name: String, limit: u64 },

    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Minimal contract the package model needs from a container.
///
/// Entry names are ZIP member names (no leading slash).
pub trait Archive {
    /// Live entry names, in archive order followed by newly written entries.
    fn entry_names(&self) -> Vec<String>;

    fn contains(&self, name: &str) -> bool;

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError>;

    /// Stage `data` under `name`, replacing any previous content.
    fn write_entry(&mut self, name: &str, data: Vec<u8>) -> Result<(), ArchiveError>;

    /// Stage the removal of `name`. Removing an absent entry is a no-op.
    fn delete_entry(&mut self, name: &str) -> Result<(), ArchiveError>;

    /// Write the complete archive to `dest`.
    ///
    /// On failure the file at `dest` is left untouched.
    fn persist(&mut self, dest: &Path, options: &PackageOptions) -> Result<(), ArchiveError>;
}

/// ZIP-backed [`Archive`].
pub struct ZipArchiveStore {
    /// The archive as last read or persisted.
    source: Option<ZipArchive<Cursor<Vec<u8>>>>,
    /// Live entry names in output order.
    order: Vec<String>,
    live: HashSet<String>,
    /// Entries written since the last persist.
    staged: HashMap<String, Vec<u8>>,
    max_entry_size: u64,
}

impl ZipArchiveStore {
    /// An empty in-memory archive.
    pub fn new() -> Self {
        Self {
            source: None,
            order: Vec::new(),
            live: HashSet::new(),
            staged: HashMap::new(),
            max_entry_size: crate::opc::options::DEFAULT_MAX_PART_SIZE,
        }
    }

    /// Open the archive at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: &PackageOptions) -> Result<Self, ArchiveError> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data, options)
    }

    /// Read an archive held in memory.
    pub fn from_bytes(data: Vec<u8>, options: &PackageOptions) -> Result<Self, ArchiveError> {
        let mut store = Self::new();
        store.max_entry_size = options.max_part_size;
        store.load(data)?;
        Ok(store)
    }

    fn load(&mut self, data: Vec<u8>) -> Result<(), ArchiveError> {
        let zip = ZipArchive::new(Cursor::new(data))?;

        self.order.clear();
        self.live.clear();
        for name in zip.file_names() {
            if name.ends_with('/') {
                continue;
            }
            if self.live.insert(name.to_string()) {
                self.order.push(name.to_string());
            }
        }
        self.staged.clear();
        self.source = Some(zip);
        Ok(())
    }

    /// Serialize every live entry into a new ZIP image.
    ///
    /// Entries that were not rewritten are raw-copied without recompression.
    pub fn to_bytes(&mut self, options: &PackageOptions) -> Result<Vec<u8>, ArchiveError> {
        let (method, level) = match options.compression {
            CompressionMethod::Deflated => {
                (zip::CompressionMethod::Deflated, options.compression_level)
            },
            CompressionMethod::Stored => (zip::CompressionMethod::Stored, None),
        };
        let file_options = SimpleFileOptions::default()
            .compression_method(method)
            .compression_level(level);

        // `[Content_Types].xml` leads the archive, as Office writes it.
        let mut names: Vec<&String> = self.order.iter().collect();
        names.sort_by_key(|name| name.as_str() != "[Content_Types].xml");

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            if let Some(data) = self.staged.get(name) {
                writer.start_file(name.as_str(), file_options)?;
                writer.write_all(data)?;
                continue;
            }
            let source = self
                .source
                .as_mut()
                .ok_or_else(|| ArchiveError::EntryNotFound(name.clone()))?;
            let file = source.by_name(name)?;
            writer.raw_copy_file(file)?;
        }
        Ok(writer.finish()?.into_inner())
    }
}

impl Default for ZipArchiveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ZipArchiveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchiveStore")
            .field("entries", &self.order.len())
            .field("staged", &self.staged.len())
            .finish()
    }
}

impl Archive for ZipArchiveStore {
    fn entry_names(&self) -> Vec<String> {
        self.order.clone()
    }

    #[inline]
    fn contains(&self, name: &str) -> bool {
        self.live.contains(name)
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        if !self.live.contains(name) {
            return Err(ArchiveError::EntryNotFound(name.to_string()));
        }
        if let Some(data) = self.staged.get(name) {
            return Ok(data.clone());
        }

        let source = self
            .source
            .as_mut()
            .ok_or_else(|| ArchiveError::EntryNotFound(name.to_string()))?;
        let file = match source.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(ArchiveError::EntryNotFound(name.to_string()));
            },
            Err(e) => return Err(e.into()),
        };

        let limit = self.max_entry_size;
        if file.size() > limit {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                limit,
            });
        }

        // The declared size can be forged; cap what we actually inflate.
        let mut data = Vec::with_capacity(file.size() as usize);
        file.take(limit + 1).read_to_end(&mut data)?;
        if data.len() as u64 > limit {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                limit,
            });
        }
        Ok(data)
    }

    fn write_entry(&mut self, name: &str, data: Vec<u8>) -> Result<(), ArchiveError> {
        if self.live.insert(name.to_string()) {
            self.order.push(name.to_string());
        }
        self.staged.insert(name.to_string(), data);
        Ok(())
    }

    fn delete_entry(&mut self, name: &str) -> Result<(), ArchiveError> {
        if self.live.remove(name) {
            self.order.retain(|n| n != name);
        }
        self.staged.remove(name);
        Ok(())
    }

    fn persist(&mut self, dest: &Path, options: &PackageOptions) -> Result<(), ArchiveError> {
        let bytes = self.to_bytes(options)?;

        // Bare file names have an empty parent; use the current directory.
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| ArchiveError::Io(e.error))?;

        self.load(bytes)
    }
}
