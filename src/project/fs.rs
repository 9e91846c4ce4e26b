//! Filesystem access behind a trait
//!
//! The loader and path resolver never touch `std::fs` directly; they go
//! through `FileSystem` so tests can substitute an in-memory tree with
//! scripted symlinks. `OsFileSystem` is the production implementation.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};

/// Result of a `stat` call.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: Option<DateTime<Utc>>,
}

/// Minimal filesystem surface the core needs.
pub trait FileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn stat(&self, path: &Path) -> io::Result<FileStat>;
    /// Canonicalize: resolve symlinks and normalize the path.
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let metadata = std::fs::metadata(path)?;
        Ok(FileStat {
            size: metadata.len(),
            mtime: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Normalize a path lexically: drop `.` components and fold `..` into
/// their parent where possible. Does not consult the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// In-memory filesystem for tests: files, directories, and scripted
/// symlinks, all resolved lexically.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: BTreeMap<PathBuf, Vec<u8>>,
    symlinks: BTreeMap<PathBuf, PathBuf>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        self.files
            .insert(normalize_path(&path.into()), content.into());
    }

    /// Script a symlink: any path with `link` as a prefix resolves with
    /// that prefix replaced by `target`.
    pub fn add_symlink(&mut self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) {
        self.symlinks
            .insert(normalize_path(&link.into()), normalize_path(&target.into()));
    }

    fn resolve_links(&self, path: &Path) -> PathBuf {
        let normalized = normalize_path(path);
        for (link, target) in &self.symlinks {
            if let Ok(rest) = normalized.strip_prefix(link) {
                return self.resolve_links(&target.join(rest));
            }
        }
        normalized
    }

    fn is_dir(&self, path: &Path) -> bool {
        let resolved = self.resolve_links(path);
        self.files.keys().any(|file| file.starts_with(&resolved) && file != &resolved)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let resolved = self.resolve_links(path);
        self.files
            .get(&resolved)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let resolved = self.resolve_links(path);
        self.files
            .get(&resolved)
            .map(|content| FileStat {
                size: content.len() as u64,
                mtime: None,
            })
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let resolved = self.resolve_links(path);
        if self.files.contains_key(&resolved) || self.is_dir(&resolved) {
            Ok(resolved)
        } else {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let resolved = self.resolve_links(path);
        self.files.contains_key(&resolved) || self.is_dir(&resolved)
    }
}
