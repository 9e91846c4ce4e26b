//! File loader: read, parse once, cache with LRU eviction
//!
//! Files are cached by canonical path (symlink-resolved, case-folded on
//! case-insensitive platforms, separator-normalized) so every import of
//! one file parses it once. The cache is bounded: each file must fit the
//! per-file limit, and when the aggregate limit overflows the least
//! recently used entries are evicted first, unless eviction is disabled
//! and overflow becomes a hard error.
//!
//! TOCTOU protection: the size is stat'ed before the read and the byte
//! count verified after, bounded by a safety factor, so a file that
//! grows mid-read cannot blow past the budget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::nodes::Document;
use crate::errors::{BuildError, PreprocessError, PreprocessErrorKind};
use crate::lexer::{Lexer, LexOptions};
use crate::parser::{parse_with_options, ParseOptions};
use crate::project::config::ProjectConfig;
use crate::project::fs::{normalize_path, FileSystem};

/// Allowed growth between stat and read before the load is rejected.
const TOCTOU_SAFETY_FACTOR: u64 = 2;

/// Cache behavior counters, exposed to hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderStats {
    pub hits: u64,
    pub misses: u64,
    pub cache_size: u64,
    pub entry_count: usize,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    document: Document,
    size: u64,
    last_access: u64,
    #[allow(dead_code)]
    loaded_at: Option<DateTime<Utc>>,
}

/// Reads and caches parsed `.ox` files through a `FileSystem`.
pub struct FileLoader<F: FileSystem> {
    fs: F,
    max_file_size: u64,
    max_cache_size: u64,
    enable_eviction: bool,
    lex_free_text_limit: usize,
    parse_options: ParseOptions,
    cache: HashMap<PathBuf, CacheEntry>,
    access_counter: u64,
    stats: LoaderStats,
}

impl<F: FileSystem> FileLoader<F> {
    pub fn new(fs: F, config: &ProjectConfig) -> Self {
        Self {
            fs,
            max_file_size: config.max_file_size,
            max_cache_size: config.max_cache_size,
            enable_eviction: config.enable_cache_eviction,
            lex_free_text_limit: config.max_free_text_bytes,
            parse_options: ParseOptions {
                merge_free_text: config.merge_free_text,
                max_while_iterations: config.max_while_iterations,
            },
            cache: HashMap::new(),
            access_counter: 0,
            stats: LoaderStats::default(),
        }
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Load a file, parsing it on first access and serving the cached
    /// AST afterwards. Returns a clone the caller owns.
    pub fn load(&mut self, path: &Path) -> Result<Document, BuildError> {
        let key = self.cache_key(path);

        self.access_counter += 1;
        let access = self.access_counter;
        if let Some(entry) = self.cache.get_mut(&key) {
            entry.last_access = access;
            self.stats.hits += 1;
            tracing::trace!(path = %key.display(), "loader cache hit");
            return Ok(entry.document.clone());
        }
        self.stats.misses += 1;

        let stat = self.fs.stat(path).map_err(|_| {
            BuildError::Preprocess(PreprocessError::new(
                PreprocessErrorKind::FileNotFound,
                format!("file not found: {}", path.display()),
            ))
        })?;
        if stat.size > self.max_file_size {
            return Err(self.too_large(path, stat.size));
        }

        let bytes = self.fs.read(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let actual = bytes.len() as u64;
        if actual > stat.size.saturating_mul(TOCTOU_SAFETY_FACTOR).max(4096) {
            return Err(BuildError::Preprocess(PreprocessError::new(
                PreprocessErrorKind::FileTooLarge,
                format!(
                    "{} grew from {} to {} bytes during read",
                    path.display(),
                    stat.size,
                    actual
                ),
            )));
        }
        if actual > self.max_file_size {
            return Err(self.too_large(path, actual));
        }

        let source = String::from_utf8(bytes).map_err(|error| BuildError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        })?;

        let display = path.display().to_string();
        let tokens = Lexer::new(
            &source,
            LexOptions {
                file: Some(display.clone()),
                max_free_text_bytes: self.lex_free_text_limit,
            },
        )
        .tokenize()?;
        let document = parse_with_options(tokens, Some(display), self.parse_options.clone())?;

        self.insert(key, document.clone(), actual, path)?;
        tracing::debug!(path = %path.display(), bytes = actual, "loaded and parsed file");
        Ok(document)
    }

    pub fn has(&self, path: &Path) -> bool {
        self.cache.contains_key(&self.cache_key(path))
    }

    pub fn invalidate(&mut self, path: &Path) {
        if let Some(entry) = self.cache.remove(&self.cache_key(path)) {
            self.stats.cache_size -= entry.size;
            self.stats.entry_count = self.cache.len();
        }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.stats.cache_size = 0;
        self.stats.entry_count = 0;
    }

    pub fn stats(&self) -> LoaderStats {
        self.stats
    }

    fn insert(
        &mut self,
        key: PathBuf,
        document: Document,
        size: u64,
        path: &Path,
    ) -> Result<(), BuildError> {
        if size > self.max_cache_size {
            return Err(BuildError::Preprocess(PreprocessError::new(
                PreprocessErrorKind::FileTooLarge,
                format!(
                    "{} ({} bytes) exceeds the aggregate cache limit of {} bytes",
                    path.display(),
                    size,
                    self.max_cache_size
                ),
            )));
        }

        while self.stats.cache_size + size > self.max_cache_size {
            if !self.enable_eviction {
                return Err(BuildError::Preprocess(PreprocessError::new(
                    PreprocessErrorKind::FileTooLarge,
                    format!(
                        "cache overflow loading {} with eviction disabled",
                        path.display()
                    ),
                )));
            }
            let oldest = self
                .cache
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(victim) => {
                    if let Some(entry) = self.cache.remove(&victim) {
                        self.stats.cache_size -= entry.size;
                        self.stats.evictions += 1;
                        tracing::trace!(path = %victim.display(), "evicted cache entry");
                    }
                }
                None => break,
            }
        }

        self.stats.cache_size += size;
        self.cache.insert(
            key,
            CacheEntry {
                document,
                size,
                last_access: self.access_counter,
                loaded_at: Some(Utc::now()),
            },
        );
        self.stats.entry_count = self.cache.len();
        Ok(())
    }

    fn too_large(&self, path: &Path, size: u64) -> BuildError {
        BuildError::Preprocess(PreprocessError::new(
            PreprocessErrorKind::FileTooLarge,
            format!(
                "{} is {} bytes, over the {} byte limit",
                path.display(),
                size,
                self.max_file_size
            ),
        ))
    }

    /// Canonical cache key: symlink-resolved where possible, lexically
    /// normalized otherwise, case-folded on case-insensitive platforms.
    fn cache_key(&self, path: &Path) -> PathBuf {
        let resolved = self
            .fs
            .realpath(path)
            .unwrap_or_else(|_| normalize_path(path));
        if cfg!(any(windows, target_os = "macos")) {
            PathBuf::from(resolved.to_string_lossy().to_lowercase())
        } else {
            resolved
        }
    }
}
