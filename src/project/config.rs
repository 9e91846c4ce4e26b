//! Resolved project configuration
//!
//! The core consumes an already-resolved configuration record; loading
//! and merging config files is the front-end's job. All resource
//! budgets live here with their documented defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_IMPORT_DEPTH: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Absolute directory root; every resolved path must stay inside.
    pub base_dir: PathBuf,
    /// Entry file, relative to `base_dir`.
    pub entry_file: PathBuf,
    /// Directory names searched for package-style imports.
    pub module_directories: Vec<String>,
    /// Per-file byte limit.
    pub max_file_size: u64,
    /// Aggregate parsed-file cache limit.
    pub max_cache_size: u64,
    /// Import/inject nesting limit.
    pub max_import_depth: usize,
    /// `while` template iteration cap.
    pub max_while_iterations: usize,
    /// Per-block free-text byte limit.
    pub max_free_text_bytes: usize,
    /// Merge adjacent free-text siblings with identical tags.
    pub merge_free_text: bool,
    /// Evict least-recently-used cache entries on overflow; when false,
    /// overflow is a hard error.
    pub enable_cache_eviction: bool,
    /// Downgrade non-structural preprocess errors to warnings with
    /// null substitutes.
    pub lenient: bool,
}

impl ProjectConfig {
    pub fn new(base_dir: impl Into<PathBuf>, entry_file: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entry_file: entry_file.into(),
            module_directories: vec!["node_modules".to_string()],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_import_depth: DEFAULT_MAX_IMPORT_DEPTH,
            max_while_iterations: crate::parser::DEFAULT_MAX_WHILE_ITERATIONS,
            max_free_text_bytes: crate::lexer::DEFAULT_MAX_FREE_TEXT_BYTES,
            merge_free_text: true,
            enable_cache_eviction: true,
            lenient: false,
        }
    }

    /// Absolute path of the entry file.
    pub fn entry_path(&self) -> PathBuf {
        self.base_dir.join(&self.entry_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_budgets() {
        let config = ProjectConfig::new("/proj", "main.ox");
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.max_cache_size, 100 * 1024 * 1024);
        assert_eq!(config.max_import_depth, 50);
        assert_eq!(config.max_while_iterations, 10_000);
        assert_eq!(config.module_directories, vec!["node_modules"]);
        assert!(config.merge_free_text);
        assert!(config.enable_cache_eviction);
        assert!(!config.lenient);
        assert_eq!(config.entry_path(), PathBuf::from("/proj/main.ox"));
    }
}
