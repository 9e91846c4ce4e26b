//! Import path resolution with sandbox enforcement
//!
//! Relative paths (`./`, `../`) resolve against the importing file's
//! directory; package paths search the configured module directories. In
//! both cases the final path must stay inside the project base (or the
//! package source directory), checked lexically before symlink
//! resolution and again after, so a symlink cannot smuggle a path out of
//! the sandbox.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::errors::{PreprocessError, PreprocessErrorKind};
use crate::location::Location;
use crate::project::config::ProjectConfig;
use crate::project::fs::{normalize_path, FileSystem};

/// Longest accepted import path, in bytes.
pub const MAX_PATH_BYTES: usize = 4096;
/// Longest accepted import alias.
pub const MAX_ALIAS_LEN: usize = 50;

const RESERVED_ALIASES: [&str; 3] = ["default", "this", "parent"];

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap())
}

/// Validate a namespace alias: identifier shape, length bound, and not
/// a reserved word.
pub fn validate_alias(alias: &str, location: &Location) -> Result<(), PreprocessError> {
    if alias.len() > MAX_ALIAS_LEN {
        return Err(PreprocessError::at(
            PreprocessErrorKind::InvalidImportAlias,
            format!("alias '{}' exceeds {} characters", alias, MAX_ALIAS_LEN),
            location.clone(),
        ));
    }
    if RESERVED_ALIASES.contains(&alias) {
        return Err(PreprocessError::at(
            PreprocessErrorKind::InvalidImportAlias,
            format!("alias '{}' is reserved", alias),
            location.clone(),
        ));
    }
    if !alias_pattern().is_match(alias) {
        return Err(PreprocessError::at(
            PreprocessErrorKind::InvalidImportAlias,
            format!("alias '{}' is not a valid identifier", alias),
            location.clone(),
        ));
    }
    Ok(())
}

/// Optional per-package manifest naming the source subdirectory.
#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default = "default_package_source")]
    source: String,
}

fn default_package_source() -> String {
    "ox".to_string()
}

/// Resolves import and inject paths for one project.
pub struct PathResolver<'a, F: FileSystem> {
    config: &'a ProjectConfig,
    fs: &'a F,
}

impl<'a, F: FileSystem> PathResolver<'a, F> {
    pub fn new(config: &'a ProjectConfig, fs: &'a F) -> Self {
        Self { config, fs }
    }

    /// Resolve an import path against the importing file. Returns the
    /// canonical absolute path of the target.
    pub fn resolve(
        &self,
        import_path: &str,
        importer: &Path,
        location: &Location,
    ) -> Result<PathBuf, PreprocessError> {
        let reject = |message: String| {
            PreprocessError::at(PreprocessErrorKind::PathTraversal, message, location.clone())
        };

        if import_path.contains('\0') {
            return Err(reject("import path contains a NUL byte".to_string()));
        }
        if import_path.len() > MAX_PATH_BYTES {
            return Err(reject(format!(
                "import path exceeds {} bytes",
                MAX_PATH_BYTES
            )));
        }
        if !import_path.ends_with(".ox") {
            return Err(reject(format!(
                "import path '{}' must end with '.ox'",
                import_path
            )));
        }

        if import_path.starts_with("./") || import_path.starts_with("../") {
            self.resolve_relative(import_path, importer, location)
        } else {
            self.resolve_package(import_path, location)
        }
    }

    fn resolve_relative(
        &self,
        import_path: &str,
        importer: &Path,
        location: &Location,
    ) -> Result<PathBuf, PreprocessError> {
        let importer_dir = importer.parent().unwrap_or(Path::new("."));
        let candidate = normalize_path(&importer_dir.join(import_path));
        let base = normalize_path(&self.config.base_dir);

        // Containment check before symlink resolution.
        if !candidate.starts_with(&base) {
            return Err(PreprocessError::at(
                PreprocessErrorKind::PathTraversal,
                format!(
                    "import '{}' escapes the project base directory {}",
                    import_path,
                    base.display()
                ),
                location.clone(),
            ));
        }

        self.check_canonical(&candidate, &base, import_path, location)
    }

    fn resolve_package(
        &self,
        import_path: &str,
        location: &Location,
    ) -> Result<PathBuf, PreprocessError> {
        let segments: Vec<&str> = import_path.split('/').collect();
        // Scoped packages (`@scope/pkg`) consume two segments.
        let name_len = if import_path.starts_with('@') { 2 } else { 1 };
        if segments.len() <= name_len {
            return Err(PreprocessError::at(
                PreprocessErrorKind::FileNotFound,
                format!("package import '{}' names no file", import_path),
                location.clone(),
            ));
        }
        let package: PathBuf = segments[..name_len].iter().collect();
        let rest: PathBuf = segments[name_len..].iter().collect();

        for module_dir in &self.config.module_directories {
            let package_root = normalize_path(&self.config.base_dir.join(module_dir).join(&package));
            if !self.fs.exists(&package_root) {
                continue;
            }

            let source_root = match self.read_manifest(&package_root) {
                Some(manifest) => package_root.join(manifest.source),
                None => package_root.clone(),
            };
            let candidate = normalize_path(&source_root.join(&rest));

            // The package source directory is the sandbox here.
            if !candidate.starts_with(&source_root) {
                return Err(PreprocessError::at(
                    PreprocessErrorKind::PathTraversal,
                    format!(
                        "package import '{}' escapes the package source directory",
                        import_path
                    ),
                    location.clone(),
                ));
            }
            if !self.fs.exists(&candidate) {
                continue;
            }
            return self.check_canonical(&candidate, &source_root, import_path, location);
        }

        Err(PreprocessError::at(
            PreprocessErrorKind::FileNotFound,
            format!(
                "package import '{}' not found in module directories [{}]",
                import_path,
                self.config.module_directories.join(", ")
            ),
            location.clone(),
        ))
    }

    fn read_manifest(&self, package_root: &Path) -> Option<PackageManifest> {
        let manifest_path = package_root.join("ox.config.json");
        let bytes = self.fs.read(&manifest_path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Containment check after symlink resolution. A missing file
    /// passes through here and fails later in the loader; the probe
    /// itself never reads file content.
    fn check_canonical(
        &self,
        candidate: &Path,
        sandbox: &Path,
        import_path: &str,
        location: &Location,
    ) -> Result<PathBuf, PreprocessError> {
        let canonical_sandbox = self
            .fs
            .realpath(sandbox)
            .unwrap_or_else(|_| sandbox.to_path_buf());
        match self.fs.realpath(candidate) {
            Ok(canonical) => {
                if !canonical.starts_with(&canonical_sandbox) {
                    return Err(PreprocessError::at(
                        PreprocessErrorKind::PathTraversal,
                        format!(
                            "import '{}' resolves through a symlink outside {}",
                            import_path,
                            canonical_sandbox.display()
                        ),
                        location.clone(),
                    ));
                }
                Ok(canonical)
            }
            Err(_) => Ok(candidate.to_path_buf()),
        }
    }
}
