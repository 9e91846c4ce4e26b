//! Project orchestration: multi-file composition
//!
//! The public entry point for building an OX project. Sequencing per
//! build: load the entry file, run the `on_parse` hook (honoring
//! `finish()`), merge imported tag definitions, run the per-file
//! pipeline, then splice fully evaluated injects. Parse errors
//! short-circuit; preprocess errors are collected and surfaced
//! together.
//!
//! Pipeline: `Entry File` → `Imports` → `Preprocess` → `Injects` →
//! **`Final Document`**

pub mod config;
pub mod fs;
pub mod graph;
pub mod imports;
pub mod injects;
pub mod loader;
pub mod paths;

pub use config::ProjectConfig;
pub use fs::{FileStat, FileSystem, MemoryFileSystem, OsFileSystem};
pub use graph::{DependencyKind, ImportGraph};
pub use imports::process_imports;
pub use injects::{inline_top_level_injects, splice_injects, InjectEvaluator};
pub use loader::{FileLoader, LoaderStats};
pub use paths::{validate_alias, PathResolver};

use std::collections::HashMap;
use std::path::Path;

use crate::ast::nodes::{Document, Node};
use crate::errors::{BuildError, Diagnostics, Warning};
use crate::location::Location;
use crate::preprocess::{
    preprocess_document, MacroContext, MacroHandlers, ProviderRegistry, TagCapability,
    TagRegistry,
};
use crate::preprocess::data::DataProvider;

/// A configured OX project: configuration, loader, registries, and the
/// optional macro hooks. One build per call to `build`.
pub struct Project<F: FileSystem> {
    config: ProjectConfig,
    loader: FileLoader<F>,
    graph: ImportGraph,
    registry: TagRegistry,
    providers: ProviderRegistry,
    macros: Option<MacroContext>,
    diagnostics: Diagnostics,
}

impl Project<OsFileSystem> {
    pub fn new(config: ProjectConfig) -> Self {
        Self::with_fs(config, OsFileSystem)
    }
}

impl<F: FileSystem> Project<F> {
    pub fn with_fs(config: ProjectConfig, fs: F) -> Self {
        let loader = FileLoader::new(fs, &config);
        let graph = ImportGraph::new(config.max_import_depth);
        Self {
            config,
            loader,
            graph,
            registry: TagRegistry::new(),
            providers: ProviderRegistry::new(),
            macros: None,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Register a tag capability. Must happen before `build`.
    pub fn register_capability(&mut self, name: impl Into<String>, capability: TagCapability) {
        self.registry.register_capability(name, capability);
    }

    /// Register a data provider backing `on-data` blocks.
    pub fn register_provider(&mut self, id: impl Into<String>, provider: impl DataProvider + 'static) {
        self.providers.register(id, provider);
    }

    /// Install the macro hooks for this project.
    pub fn set_macro_handlers(&mut self, handlers: MacroHandlers) {
        self.macros = Some(MacroContext::new(handlers));
    }

    pub fn loader_stats(&self) -> LoaderStats {
        self.loader.stats()
    }

    /// Diagnostics collected by the most recent build.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.diagnostics.warnings
    }

    /// Build the project: returns the fully evaluated entry document.
    pub fn build(&mut self) -> Result<Document, BuildError> {
        self.diagnostics = Diagnostics::new();
        let entry = fs::normalize_path(&self.config.entry_path());
        tracing::debug!(entry = %entry.display(), "building project");

        let mut document = self.loader.load(&entry)?;

        // The on_parse hook sees the raw AST; finish() returns it
        // untouched and skips everything else.
        if let Some(context) = &mut self.macros {
            if context.run_on_parse(&mut document) {
                tracing::debug!("on_parse finished the pipeline early");
                return Ok(document);
            }
        }

        self.graph
            .enter(&entry, DependencyKind::Import, &document.location)
            .map_err(BuildError::Preprocess)?;
        let result = self.build_entry(&mut document, &entry);
        self.graph.exit();
        result?;

        if self.diagnostics.has_errors() {
            return Err(if self.diagnostics.errors.len() == 1 {
                BuildError::Preprocess(self.diagnostics.errors[0].clone())
            } else {
                BuildError::Collected(self.diagnostics.errors.clone())
            });
        }
        Ok(document)
    }

    fn build_entry(&mut self, document: &mut Document, entry: &Path) -> Result<(), BuildError> {
        process_imports(
            document,
            entry,
            &mut self.registry,
            &mut self.loader,
            &mut self.graph,
            &self.config,
            &mut self.diagnostics,
        )?;

        inline_top_level_injects(document);

        preprocess_document(
            document,
            &mut self.registry,
            &self.providers,
            self.macros.as_mut(),
            &mut self.diagnostics,
            self.config.lenient,
        )?;

        // Injects are evaluated in isolation and spliced last, so the
        // entry file's pass 2 never sees injected identifiers.
        let mut evaluator = FileEvaluator {
            loader: &mut self.loader,
            graph: &mut self.graph,
            config: &self.config,
            providers: &self.providers,
            diagnostics: &mut self.diagnostics,
            capabilities: self.registry.take_capabilities(),
        };
        let spliced = splice_injects(&mut document.nodes, entry, &mut evaluator);
        let capabilities = evaluator.capabilities;
        self.registry.restore_capabilities(capabilities);
        spliced
    }
}

/// The top-level evaluator injected files are processed through. Each
/// evaluation gets an isolated tag-definition scope sharing the host's
/// capability table, and no macro hooks.
struct FileEvaluator<'a, F: FileSystem> {
    loader: &'a mut FileLoader<F>,
    graph: &'a mut ImportGraph,
    config: &'a ProjectConfig,
    providers: &'a ProviderRegistry,
    diagnostics: &'a mut Diagnostics,
    capabilities: HashMap<String, TagCapability>,
}

impl<F: FileSystem> FileEvaluator<'_, F> {
    fn evaluate_file(&mut self, path: &Path) -> Result<Vec<Node>, BuildError> {
        let mut document = self.loader.load(path)?;

        let mut registry =
            TagRegistry::with_capabilities(std::mem::take(&mut self.capabilities));
        let staged = process_imports(
            &document,
            path,
            &mut registry,
            self.loader,
            self.graph,
            self.config,
            self.diagnostics,
        )
        .and_then(|_| {
            inline_top_level_injects(&mut document);
            preprocess_document(
                &mut document,
                &mut registry,
                self.providers,
                None,
                self.diagnostics,
                self.config.lenient,
            )
            .map_err(BuildError::from)
        });
        self.capabilities = registry.take_capabilities();
        staged?;

        // The injected file's own injects, recursively.
        splice_injects(&mut document.nodes, path, self)?;
        tracing::debug!(path = %path.display(), "evaluated injected file");
        Ok(document.nodes)
    }
}

impl<F: FileSystem> InjectEvaluator for FileEvaluator<'_, F> {
    fn evaluate_inject(
        &mut self,
        import_path: &str,
        importer: &Path,
        location: &Location,
    ) -> Result<Vec<Node>, BuildError> {
        let resolved = {
            let resolver = PathResolver::new(self.config, self.loader.fs());
            resolver.resolve(import_path, importer, location)?
        };
        self.graph
            .enter(&resolved, DependencyKind::Inject, location)
            .map_err(BuildError::Preprocess)?;
        let result = self.evaluate_file(&resolved);
        self.graph.exit();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::values::Value;

    fn project(files: &[(&str, &str)]) -> Project<MemoryFileSystem> {
        let mut memory = MemoryFileSystem::new();
        for (path, content) in files {
            memory.add_file(*path, *content);
        }
        Project::with_fs(ProjectConfig::new("/p", "main.ox"), memory)
    }

    #[test]
    fn single_file_build() {
        let mut project = project(&[("/p/main.ox", "[Player (name: \"Hero\", health: 100)]")]);
        let document = project.build().unwrap();
        let player = document.blocks().next().unwrap();
        assert_eq!(player.id.as_deref(), Some("Player"));
        assert_eq!(player.properties.get("health"), Some(&Value::number(100.0)));
        assert!(document.is_fully_evaluated());
    }

    #[test]
    fn import_then_instance() {
        let mut project = project(&[
            (
                "/p/main.ox",
                "<import \"./a.ox\" as ui> [App #ui.component(Button) [MyBtn]]",
            ),
            ("/p/a.ox", "@component(Button) [Button (width: 100)]"),
        ]);
        project.register_capability("component", TagCapability::new());
        let document = project.build().unwrap();
        let app = document.blocks().next().unwrap();
        let button = app.child_blocks().next().unwrap();
        assert_eq!(button.id.as_deref(), Some("MyBtn"));
        assert_eq!(button.properties.get("width"), Some(&Value::number(100.0)));
    }

    #[test]
    fn inject_splices_evaluated_blocks() {
        let mut project = project(&[
            ("/p/main.ox", "[App [Top] <inject \"./part.ox\"> [Bottom]]"),
            ("/p/part.ox", "<set n = 2> [Part (v: (n * 10))]"),
        ]);
        let document = project.build().unwrap();
        let app = document.blocks().next().unwrap();
        let ids: Vec<_> = app
            .child_blocks()
            .map(|b| b.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["Top", "Part", "Bottom"]);
        let part = app.child_blocks().nth(1).unwrap();
        assert_eq!(part.properties.get("v"), Some(&Value::number(20.0)));
    }

    #[test]
    fn on_parse_finish_returns_raw_document() {
        let mut project = project(&[("/p/main.ox", "<set x = 1> [A (v: x)]")]);
        project.set_macro_handlers(MacroHandlers::new().on_parse(|_, control| control.finish()));
        let document = project.build().unwrap();
        // Templates are still present: nothing was preprocessed.
        assert!(!document.is_fully_evaluated());
    }
}
