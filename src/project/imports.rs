//! Import processor: tag-definition sharing across files
//!
//! For each `<import>` directive the target file is resolved, loaded,
//! and its top-level `@tag` definitions extracted, transitively: a
//! file's imports contribute their definitions too, with their own
//! namespace prefixes intact. An `as alias` prefixes every extracted
//! key with `alias.`. Non-namespaced collisions are last-writer-wins
//! with a warning; intra-namespace collisions are hard errors.
//!
//! Imports never appear below document root (the parser rejects that),
//! and inject-processed subtrees cannot carry imports into the parent
//! scope: injected files are evaluated against their own registry.

use std::path::Path;

use crate::ast::nodes::{Document, Node, TagKind};
use crate::errors::{BuildError, Diagnostics};
use crate::preprocess::tags::{TagDefinition, TagRegistry};
use crate::project::config::ProjectConfig;
use crate::project::fs::FileSystem;
use crate::project::graph::{DependencyKind, ImportGraph};
use crate::project::loader::FileLoader;
use crate::project::paths::{validate_alias, PathResolver};

/// Process every import of `document`, merging extracted definitions
/// into `registry`.
pub fn process_imports<F: FileSystem>(
    document: &Document,
    file: &Path,
    registry: &mut TagRegistry,
    loader: &mut FileLoader<F>,
    graph: &mut ImportGraph,
    config: &ProjectConfig,
    diagnostics: &mut Diagnostics,
) -> Result<(), BuildError> {
    let definitions = gather_imported_definitions(document, file, loader, graph, config)?;
    for (key, definition, location) in definitions {
        registry.merge_imported(key, definition, &location, diagnostics)?;
    }
    Ok(())
}

type GatheredDefinition = (String, TagDefinition, crate::location::Location);

/// Walk the import closure of `document`, depth-first, returning the
/// definitions each import contributes in declaration order.
fn gather_imported_definitions<F: FileSystem>(
    document: &Document,
    file: &Path,
    loader: &mut FileLoader<F>,
    graph: &mut ImportGraph,
    config: &ProjectConfig,
) -> Result<Vec<GatheredDefinition>, BuildError> {
    let mut gathered = Vec::new();

    for import in &document.imports {
        if let Some(alias) = &import.alias {
            validate_alias(alias, &import.location)?;
        }

        let resolved = {
            // Resolver borrows the loader's filesystem immutably.
            let resolver = PathResolver::new(config, loader.fs());
            resolver.resolve(&import.path, file, &import.location)?
        };

        graph.enter(&resolved, DependencyKind::Import, &import.location)?;
        let result = (|| {
            let imported = loader.load(&resolved)?;
            let mut contributed =
                gather_imported_definitions(&imported, &resolved, loader, graph, config)?;
            contributed.extend(extract_top_level_definitions(&imported));
            Ok::<Vec<GatheredDefinition>, BuildError>(contributed)
        })();
        graph.exit();
        let contributed = result?;

        for (key, mut definition, location) in contributed {
            let key = match &import.alias {
                Some(alias) => {
                    definition.namespace = Some(alias.clone());
                    format!("{}.{}", alias, key)
                }
                None => key,
            };
            gathered.push((key, definition, location));
        }
        tracing::debug!(
            path = %resolved.display(),
            alias = import.alias.as_deref().unwrap_or(""),
            "imported tag definitions"
        );
    }

    Ok(gathered)
}

/// Extract `@tag` definitions from a document's top-level blocks. The
/// stored template is the block minus its definition tags.
fn extract_top_level_definitions(document: &Document) -> Vec<GatheredDefinition> {
    let mut definitions = Vec::new();
    for node in &document.nodes {
        let block = match node {
            Node::Block(block) => block,
            _ => continue,
        };
        if !block.tags.iter().any(|t| t.kind == TagKind::Definition) {
            continue;
        }
        let mut template = block.clone();
        template.tags.retain(|t| t.kind != TagKind::Definition);
        for tag in block.tags.iter().filter(|t| t.kind == TagKind::Definition) {
            definitions.push((
                tag.lookup_key(),
                TagDefinition {
                    template: template.clone(),
                    namespace: None,
                    used: false,
                },
                tag.location.clone(),
            ));
        }
    }
    definitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PreprocessErrorKind;
    use crate::project::fs::MemoryFileSystem;

    fn setup(
        files: &[(&str, &str)],
    ) -> (
        FileLoader<MemoryFileSystem>,
        ImportGraph,
        ProjectConfig,
        TagRegistry,
        Diagnostics,
    ) {
        let mut fs = MemoryFileSystem::new();
        for (path, content) in files {
            fs.add_file(*path, *content);
        }
        let config = ProjectConfig::new("/p", "main.ox");
        let loader = FileLoader::new(fs, &config);
        let graph = ImportGraph::new(config.max_import_depth);
        (loader, graph, config, TagRegistry::new(), Diagnostics::new())
    }

    fn run(
        files: &[(&str, &str)],
    ) -> Result<(TagRegistry, Diagnostics), BuildError> {
        let (mut loader, mut graph, config, mut registry, mut diagnostics) = setup(files);
        let entry = loader.load(Path::new("/p/main.ox"))?;
        graph
            .enter(
                Path::new("/p/main.ox"),
                DependencyKind::Import,
                &crate::location::Location::default(),
            )
            .map_err(BuildError::Preprocess)?;
        process_imports(
            &entry,
            Path::new("/p/main.ox"),
            &mut registry,
            &mut loader,
            &mut graph,
            &config,
            &mut diagnostics,
        )?;
        Ok((registry, diagnostics))
    }

    #[test]
    fn definitions_merge_without_namespace() {
        let (registry, diagnostics) = run(&[
            ("/p/main.ox", "<import \"./lib.ox\"> [App]"),
            ("/p/lib.ox", "@card [CardBase (w: 1)]"),
        ])
        .unwrap();
        assert!(registry.definition("card").is_some());
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn alias_prefixes_keys() {
        let (registry, _) = run(&[
            ("/p/main.ox", "<import \"./lib.ox\" as ui> [App]"),
            ("/p/lib.ox", "@component(Button) [Button (width: 100)]"),
        ])
        .unwrap();
        assert!(registry.definition("ui.component(Button)").is_some());
        assert!(registry.definition("component(Button)").is_none());
    }

    #[test]
    fn transitive_imports_carry_nested_namespaces() {
        let (registry, _) = run(&[
            ("/p/main.ox", "<import \"./mid.ox\" as outer> [App]"),
            ("/p/mid.ox", "<import \"./leaf.ox\" as inner> @mid [M]"),
            ("/p/leaf.ox", "@leaf [L]"),
        ])
        .unwrap();
        assert!(registry.definition("outer.mid").is_some());
        assert!(registry.definition("outer.inner.leaf").is_some());
    }

    #[test]
    fn non_namespaced_override_warns() {
        let (registry, diagnostics) = run(&[
            (
                "/p/main.ox",
                "<import \"./a.ox\"> <import \"./b.ox\"> [App]",
            ),
            ("/p/a.ox", "@card [FromA (v: 1)]"),
            ("/p/b.ox", "@card [FromB (v: 2)]"),
        ])
        .unwrap();
        // Last writer wins, with a warning attached.
        let definition = registry.definition("card").unwrap();
        assert_eq!(definition.template.id.as_deref(), Some("FromB"));
        assert_eq!(diagnostics.warnings.len(), 1);
    }

    #[test]
    fn namespaced_collision_is_hard_error() {
        let error = run(&[
            (
                "/p/main.ox",
                "<import \"./a.ox\" as ui> <import \"./b.ox\" as ui> [App]",
            ),
            ("/p/a.ox", "@card [FromA]"),
            ("/p/b.ox", "@card [FromB]"),
        ])
        .unwrap_err();
        match error {
            BuildError::Preprocess(error) => {
                assert_eq!(error.kind, PreprocessErrorKind::DuplicateTagDefinition)
            }
            other => panic!("expected preprocess error, got {:?}", other),
        }
    }

    #[test]
    fn import_cycle_detected() {
        let error = run(&[
            ("/p/main.ox", "<import \"./a.ox\"> [App]"),
            ("/p/a.ox", "<import \"./b.ox\"> @a [A]"),
            ("/p/b.ox", "<import \"./a.ox\"> @b [B]"),
        ])
        .unwrap_err();
        match error {
            BuildError::Preprocess(error) => {
                assert_eq!(error.kind, PreprocessErrorKind::CircularDependency);
                assert!(error.message.contains("a.ox"));
                assert!(error.message.contains("b.ox"));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn reserved_alias_rejected() {
        let error = run(&[
            ("/p/main.ox", "<import \"./a.ox\" as parent> [App]"),
            ("/p/a.ox", "@a [A]"),
        ])
        .unwrap_err();
        match error {
            BuildError::Preprocess(error) => {
                assert_eq!(error.kind, PreprocessErrorKind::InvalidImportAlias)
            }
            other => panic!("expected alias error, got {:?}", other),
        }
    }
}
