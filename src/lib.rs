//! OX Core - authoring-time toolchain for the OX data-interchange
//! language
//!
//! OX documents are hierarchical blocks with tagged metadata, template
//! directives, backtick-delimited free-text, and cross-file composition
//! via imports and injects. This crate is the three-stage core:
//!
//! ## Phase 1: Lexer + Parser (String → AST)
//! Single-pass scanner with free-text mode, then recursive descent into
//! a typed AST with source locations on every node.
//!
//! ## Phase 2: Preprocessor (AST → Pure Data)
//! In order: tag-template expansion, module property injection, data
//! sources, control-flow templates (`set`, `if`, `foreach`, `while`,
//! `on-data`) with the macro walk, then two-pass `$`-reference
//! resolution. After a successful run only blocks, free-text, literals,
//! and arrays remain.
//!
//! ## Phase 3: Project engine (multi-file composition)
//! `<import>` shares tag definitions (optionally namespaced),
//! `<inject>` splices independently evaluated subtrees, with sandboxed
//! path resolution, an LRU-bounded file cache, and cycle detection.
//!
//! The CLI, build plugins, config loading, and serialization all live
//! outside this crate; file I/O is reached through the
//! [`project::FileSystem`] trait so hosts and tests can substitute it.
//!
//! ```rust,ignore
//! use oxdef::{Project, ProjectConfig};
//!
//! let mut project = Project::new(ProjectConfig::new("/proj", "main.ox"));
//! let document = project.build()?;
//! ```

pub mod ast;
pub mod errors;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod preprocess;
pub mod project;

pub use ast::{BlockNode, Document, FreeTextNode, Literal, Node, Tag, TagKind, Value};
pub use errors::{
    BuildError, Diagnostics, LexError, ParseError, PreprocessError, PreprocessErrorKind, Warning,
};
pub use location::Location;
pub use preprocess::{
    DataProvider, MacroControl, MacroHandlers, ProviderRegistry, TagCapability, TagRegistry,
    WalkCursor,
};
pub use project::{
    FileSystem, LoaderStats, MemoryFileSystem, OsFileSystem, Project, ProjectConfig,
};

use preprocess::preprocess_document;

/// Parse OX source text into a raw document, without preprocessing.
pub fn parse_str(source: &str, file: Option<&str>) -> Result<Document, BuildError> {
    let tokens = match file {
        Some(file) => lexer::tokenize_file(source, file)?,
        None => lexer::tokenize(source)?,
    };
    let document = parser::parse(tokens, file.map(str::to_string))?;
    Ok(document)
}

/// Parse and fully preprocess a single self-contained document: no
/// imports, no injects. Multi-file documents go through [`Project`].
pub fn preprocess_str(source: &str, file: Option<&str>) -> Result<Document, BuildError> {
    preprocess_str_with(source, file, &mut TagRegistry::new(), &ProviderRegistry::new())
}

/// Like [`preprocess_str`], with caller-supplied registries so tag
/// capabilities and data providers are available.
pub fn preprocess_str_with(
    source: &str,
    file: Option<&str>,
    registry: &mut TagRegistry,
    providers: &ProviderRegistry,
) -> Result<Document, BuildError> {
    let mut document = parse_str(source, file)?;
    if !document.imports.is_empty() || !document.injects.is_empty() {
        return Err(BuildError::Preprocess(PreprocessError::new(
            PreprocessErrorKind::FileNotFound,
            "document uses imports or injects; build it through a Project",
        )));
    }

    let mut diagnostics = Diagnostics::new();
    preprocess_document(&mut document, registry, providers, None, &mut diagnostics, false)?;
    diagnostics.into_result()?;
    Ok(document)
}
