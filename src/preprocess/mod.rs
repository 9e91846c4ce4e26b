//! The OX preprocessor
//!
//! Per-file pipeline, run after imports are merged and injected files
//! are evaluated: tag expansion, module property injection, template
//! expansion with the macro walk, then two-pass reference resolution.
//! On success no template, expression, or unresolved reference remains
//! in the document.
//!
//! Pipeline: `Source Text` → `Tokens` → `AST` → **`Preprocessed AST`**

pub mod data;
pub mod expand;
pub mod expr;
pub mod macros;
pub mod resolve;
pub mod scope;
pub mod tags;

pub use data::{DataProvider, ProviderRegistry};
pub use expand::expand_document;
pub use expr::{evaluate, substitute_scope_vars, NoReferences, ReferenceResolver};
pub use macros::{MacroContext, MacroControl, MacroHandlers, OnParse, OnWalk, WalkCursor};
pub use resolve::{build_registry, check_source_ids, resolve_document, BlockRegistry};
pub use scope::Scope;
pub use tags::{
    AttrType, AttributeSpec, ModuleGetter, TagCapability, TagDescriptor, TagRegistry,
};

use crate::ast::nodes::Document;
use crate::errors::{Diagnostics, PreprocessError};

/// Run the full per-file pipeline on a document whose imports and
/// injects have already been handled by the project layer.
///
/// Structural errors short-circuit; everything else lands in
/// `diagnostics`, as errors in strict mode or warnings with null
/// substitutes in lenient mode.
pub fn preprocess_document(
    document: &mut Document,
    registry: &mut TagRegistry,
    providers: &ProviderRegistry,
    macros: Option<&mut MacroContext>,
    diagnostics: &mut Diagnostics,
    lenient: bool,
) -> Result<(), PreprocessError> {
    resolve::check_source_ids(document)?;
    tags::process_document(document, registry, diagnostics)?;
    expand::expand_document(document, providers, macros, diagnostics, lenient)?;
    let block_registry = resolve::build_registry(document);
    resolve::resolve_document(document, &block_registry, diagnostics, lenient)?;
    tracing::debug!(
        errors = diagnostics.errors.len(),
        warnings = diagnostics.warnings.len(),
        "preprocess pipeline finished"
    );
    Ok(())
}
