//! Inject processor: evaluated-subtree composition
//!
//! An `<inject "path">` splices another file's fully evaluated block
//! list into the host document. The injected file is preprocessed in an
//! isolated scope: its own imports, its own tag definitions, its own
//! block registry. References on either side of the boundary cannot see
//! across it; by the time injected blocks are spliced they are pure
//! data, and the host's own pass 2 has already run against a tree in
//! which the inject was still an opaque placeholder.
//!
//! Evaluation is reached through the `InjectEvaluator` trait rather
//! than a free function so the collaborator is substitutable in tests.

use std::path::Path;

use crate::ast::nodes::{Document, Node};
use crate::errors::BuildError;
use crate::location::Location;

/// Callback into the top-level evaluator: resolve `import_path` against
/// `importer`, evaluate the target file in isolation, and return its
/// final block list.
pub trait InjectEvaluator {
    fn evaluate_inject(
        &mut self,
        import_path: &str,
        importer: &Path,
        location: &Location,
    ) -> Result<Vec<Node>, BuildError>;
}

/// Move top-level injects inline as placeholder nodes at their recorded
/// anchors, so later phases see one uniform representation and splicing
/// preserves sibling order.
pub fn inline_top_level_injects(document: &mut Document) {
    let mut injects = std::mem::take(&mut document.injects);
    injects.sort_by_key(|inject| inject.anchor);
    for inject in injects.into_iter().rev() {
        let anchor = inject.anchor.min(document.nodes.len());
        document.nodes.insert(anchor, Node::Inject(inject.directive));
    }
}

/// Replace every inject placeholder in the tree with the evaluated
/// block list of its target, preserving sibling order. Block-position
/// placeholders splice in place; nested blocks are walked recursively.
pub fn splice_injects(
    nodes: &mut Vec<Node>,
    importer: &Path,
    evaluator: &mut dyn InjectEvaluator,
) -> Result<(), BuildError> {
    let mut index = 0;
    while index < nodes.len() {
        match &mut nodes[index] {
            Node::Inject(directive) => {
                let directive = directive.clone();
                let spliced =
                    evaluator.evaluate_inject(&directive.path, importer, &directive.location)?;
                let count = spliced.len();
                nodes.splice(index..=index, spliced);
                index += count;
            }
            Node::Block(block) => {
                splice_injects(&mut block.children, importer, evaluator)?;
                index += 1;
            }
            _ => index += 1,
        }
    }
    Ok(())
}
