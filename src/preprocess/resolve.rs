//! Two-pass reference resolution
//!
//! Pass 1 walks the expanded document and records `id → block path` in a
//! per-file registry; forward references work because pass 2 only starts
//! once the registry is complete. Pass 2 walks every block property and
//! reduces deferred expressions and `$`-references to pure data, lazily
//! evaluating referenced properties with a visited set guarding against
//! property cycles.
//!
//! Duplicate ids are rejected in source form before template expansion;
//! clones produced by `foreach` and tag expansion legitimately repeat an
//! id, so the registry records the first pre-order occurrence.
//!
//! References never cross file boundaries: injected subtrees are
//! resolved in their own file's registry before they are spliced in.

use std::collections::{HashMap, HashSet};

use crate::ast::nodes::{Document, Node};
use crate::ast::values::{Reference, RefHead, Value};
use crate::ast::walk::{block_at_path, block_at_path_mut};
use crate::errors::{Diagnostics, PreprocessError, PreprocessErrorKind, Warning};
use crate::preprocess::expr::{evaluate, ReferenceResolver};
use crate::preprocess::scope::Scope;

/// Per-file registry of block ids, frozen after pass 1.
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    entries: HashMap<String, Vec<usize>>,
}

impl BlockRegistry {
    pub fn lookup(&self, id: &str) -> Option<&[usize]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// A case-insensitive near-miss, for "did you mean" hints.
    fn suggest(&self, id: &str) -> Option<&str> {
        let lowered = id.to_lowercase();
        self.entries
            .keys()
            .find(|known| known.to_lowercase() == lowered)
            .map(String::as_str)
    }
}

/// Reject duplicate block ids in the source tree, before expansion can
/// clone anything. The check is flat across the file but skips template
/// bodies, whose blocks are clone sources rather than addressable
/// instances.
pub fn check_source_ids(document: &Document) -> Result<(), PreprocessError> {
    fn visit(nodes: &[Node], seen: &mut HashMap<String, ()>) -> Result<(), PreprocessError> {
        for node in nodes {
            if let Node::Block(block) = node {
                if let Some(id) = &block.id {
                    if seen.insert(id.clone(), ()).is_some() {
                        return Err(PreprocessError::at(
                            PreprocessErrorKind::DuplicateBlockId,
                            format!("duplicate block id '{}'", id),
                            block.location.clone(),
                        ));
                    }
                }
                visit(&block.children, seen)?;
            }
        }
        Ok(())
    }
    let mut seen = HashMap::new();
    visit(&document.nodes, &mut seen)
}

/// Pass 1: build the id registry over the expanded tree. First pre-order
/// occurrence wins so that expansion clones cannot shadow each other
/// nondeterministically.
pub fn build_registry(document: &Document) -> BlockRegistry {
    fn visit(nodes: &[Node], path: &mut Vec<usize>, registry: &mut BlockRegistry) {
        for (index, node) in nodes.iter().enumerate() {
            if let Node::Block(block) = node {
                path.push(index);
                if let Some(id) = &block.id {
                    registry
                        .entries
                        .entry(id.clone())
                        .or_insert_with(|| path.clone());
                }
                visit(&block.children, path, registry);
                path.pop();
            }
        }
    }
    let mut registry = BlockRegistry::default();
    let mut path = Vec::new();
    visit(&document.nodes, &mut path, &mut registry);
    tracing::trace!(ids = registry.entries.len(), "built block registry");
    registry
}

/// Pass 2: resolve every deferred expression and reference reachable
/// from block properties. Structural failures short-circuit; evaluation
/// failures are collected (strict) or downgraded with a null substitute
/// (lenient).
pub fn resolve_document(
    document: &mut Document,
    registry: &BlockRegistry,
    diagnostics: &mut Diagnostics,
    lenient: bool,
) -> Result<(), PreprocessError> {
    let block_paths = collect_block_paths(&document.nodes);
    let mut visiting = HashSet::new();

    for path in block_paths {
        let keys: Vec<String> = match block_at_path(&document.nodes, &path) {
            Some(block) => block.properties.keys().cloned().collect(),
            None => continue,
        };
        for key in keys {
            match resolve_property(&mut document.nodes, registry, &path, &key, &mut visiting) {
                Ok(_) => {}
                Err(error) if error.is_structural() => return Err(error),
                Err(error) => {
                    if lenient {
                        diagnostics.warn(Warning {
                            message: format!("{} (substituted null)", error),
                            location: error.location.clone(),
                        });
                    } else {
                        diagnostics.error(error);
                    }
                    if let Some(block) = block_at_path_mut(&mut document.nodes, &path) {
                        block.properties.insert(key, Value::null());
                    }
                }
            }
        }
    }
    Ok(())
}

fn collect_block_paths(nodes: &[Node]) -> Vec<Vec<usize>> {
    fn visit(nodes: &[Node], path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        for (index, node) in nodes.iter().enumerate() {
            if let Node::Block(block) = node {
                path.push(index);
                out.push(path.clone());
                visit(&block.children, path, out);
                path.pop();
            }
        }
    }
    let mut out = Vec::new();
    let mut path = Vec::new();
    visit(nodes, &mut path, &mut out);
    out
}

type CycleKey = (Vec<usize>, String);

/// Resolve one property to pure data, writing the result back into the
/// block. Re-entrant through reference chains; the visited set turns
/// property cycles into `CircularReferenceError`.
fn resolve_property(
    nodes: &mut Vec<Node>,
    registry: &BlockRegistry,
    block_path: &[usize],
    key: &str,
    visiting: &mut HashSet<CycleKey>,
) -> Result<Value, PreprocessError> {
    let current = match block_at_path(nodes, block_path) {
        Some(block) => match block.properties.get(key) {
            Some(value) => value.clone(),
            None => {
                return Err(PreprocessError::new(
                    PreprocessErrorKind::UnresolvedReference,
                    format!("no property '{}' on referenced block", key),
                ));
            }
        },
        None => {
            return Err(PreprocessError::new(
                PreprocessErrorKind::UnresolvedReference,
                format!("referenced block no longer exists (property '{}')", key),
            ));
        }
    };

    if current.is_pure_data() {
        return Ok(current);
    }

    let cycle_key = (block_path.to_vec(), key.to_string());
    if !visiting.insert(cycle_key.clone()) {
        return Err(PreprocessError::new(
            PreprocessErrorKind::CircularReference,
            format!("circular reference through property '{}'", key),
        ));
    }

    let result = resolve_value(nodes, registry, block_path, current, visiting);
    visiting.remove(&cycle_key);

    let resolved = result?;
    if let Some(block) = block_at_path_mut(nodes, block_path) {
        block.properties.insert(key.to_string(), resolved.clone());
    }
    Ok(resolved)
}

fn resolve_value(
    nodes: &mut Vec<Node>,
    registry: &BlockRegistry,
    context: &[usize],
    value: Value,
    visiting: &mut HashSet<CycleKey>,
) -> Result<Value, PreprocessError> {
    match value {
        Value::Literal(_) => Ok(value),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_value(nodes, registry, context, item, visiting)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::Expression(expression) => {
            if expression.resolved {
                if let Some(cached) = expression.value {
                    return Ok(*cached);
                }
            }
            let mut resolver = RegistryResolver {
                nodes,
                registry,
                context: context.to_vec(),
                visiting,
            };
            // Deferred expressions had their scope variables substituted
            // at expansion time; the scope here is empty by design.
            evaluate(&expression, &Scope::new(), &mut resolver)
        }
        Value::Reference(reference) => {
            resolve_reference(nodes, registry, context, &reference, visiting)
        }
    }
}

/// Resolver hook handed to the expression evaluator during pass 2.
struct RegistryResolver<'a> {
    nodes: &'a mut Vec<Node>,
    registry: &'a BlockRegistry,
    context: Vec<usize>,
    visiting: &'a mut HashSet<CycleKey>,
}

impl ReferenceResolver for RegistryResolver<'_> {
    fn resolve(&mut self, reference: &Reference) -> Result<Value, PreprocessError> {
        resolve_reference(
            self.nodes,
            self.registry,
            &self.context,
            reference,
            self.visiting,
        )
    }
}

/// Resolve a `$`-reference: head to a block, then the member chain, with
/// lazy evaluation of referenced properties.
fn resolve_reference(
    nodes: &mut Vec<Node>,
    registry: &BlockRegistry,
    context: &[usize],
    reference: &Reference,
    visiting: &mut HashSet<CycleKey>,
) -> Result<Value, PreprocessError> {
    enum Target {
        Block(Vec<usize>),
        Val(Value),
    }

    let mut target = match &reference.head {
        RefHead::This => Target::Block(context.to_vec()),
        RefHead::Parent => {
            if context.len() <= 1 {
                return Err(PreprocessError::at(
                    PreprocessErrorKind::UnresolvedReference,
                    "'$parent' used at document root",
                    reference.location.clone(),
                ));
            }
            Target::Block(context[..context.len() - 1].to_vec())
        }
        RefHead::Id(id) => match registry.lookup(id) {
            Some(path) => Target::Block(path.to_vec()),
            None => {
                let mut error = PreprocessError::at(
                    PreprocessErrorKind::UnresolvedReference,
                    format!("no block with id '{}' in this file", id),
                    reference.location.clone(),
                );
                if let Some(near) = registry.suggest(id) {
                    error = error.with_suggestion(format!("did you mean '{}'?", near));
                }
                return Err(error);
            }
        },
    };

    for member in &reference.chain {
        target = match target {
            Target::Block(path) => {
                let has_property = block_at_path(nodes, &path)
                    .map(|block| block.properties.contains_key(member))
                    .unwrap_or(false);
                if !has_property {
                    return Err(PreprocessError::at(
                        PreprocessErrorKind::UnresolvedReference,
                        format!(
                            "referenced block has no property '{}' (in '{}')",
                            member,
                            reference.render()
                        ),
                        reference.location.clone(),
                    ));
                }
                Target::Val(resolve_property(nodes, registry, &path, member, visiting)?)
            }
            Target::Val(Value::Array(items)) => {
                if member == "length" {
                    Target::Val(Value::number(items.len() as f64))
                } else {
                    return Err(PreprocessError::at(
                        PreprocessErrorKind::Evaluation,
                        format!("arrays only expose 'length', not '{}'", member),
                        reference.location.clone(),
                    ));
                }
            }
            Target::Val(other) => {
                return Err(PreprocessError::at(
                    PreprocessErrorKind::Evaluation,
                    format!(
                        "cannot access '{}' on a {} (in '{}')",
                        member,
                        other.type_name(),
                        reference.render()
                    ),
                    reference.location.clone(),
                ));
            }
        };
    }

    match target {
        Target::Val(value) => Ok(value),
        Target::Block(_) => Err(PreprocessError::at(
            PreprocessErrorKind::Evaluation,
            format!(
                "reference '{}' selects a block; add a property access",
                reference.render()
            ),
            reference.location.clone(),
        )),
    }
}
