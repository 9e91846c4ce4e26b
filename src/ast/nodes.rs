//! Structural AST nodes: documents, blocks, tags, free-text, directives
//!
//! Nodes are created once by the parser and mutated only by the
//! preprocessor, and only on the fields designed for it (`properties`,
//! `children`, resolution state on values). Clones made during template
//! expansion are structural deep clones that keep source locations for
//! diagnostics.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::templates::TemplateNode;
use crate::ast::values::Value;
use crate::location::Location;

/// `@name` defines a reusable tag template; `#name` instantiates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagKind {
    Definition,
    Instance,
}

/// A sigil-prefixed label attached to a block or free-text node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub kind: TagKind,
    pub name: String,
    /// Optional `(Argument)`, an identifier.
    pub argument: Option<String>,
    /// Set on instances after a namespaced import (`#ns.name`).
    pub namespace: Option<String>,
    /// True once the tag processor has expanded this instance.
    #[serde(default)]
    pub resolved: bool,
    pub location: Location,
}

impl Tag {
    /// The registry key this tag registers or looks up: `name`,
    /// `name(Arg)`, optionally prefixed `ns.`.
    pub fn lookup_key(&self) -> String {
        let mut key = String::new();
        if let Some(ns) = &self.namespace {
            key.push_str(ns);
            key.push('.');
        }
        key.push_str(&self.name);
        if let Some(arg) = &self.argument {
            key.push('(');
            key.push_str(arg);
            key.push(')');
        }
        key
    }

    /// Render with the sigil, for messages.
    pub fn render(&self) -> String {
        let sigil = match self.kind {
            TagKind::Definition => '@',
            TagKind::Instance => '#',
        };
        format!("{}{}", sigil, self.lookup_key())
    }

    /// Tags are "the same" for free-text merging when name, argument,
    /// and namespace all match (kind is always Instance there).
    pub fn same_shape(&self, other: &Tag) -> bool {
        self.name == other.name
            && self.argument == other.argument
            && self.namespace == other.namespace
    }
}

/// A bracket-delimited record: optional id, tags, ordered properties,
/// and mixed children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub id: Option<String>,
    pub tags: Vec<Tag>,
    /// Insertion order is preserved end-to-end.
    pub properties: IndexMap<String, Value>,
    pub children: Vec<Node>,
    pub location: Location,
}

impl BlockNode {
    pub fn new(id: Option<String>, location: Location) -> Self {
        Self {
            id,
            tags: Vec::new(),
            properties: IndexMap::new(),
            children: Vec::new(),
            location,
        }
    }

    pub fn tag_named(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    /// Child blocks only, skipping free-text and unexpanded nodes.
    pub fn child_blocks(&self) -> impl Iterator<Item = &BlockNode> {
        self.children.iter().filter_map(|node| match node {
            Node::Block(block) => Some(block),
            _ => None,
        })
    }
}

/// Pre-dedent free-text source, kept for tooling and merge suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeTextRaw {
    pub text: String,
    pub delim_len: usize,
}

/// A backtick-delimited literal string child. Free-text nodes have no
/// children and cannot be parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeTextNode {
    /// Content after dedent (and merging, where enabled).
    pub value: String,
    pub tags: Vec<Tag>,
    pub raw: Option<FreeTextRaw>,
    pub location: Location,
    /// End of the span; differs from `location` for merged nodes.
    pub end: Location,
}

impl FreeTextNode {
    pub fn new(value: String, tags: Vec<Tag>, location: Location) -> Self {
        let end = location.clone();
        Self {
            value,
            tags,
            raw: None,
            location,
            end,
        }
    }

    /// Tag-list equality used by the merge rule: same names, arguments,
    /// and namespaces, in order.
    pub fn same_tags(&self, other: &FreeTextNode) -> bool {
        self.tags.len() == other.tags.len()
            && self
                .tags
                .iter()
                .zip(other.tags.iter())
                .all(|(a, b)| a.same_shape(b))
    }
}

/// `<import "path" as alias>` - top level only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDirective {
    pub path: String,
    pub alias: Option<String>,
    pub location: Location,
}

/// `<inject "path">` - top level or direct block child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectDirective {
    pub path: String,
    pub location: Location,
}

/// A top-level inject plus its anchor among the document's nodes, so
/// splicing preserves sibling order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLevelInject {
    pub directive: InjectDirective,
    /// Index into `Document::nodes` before which the injected blocks
    /// are spliced.
    pub anchor: usize,
}

/// Anything that can appear in block-child (or top-level) position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Block(BlockNode),
    FreeText(FreeTextNode),
    Template(TemplateNode),
    /// Block-position inject, kept inline to preserve ordering.
    Inject(InjectDirective),
}

impl Node {
    pub fn location(&self) -> &Location {
        match self {
            Node::Block(block) => &block.location,
            Node::FreeText(text) => &text.location,
            Node::Template(template) => template.location(),
            Node::Inject(inject) => &inject.location,
        }
    }

    pub fn as_block(&self) -> Option<&BlockNode> {
        match self {
            Node::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockNode> {
        match self {
            Node::Block(block) => Some(block),
            _ => None,
        }
    }
}

/// A parsed OX file: import directives, top-level injects (anchored),
/// and the ordered node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source_path: Option<String>,
    pub imports: Vec<ImportDirective>,
    pub injects: Vec<TopLevelInject>,
    pub nodes: Vec<Node>,
    pub location: Location,
}

impl Document {
    pub fn new(source_path: Option<String>) -> Self {
        let location = Location {
            file: source_path.clone(),
            line: 1,
            column: 1,
        };
        Self {
            source_path,
            imports: Vec::new(),
            injects: Vec::new(),
            nodes: Vec::new(),
            location,
        }
    }

    /// Top-level blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &BlockNode> {
        self.nodes.iter().filter_map(Node::as_block)
    }

    /// True when no template, expression, or unresolved reference
    /// remains anywhere in the tree - the postcondition of a successful
    /// preprocess run.
    pub fn is_fully_evaluated(&self) -> bool {
        fn value_done(value: &Value) -> bool {
            value.is_pure_data()
        }
        fn node_done(node: &Node) -> bool {
            match node {
                Node::Block(block) => {
                    block.properties.values().all(value_done)
                        && block.children.iter().all(node_done)
                }
                Node::FreeText(_) => true,
                Node::Template(_) | Node::Inject(_) => false,
            }
        }
        self.injects.is_empty() && self.nodes.iter().all(node_done)
    }
}
