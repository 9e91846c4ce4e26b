//! The OX AST
//!
//! A closed set of tagged variants: documents own nodes, nodes are
//! blocks, free-text, template directives, or inline injects, and
//! property values are literals, arrays, deferred expressions, or
//! `$`-references. Every node carries a `Location`.

pub mod nodes;
pub mod templates;
pub mod values;
pub mod walk;

pub use nodes::{
    BlockNode, Document, FreeTextNode, FreeTextRaw, ImportDirective, InjectDirective, Node, Tag,
    TagKind, TopLevelInject,
};
pub use templates::{
    ElseifBranch, ForeachTemplate, IfTemplate, OnDataTemplate, SetTemplate, TemplateNode,
    WhileTemplate,
};
pub use values::{format_number, value_from_json, ExprOp, ExprToken, Expression, Literal, RefHead, Reference, Value};
pub use walk::{
    ancestors, block_at_path, block_at_path_mut, find_all, find_block_by_id,
    find_blocks_by_property, find_blocks_by_tag, find_first, node_at_path, node_at_path_mut,
    walk, walk_mut, VisitControl, WalkOrder,
};
