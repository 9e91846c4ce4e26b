//! Tag registry and processor
//!
//! The registry holds two tables. Capabilities describe what a tag name
//! may do (reuse, output, children, attribute schema, module getters)
//! and are registered by the host before parsing. Definitions are
//! collected from `@tag` blocks and keyed `name`, `name(Arg)`, or
//! `ns.name(Arg)` for namespaced imports.
//!
//! Processing expands every `#tag` instance by deep-cloning its
//! definition template, merging properties (instance overrides
//! definition), and splicing children according to the capability.
//! Module property injection then runs as its own pass: getter results
//! are wrapped as literals (objects become JSON strings) and appended to
//! block properties, and a source property shadowing a module name is a
//! `ModulePropertyConflict`.

use std::collections::HashMap;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::ast::nodes::{BlockNode, Document, Node, TagKind};
use crate::ast::templates::TemplateNode;
use crate::ast::values::{value_from_json, Value};
use crate::errors::{Diagnostics, PreprocessError, PreprocessErrorKind, Warning};
use crate::location::Location;

fn ident_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Attribute types a tag descriptor can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Number,
    Boolean,
    Array,
    Any,
}

impl AttrType {
    fn matches(self, value: &Value) -> bool {
        match self {
            AttrType::Any => true,
            AttrType::String => value.as_str().is_some(),
            AttrType::Number => value.as_number().is_some(),
            AttrType::Boolean => matches!(
                value,
                Value::Literal(crate::ast::values::Literal::Bool(_))
            ),
            AttrType::Array => value.as_array().is_some(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Number => "number",
            AttrType::Boolean => "boolean",
            AttrType::Array => "array",
            AttrType::Any => "any",
        }
    }
}

/// One attribute in a tag descriptor.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: String,
    pub attr_type: AttrType,
    pub required: bool,
}

/// Attribute schema validated on expanded instances.
#[derive(Debug, Clone, Default)]
pub struct TagDescriptor {
    pub attributes: Vec<AttributeSpec>,
}

/// Host-supplied getter backing one module property.
pub type ModuleGetter = Box<dyn Fn(&BlockNode) -> serde_json::Value + Send + Sync>;

/// What a tag name is allowed to do.
pub struct TagCapability {
    /// May the definition be instantiated more than once?
    pub can_reuse: bool,
    /// Does the definition block itself stay in the output?
    pub can_output: bool,
    /// Do instance children append after the definition's children?
    /// When false, the definition's children replace the instance's.
    pub accept_children: bool,
    pub descriptor: TagDescriptor,
    /// Module properties injected into every tagged block, in
    /// registration order.
    pub module: IndexMap<String, ModuleGetter>,
}

impl Default for TagCapability {
    fn default() -> Self {
        Self {
            can_reuse: true,
            can_output: false,
            accept_children: true,
            descriptor: TagDescriptor::default(),
            module: IndexMap::new(),
        }
    }
}

impl std::fmt::Debug for TagCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCapability")
            .field("can_reuse", &self.can_reuse)
            .field("can_output", &self.can_output)
            .field("accept_children", &self.accept_children)
            .field("descriptor", &self.descriptor)
            .field("module", &self.module.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TagCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(
        mut self,
        name: impl Into<String>,
        getter: impl Fn(&BlockNode) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.module.insert(name.into(), Box::new(getter));
        self
    }
}

/// A registered `@tag` definition.
#[derive(Debug, Clone)]
pub struct TagDefinition {
    pub template: BlockNode,
    pub namespace: Option<String>,
    /// Set once a non-reusable definition has been instantiated.
    pub used: bool,
}

/// Both registry tables. Owned by the host and passed in; never a
/// process-wide singleton.
#[derive(Debug, Default)]
pub struct TagRegistry {
    capabilities: HashMap<String, TagCapability>,
    definitions: HashMap<String, TagDefinition>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry sharing a capability table but starting with no
    /// definitions. Injected files are evaluated against one of these:
    /// capabilities are host configuration, definitions are file scope.
    pub fn with_capabilities(capabilities: HashMap<String, TagCapability>) -> Self {
        Self {
            capabilities,
            definitions: HashMap::new(),
        }
    }

    /// Move the capability table out, leaving this registry without
    /// one. Paired with `with_capabilities` to thread the host's
    /// capabilities through isolated inject evaluations.
    pub fn take_capabilities(&mut self) -> HashMap<String, TagCapability> {
        std::mem::take(&mut self.capabilities)
    }

    /// Put a capability table taken with `take_capabilities` back.
    pub fn restore_capabilities(&mut self, capabilities: HashMap<String, TagCapability>) {
        self.capabilities = capabilities;
    }

    pub fn register_capability(&mut self, name: impl Into<String>, capability: TagCapability) {
        self.capabilities.insert(name.into(), capability);
    }

    pub fn capability(&self, name: &str) -> Option<&TagCapability> {
        self.capabilities.get(name)
    }

    pub fn definition(&self, key: &str) -> Option<&TagDefinition> {
        self.definitions.get(key)
    }

    pub fn definition_keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Register a definition found in the file being processed.
    /// Duplicates keep the first registration and report an error.
    pub fn define_local(
        &mut self,
        key: String,
        template: BlockNode,
        location: &Location,
        diagnostics: &mut Diagnostics,
    ) {
        if self.definitions.contains_key(&key) {
            diagnostics.error(PreprocessError::at(
                PreprocessErrorKind::DuplicateTagDefinition,
                format!("duplicate tag definition '@{}'", key),
                location.clone(),
            ));
            return;
        }
        self.definitions.insert(
            key,
            TagDefinition {
                template,
                namespace: None,
                used: false,
            },
        );
    }

    /// Merge a definition extracted from an imported file. Namespaced
    /// collisions are hard errors; non-namespaced imports are
    /// last-writer-wins with a warning.
    pub fn merge_imported(
        &mut self,
        key: String,
        definition: TagDefinition,
        location: &Location,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), PreprocessError> {
        if self.definitions.contains_key(&key) {
            if definition.namespace.is_some() {
                return Err(PreprocessError::at(
                    PreprocessErrorKind::DuplicateTagDefinition,
                    format!("conflicting definition '@{}' within one namespace", key),
                    location.clone(),
                ));
            }
            diagnostics.warn(Warning::at(
                format!("imported tag definition '@{}' overrides an earlier one", key),
                location.clone(),
            ));
        }
        self.definitions.insert(key, definition);
        Ok(())
    }

    fn suggest_definition(&self, key: &str) -> Option<&str> {
        let lowered = key.to_lowercase();
        self.definitions
            .keys()
            .find(|known| known.to_lowercase() == lowered)
            .map(String::as_str)
    }
}

/// Run the full tag stage on one file: collect and strip definitions,
/// expand instances, then inject module properties.
pub fn process_document(
    document: &mut Document,
    registry: &mut TagRegistry,
    diagnostics: &mut Diagnostics,
) -> Result<(), PreprocessError> {
    collect_definitions(&mut document.nodes, registry, diagnostics);
    let mut stack = Vec::new();
    expand_instances_in_nodes(&mut document.nodes, registry, &mut stack, diagnostics)?;
    inject_module_properties_in_nodes(&mut document.nodes, registry, diagnostics);
    tracing::debug!(
        definitions = registry.definitions.len(),
        "tag processing complete"
    );
    Ok(())
}

/// Walk every child list, including template bodies, registering
/// `@tag` blocks as templates and removing them from the tree unless
/// their capability keeps them in the output.
fn collect_definitions(
    nodes: &mut Vec<Node>,
    registry: &mut TagRegistry,
    diagnostics: &mut Diagnostics,
) {
    let mut index = 0;
    while index < nodes.len() {
        let remove = match &mut nodes[index] {
            Node::Block(block) => {
                collect_definitions(&mut block.children, registry, diagnostics);
                register_block_definitions(block, registry, diagnostics)
            }
            Node::Template(template) => {
                for child_list in template_child_lists(template) {
                    collect_definitions(child_list, registry, diagnostics);
                }
                false
            }
            _ => false,
        };
        if remove {
            nodes.remove(index);
        } else {
            index += 1;
        }
    }
}

/// Register a block's definition tags. Returns true when the block
/// should be removed from the tree.
fn register_block_definitions(
    block: &mut BlockNode,
    registry: &mut TagRegistry,
    diagnostics: &mut Diagnostics,
) -> bool {
    if !block.tags.iter().any(|t| t.kind == TagKind::Definition) {
        return false;
    }

    let mut keep_in_output = false;
    let definition_tags: Vec<_> = block
        .tags
        .iter()
        .filter(|t| t.kind == TagKind::Definition)
        .cloned()
        .collect();

    // The stored template is the block minus its definition tags.
    let mut template = block.clone();
    template.tags.retain(|t| t.kind != TagKind::Definition);

    for tag in &definition_tags {
        if let Some(argument) = &tag.argument {
            if !ident_pattern().is_match(argument) {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::InvalidTagArgument,
                    format!("tag argument '{}' is not a valid identifier", argument),
                    tag.location.clone(),
                ));
                continue;
            }
        }
        registry.define_local(tag.lookup_key(), template.clone(), &tag.location, diagnostics);

        let can_output = registry
            .capability(&tag.name)
            .map(|c| c.can_output)
            .unwrap_or(false);
        keep_in_output = keep_in_output || can_output;
    }

    if keep_in_output {
        block.tags.retain(|t| t.kind != TagKind::Definition);
        false
    } else {
        true
    }
}

fn expand_instances_in_nodes(
    nodes: &mut Vec<Node>,
    registry: &mut TagRegistry,
    stack: &mut Vec<String>,
    diagnostics: &mut Diagnostics,
) -> Result<(), PreprocessError> {
    for node in nodes.iter_mut() {
        match node {
            Node::Block(block) => {
                expand_instances_in_block(block, registry, stack, diagnostics)?;
            }
            Node::Template(template) => {
                for child_list in template_child_lists(template) {
                    expand_instances_in_nodes(child_list, registry, stack, diagnostics)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn expand_instances_in_block(
    block: &mut BlockNode,
    registry: &mut TagRegistry,
    stack: &mut Vec<String>,
    diagnostics: &mut Diagnostics,
) -> Result<(), PreprocessError> {
    let mut tag_index = 0;
    while tag_index < block.tags.len() {
        let tag = block.tags[tag_index].clone();
        tag_index += 1;
        if tag.kind != TagKind::Instance || tag.resolved {
            continue;
        }
        // Mark up front so a failed expansion is not retried.
        block.tags[tag_index - 1].resolved = true;

        if let Some(argument) = &tag.argument {
            if !ident_pattern().is_match(argument) {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::InvalidTagArgument,
                    format!("tag argument '{}' is not a valid identifier", argument),
                    tag.location.clone(),
                ));
                continue;
            }
        }

        let key = tag.lookup_key();

        let (accept_children, can_reuse) = match registry.capability(&tag.name) {
            Some(capability) => (capability.accept_children, capability.can_reuse),
            None => {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::UnresolvedTagInstance,
                    format!("no capability registered for tag '{}'", tag.name),
                    tag.location.clone(),
                ));
                continue;
            }
        };

        let template = match registry.definitions.get_mut(&key) {
            Some(definition) => {
                if !can_reuse && definition.used {
                    diagnostics.error(
                        PreprocessError::at(
                            PreprocessErrorKind::UnresolvedTagInstance,
                            format!("tag definition '@{}' was already consumed", key),
                            tag.location.clone(),
                        )
                        .with_suggestion("the capability does not allow reuse"),
                    );
                    continue;
                }
                definition.used = true;
                definition.template.clone()
            }
            None => {
                let mut error = PreprocessError::at(
                    PreprocessErrorKind::UnresolvedTagInstance,
                    format!("no definition registered for '#{}'", key),
                    tag.location.clone(),
                );
                if let Some(near) = registry.suggest_definition(&key) {
                    error = error.with_suggestion(format!("did you mean '#{}'?", near));
                }
                diagnostics.error(error);
                continue;
            }
        };

        if stack.contains(&key) {
            let mut cycle: Vec<&str> = stack.iter().map(String::as_str).collect();
            cycle.push(&key);
            return Err(PreprocessError::at(
                PreprocessErrorKind::CircularReference,
                format!("tag definition cycle: {}", cycle.join(" -> ")),
                tag.location.clone(),
            ));
        }
        stack.push(key.clone());
        let mut template = template;
        expand_instances_in_block(&mut template, registry, stack, diagnostics)?;
        stack.pop();

        merge_instance(block, template, accept_children);
        validate_descriptor(block, registry, &tag.name, &tag.location, diagnostics);
    }

    expand_instances_in_nodes(&mut block.children, registry, stack, diagnostics)
}

/// Merge a cloned definition template into an instance block: the
/// instance's id and property values win, the definition's property
/// order is kept, and children follow the capability's splice rule.
fn merge_instance(block: &mut BlockNode, template: BlockNode, accept_children: bool) {
    if block.id.is_none() {
        block.id = template.id;
    }

    let mut properties = template.properties;
    for (key, value) in block.properties.drain(..) {
        properties.insert(key, value);
    }
    block.properties = properties;

    if accept_children {
        let mut children = template.children;
        children.append(&mut block.children);
        block.children = children;
    } else {
        block.children = template.children;
    }

    block.tags.extend(template.tags);
}

fn validate_descriptor(
    block: &BlockNode,
    registry: &TagRegistry,
    tag_name: &str,
    location: &Location,
    diagnostics: &mut Diagnostics,
) {
    let descriptor = match registry.capability(tag_name) {
        Some(capability) => &capability.descriptor,
        None => return,
    };

    for attribute in &descriptor.attributes {
        match block.properties.get(&attribute.name) {
            None if attribute.required => {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::Evaluation,
                    format!(
                        "tag '{}' requires attribute '{}'",
                        tag_name, attribute.name
                    ),
                    location.clone(),
                ));
            }
            Some(value) if value.is_pure_data() && !attribute.attr_type.matches(value) => {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::Evaluation,
                    format!(
                        "attribute '{}' of tag '{}' must be a {}, found {}",
                        attribute.name,
                        tag_name,
                        attribute.attr_type.name(),
                        value.type_name()
                    ),
                    location.clone(),
                ));
            }
            _ => {}
        }
    }
}

fn inject_module_properties_in_nodes(
    nodes: &mut Vec<Node>,
    registry: &TagRegistry,
    diagnostics: &mut Diagnostics,
) {
    for node in nodes.iter_mut() {
        match node {
            Node::Block(block) => {
                inject_module_properties(block, registry, diagnostics);
                inject_module_properties_in_nodes(&mut block.children, registry, diagnostics);
            }
            Node::Template(template) => {
                for child_list in template_child_lists(template) {
                    inject_module_properties_in_nodes(child_list, registry, diagnostics);
                }
            }
            _ => {}
        }
    }
}

/// Inject module properties for every tag on the block, in tag order
/// and module registration order. Module values cannot be overridden
/// from OX source.
fn inject_module_properties(
    block: &mut BlockNode,
    registry: &TagRegistry,
    diagnostics: &mut Diagnostics,
) {
    let mut injected: Vec<(String, Value)> = Vec::new();
    for tag in &block.tags {
        let capability = match registry.capability(&tag.name) {
            Some(capability) => capability,
            None => continue,
        };
        for (name, getter) in &capability.module {
            if block.properties.contains_key(name) {
                diagnostics.error(PreprocessError::at(
                    PreprocessErrorKind::ModulePropertyConflict,
                    format!(
                        "property '{}' conflicts with a module property of tag '{}'",
                        name, tag.name
                    ),
                    block.location.clone(),
                ));
                continue;
            }
            injected.push((name.clone(), value_from_json(&getter(block))));
        }
    }
    for (name, value) in injected {
        block.properties.insert(name, value);
    }
}

/// The child lists owned by a template variant, for passes that must
/// reach blocks inside unexpanded bodies.
pub fn template_child_lists(template: &mut TemplateNode) -> Vec<&mut Vec<Node>> {
    match template {
        TemplateNode::Set(_) => Vec::new(),
        TemplateNode::If(t) => {
            let mut lists = vec![&mut t.children];
            for branch in &mut t.elseifs {
                lists.push(&mut branch.children);
            }
            if let Some(else_children) = &mut t.else_children {
                lists.push(else_children);
            }
            lists
        }
        TemplateNode::Foreach(t) => vec![&mut t.children],
        TemplateNode::While(t) => vec![&mut t.children],
        TemplateNode::OnData(t) => {
            let mut lists = vec![&mut t.children];
            if let Some(error_children) = &mut t.error_children {
                lists.push(error_children);
            }
            lists
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn doc(source: &str) -> Document {
        parse(tokenize(source).unwrap(), None).unwrap()
    }

    fn registry_with(names: &[&str]) -> TagRegistry {
        let mut registry = TagRegistry::new();
        for name in names {
            registry.register_capability(*name, TagCapability::new());
        }
        registry
    }

    fn process(source: &str, registry: &mut TagRegistry) -> (Document, Diagnostics) {
        let mut document = doc(source);
        let mut diagnostics = Diagnostics::new();
        process_document(&mut document, registry, &mut diagnostics).unwrap();
        (document, diagnostics)
    }

    #[test]
    fn definition_registers_and_is_removed() {
        let mut registry = registry_with(&["card"]);
        let (document, diagnostics) = process("@card [CardBase (width: 100)] [App]", &mut registry);
        assert!(!diagnostics.has_errors());
        assert!(registry.definition("card").is_some());
        assert_eq!(document.nodes.len(), 1);
    }

    #[test]
    fn can_output_keeps_definition_block() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "card",
            TagCapability {
                can_output: true,
                ..TagCapability::new()
            },
        );
        let (document, _) = process("@card [CardBase]", &mut registry);
        assert_eq!(document.nodes.len(), 1);
        let block = document.blocks().next().unwrap();
        assert!(block.tags.is_empty());
    }

    #[test]
    fn instance_expands_with_property_merge() {
        let mut registry = registry_with(&["card"]);
        let (document, diagnostics) = process(
            "@card [CardBase (width: 100, color: \"blue\")] #card [Mine (width: 250)]",
            &mut registry,
        );
        assert!(!diagnostics.has_errors());
        let block = document.blocks().next().unwrap();
        assert_eq!(block.id.as_deref(), Some("Mine"));
        // Definition order first, instance value wins.
        let keys: Vec<_> = block.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["width", "color"]);
        assert_eq!(block.properties.get("width"), Some(&Value::number(250.0)));
        assert_eq!(block.properties.get("color"), Some(&Value::string("blue")));
        assert!(block.tags[0].resolved);
    }

    #[test]
    fn tag_argument_selects_definition() {
        let mut registry = registry_with(&["component"]);
        let (document, diagnostics) = process(
            "@component(Button) [Button (width: 100)]\
             @component(Label) [Label (width: 50)]\
             #component(Button) [MyBtn]",
            &mut registry,
        );
        assert!(!diagnostics.has_errors());
        let block = document.blocks().next().unwrap();
        assert_eq!(block.id.as_deref(), Some("MyBtn"));
        assert_eq!(block.properties.get("width"), Some(&Value::number(100.0)));
    }

    #[test]
    fn accept_children_appends_instance_children() {
        let mut registry = registry_with(&["wrap"]);
        let (document, _) = process(
            "@wrap [W [Header]] #wrap [Mine [Body]]",
            &mut registry,
        );
        let block = document.blocks().next().unwrap();
        let ids: Vec<_> = block
            .child_blocks()
            .map(|b| b.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["Header", "Body"]);
    }

    #[test]
    fn children_replaced_when_not_accepted() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "wrap",
            TagCapability {
                accept_children: false,
                ..TagCapability::new()
            },
        );
        let (document, _) = process("@wrap [W [Header]] #wrap [Mine [Body]]", &mut registry);
        let block = document.blocks().next().unwrap();
        let ids: Vec<_> = block
            .child_blocks()
            .map(|b| b.id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["Header"]);
    }

    #[test]
    fn unresolved_instance_reported() {
        let mut registry = registry_with(&["card"]);
        let (_, diagnostics) = process("#card [Mine]", &mut registry);
        assert_eq!(diagnostics.errors.len(), 1);
        assert_eq!(
            diagnostics.errors[0].kind,
            PreprocessErrorKind::UnresolvedTagInstance
        );
    }

    #[test]
    fn missing_capability_reported() {
        let mut registry = TagRegistry::new();
        let (_, diagnostics) = process("@card [Base] #card [Mine]", &mut registry);
        assert!(diagnostics
            .errors
            .iter()
            .any(|e| e.message.contains("no capability")));
    }

    #[test]
    fn duplicate_definition_reported() {
        let mut registry = registry_with(&["card"]);
        let (_, diagnostics) = process("@card [A] @card [B]", &mut registry);
        assert_eq!(
            diagnostics.errors[0].kind,
            PreprocessErrorKind::DuplicateTagDefinition
        );
    }

    #[test]
    fn invalid_tag_argument_reported() {
        let mut registry = registry_with(&["card"]);
        let (_, diagnostics) = process("@card(123) [A]", &mut registry);
        assert_eq!(
            diagnostics.errors[0].kind,
            PreprocessErrorKind::InvalidTagArgument
        );
    }

    #[test]
    fn single_use_definition_cannot_be_reused() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "once",
            TagCapability {
                can_reuse: false,
                ..TagCapability::new()
            },
        );
        let (_, diagnostics) = process(
            "@once [Base] #once [First] #once [Second]",
            &mut registry,
        );
        assert_eq!(diagnostics.errors.len(), 1);
        assert!(diagnostics.errors[0].message.contains("consumed"));
    }

    #[test]
    fn nested_definition_expansion() {
        let mut registry = registry_with(&["outer", "inner"]);
        let (document, diagnostics) = process(
            "@inner [I (depth: 2)] @outer [O [#inner [Child]]] #outer [Mine]",
            &mut registry,
        );
        assert!(!diagnostics.has_errors());
        let block = document.blocks().next().unwrap();
        let child = block.child_blocks().next().unwrap();
        assert_eq!(child.properties.get("depth"), Some(&Value::number(2.0)));
    }

    #[test]
    fn definition_cycle_detected() {
        let mut registry = registry_with(&["a", "b"]);
        let mut document = doc("@a [A [#b [X]]] @b [B [#a [Y]]] #a [Go]");
        let mut diagnostics = Diagnostics::new();
        let error =
            process_document(&mut document, &mut registry, &mut diagnostics).unwrap_err();
        assert_eq!(error.kind, PreprocessErrorKind::CircularReference);
        assert!(error.message.contains("cycle"));
    }

    #[test]
    fn module_properties_injected() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "entity",
            TagCapability::new()
                .with_module("kind", |_| serde_json::json!("entity"))
                .with_module("meta", |_| serde_json::json!({"version": 2})),
        );
        let (document, diagnostics) =
            process("@entity [Base] #entity [Mine (own: 1)]", &mut registry);
        assert!(!diagnostics.has_errors());
        let block = document.blocks().next().unwrap();
        let keys: Vec<_> = block.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["own", "kind", "meta"]);
        assert_eq!(block.properties.get("kind"), Some(&Value::string("entity")));
        assert_eq!(
            block.properties.get("meta"),
            Some(&Value::string("{\"version\":2}"))
        );
    }

    #[test]
    fn module_property_conflict_reported() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "entity",
            TagCapability::new().with_module("kind", |_| serde_json::json!("entity")),
        );
        let (_, diagnostics) =
            process("@entity [Base] #entity [Mine (kind: \"mine\")]", &mut registry);
        assert_eq!(
            diagnostics.errors[0].kind,
            PreprocessErrorKind::ModulePropertyConflict
        );
    }

    #[test]
    fn required_attribute_validated() {
        let mut registry = TagRegistry::new();
        registry.register_capability(
            "card",
            TagCapability {
                descriptor: TagDescriptor {
                    attributes: vec![AttributeSpec {
                        name: "title".to_string(),
                        attr_type: AttrType::String,
                        required: true,
                    }],
                },
                ..TagCapability::new()
            },
        );
        let (_, diagnostics) = process("@card [Base] #card [Mine]", &mut registry);
        assert!(diagnostics
            .errors
            .iter()
            .any(|e| e.message.contains("requires attribute 'title'")));
    }
}
