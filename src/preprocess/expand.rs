//! Template expansion
//!
//! Executes `set`, `if`/`elseif`/`else`, `foreach`, `while`, and
//! `on-data` in a single traversal, inside-out. Block properties are
//! evaluated as blocks are visited: expressions without `$`-references
//! evaluate against the live scope; expressions carrying references get
//! their scope variables substituted in and are deferred to pass 2,
//! since references only resolve once the whole file is expanded.
//!
//! Free-text and inline inject placeholders pass through every branch
//! untouched, including `foreach` iterations and `if` arms; dropping
//! unrecognized node kinds here is the classic bug this module is
//! structured to prevent.

use crate::ast::nodes::{Document, Node};
use crate::ast::templates::{
    ForeachTemplate, IfTemplate, OnDataTemplate, SetTemplate, TemplateNode, WhileTemplate,
};
use crate::ast::values::Value;
use crate::errors::{Diagnostics, PreprocessError, PreprocessErrorKind, Warning};
use crate::preprocess::data::ProviderRegistry;
use crate::preprocess::expr::{evaluate, substitute_scope_vars, NoReferences};
use crate::preprocess::macros::{MacroContext, WalkCursor};
use crate::preprocess::scope::Scope;

/// Default scope-variable name an `on-data` value is bound to.
const DEFAULT_DATA_BINDING: &str = "data";

/// Expand every template in the document. Structural failures (macro
/// aborts) short-circuit; evaluation failures are collected, or
/// downgraded to warnings with null substitutes in lenient mode.
pub fn expand_document(
    document: &mut Document,
    providers: &ProviderRegistry,
    macros: Option<&mut MacroContext>,
    diagnostics: &mut Diagnostics,
    lenient: bool,
) -> Result<(), PreprocessError> {
    let mut expander = Expander {
        scope: Scope::new(),
        providers,
        macros,
        diagnostics,
        lenient,
        parents: Vec::new(),
    };
    let nodes = std::mem::take(&mut document.nodes);
    document.nodes = expander.expand_nodes(nodes)?;
    tracing::debug!("template expansion complete");
    Ok(())
}

struct Expander<'a> {
    scope: Scope,
    providers: &'a ProviderRegistry,
    macros: Option<&'a mut MacroContext>,
    diagnostics: &'a mut Diagnostics,
    lenient: bool,
    /// Ids of enclosing blocks, for the walk cursor.
    parents: Vec<Option<String>>,
}

impl Expander<'_> {
    fn expand_nodes(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, PreprocessError> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Template(template) => self.expand_template(template, &mut out)?,
                Node::Block(block) => {
                    let block = self.expand_block(block)?;
                    out.push(Node::Block(block));
                }
                // Free-text survives every template branch unchanged.
                Node::FreeText(text) => out.push(Node::FreeText(text)),
                // Inject placeholders are spliced by the project layer
                // after resolution; expansion passes them through.
                Node::Inject(inject) => out.push(Node::Inject(inject)),
            }
        }
        Ok(out)
    }

    fn expand_template(
        &mut self,
        template: TemplateNode,
        out: &mut Vec<Node>,
    ) -> Result<(), PreprocessError> {
        match template {
            TemplateNode::Set(set) => self.expand_set(set),
            TemplateNode::If(template) => self.expand_if(template, out),
            TemplateNode::Foreach(template) => self.expand_foreach(template, out),
            TemplateNode::While(template) => self.expand_while(template, out),
            TemplateNode::OnData(template) => self.expand_on_data(template, out),
        }
    }

    fn expand_set(&mut self, set: SetTemplate) -> Result<(), PreprocessError> {
        let value = match evaluate(&set.expression, &self.scope, &mut NoReferences) {
            Ok(value) => value,
            Err(error) => {
                self.report(error);
                Value::null()
            }
        };
        self.scope.define(set.name, value);
        Ok(())
    }

    fn expand_if(
        &mut self,
        template: IfTemplate,
        out: &mut Vec<Node>,
    ) -> Result<(), PreprocessError> {
        // Conditions evaluate top to bottom; the first truthy branch
        // wins and the rest are never evaluated.
        let branch = match self.eval_condition(&template.condition) {
            Some(true) => Some(template.children),
            Some(false) => {
                let mut chosen = None;
                for elseif in template.elseifs {
                    match self.eval_condition(&elseif.condition) {
                        Some(true) => {
                            chosen = Some(elseif.children);
                            break;
                        }
                        Some(false) => continue,
                        None => return Ok(()),
                    }
                }
                match chosen {
                    Some(children) => Some(children),
                    None => template.else_children,
                }
            }
            None => return Ok(()),
        };

        if let Some(children) = branch {
            let expanded = self.expand_nodes(children)?;
            out.extend(expanded);
        }
        Ok(())
    }

    /// Evaluate a directive condition; `None` means the evaluation
    /// failed and was already reported.
    fn eval_condition(&mut self, condition: &crate::ast::values::Expression) -> Option<bool> {
        match evaluate(condition, &self.scope, &mut NoReferences) {
            Ok(value) => Some(value.is_truthy()),
            Err(error) => {
                self.report(error);
                None
            }
        }
    }

    fn expand_foreach(
        &mut self,
        template: ForeachTemplate,
        out: &mut Vec<Node>,
    ) -> Result<(), PreprocessError> {
        let iterable = match evaluate(&template.iterable, &self.scope, &mut NoReferences) {
            Ok(value) => value,
            Err(error) => {
                self.report(error);
                return Ok(());
            }
        };
        let items = match iterable {
            Value::Array(items) => items,
            other => {
                self.report(PreprocessError::at(
                    PreprocessErrorKind::Evaluation,
                    format!("foreach iterable must be an array, found {}", other.type_name()),
                    template.location.clone(),
                ));
                return Ok(());
            }
        };

        for (index, item) in items.into_iter().enumerate() {
            self.scope.push_frame();
            self.scope.define(template.loop_var.clone(), item);
            if let Some(index_var) = &template.index_var {
                self.scope.define(index_var.clone(), Value::number(index as f64));
            }
            let expanded = self.expand_nodes(template.children.clone());
            self.scope.pop_frame();
            out.extend(expanded?);
        }
        Ok(())
    }

    fn expand_while(
        &mut self,
        template: WhileTemplate,
        out: &mut Vec<Node>,
    ) -> Result<(), PreprocessError> {
        let mut iterations = 0usize;
        loop {
            match self.eval_condition(&template.condition) {
                Some(true) => {}
                Some(false) | None => break,
            }
            if iterations >= template.max_iterations {
                self.report(PreprocessError::at(
                    PreprocessErrorKind::WhileLimit,
                    format!(
                        "while loop exceeded {} iterations",
                        template.max_iterations
                    ),
                    template.location.clone(),
                ));
                break;
            }
            iterations += 1;
            let expanded = self.expand_nodes(template.children.clone())?;
            out.extend(expanded);
        }
        Ok(())
    }

    fn expand_on_data(
        &mut self,
        template: OnDataTemplate,
        out: &mut Vec<Node>,
    ) -> Result<(), PreprocessError> {
        // Provider properties must be pure data before the fetch.
        let mut properties = template.properties;
        for value in properties.values_mut() {
            let owned = std::mem::replace(value, Value::null());
            *value = self.eval_property_value(owned);
        }

        let binding = properties
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DATA_BINDING)
            .to_string();

        match self
            .providers
            .fetch(&template.provider, &properties, &self.scope, &template.location)
        {
            Ok(value) => {
                self.scope.push_frame();
                self.scope.define(binding, value);
                let expanded = self.expand_nodes(template.children);
                self.scope.pop_frame();
                out.extend(expanded?);
            }
            Err(error) => match template.error_children {
                Some(children) => {
                    let expanded = self.expand_nodes(children)?;
                    out.extend(expanded);
                }
                None => self.report(error),
            },
        }
        Ok(())
    }

    fn expand_block(
        &mut self,
        mut block: crate::ast::nodes::BlockNode,
    ) -> Result<crate::ast::nodes::BlockNode, PreprocessError> {
        // Own properties first: the macro hook must see them evaluated.
        // In-place replacement keeps the insertion order untouched.
        for value in block.properties.values_mut() {
            let owned = std::mem::replace(value, Value::null());
            *value = self.eval_property_value(owned);
        }

        // Macro walk hook, between own-property evaluation and child
        // evaluation.
        let mut requested: Vec<usize> = Vec::new();
        let parent_id = self.parents.last().cloned().flatten();
        if let Some(context) = self.macros.as_deref_mut() {
            let mut cursor =
                WalkCursor::new(block.children.len(), parent_id, context.visited);
            if let Some(mut hook) = context.handlers.on_walk.take() {
                hook(&mut block, &mut cursor);
                context.handlers.on_walk = Some(hook);
            }
            context.visited += 1;
            if let Some(message) = cursor.take_error() {
                return Err(PreprocessError::at(
                    PreprocessErrorKind::MacroAbort,
                    message,
                    block.location.clone(),
                ));
            }
            requested = cursor.requested_order().to_vec();
        }

        // Children evaluate in the hook's requested order first, then
        // document order; output keeps document positions either way.
        let child_count = block.children.len();
        let mut slots: Vec<Option<Node>> = block.children.drain(..).map(Some).collect();
        let mut results: Vec<Vec<Node>> = (0..child_count).map(|_| Vec::new()).collect();

        let mut order = requested;
        order.retain(|&index| index < child_count);
        for index in 0..child_count {
            if !order.contains(&index) {
                order.push(index);
            }
        }

        self.parents.push(block.id.clone());
        for index in order {
            if let Some(child) = slots[index].take() {
                match self.expand_nodes(vec![child]) {
                    Ok(expanded) => results[index] = expanded,
                    Err(error) => {
                        self.parents.pop();
                        return Err(error);
                    }
                }
            }
        }
        self.parents.pop();

        block.children = results.into_iter().flatten().collect();
        Ok(block)
    }

    /// Evaluate a property value as far as this phase can: expressions
    /// without references fully, reference-bearing expressions get their
    /// scope variables substituted and stay deferred for pass 2.
    fn eval_property_value(&mut self, value: Value) -> Value {
        match value {
            Value::Literal(_) | Value::Reference(_) => value,
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.eval_property_value(item))
                    .collect(),
            ),
            Value::Expression(mut expression) => {
                if expression.has_references() {
                    substitute_scope_vars(&mut expression, &self.scope);
                    Value::Expression(expression)
                } else {
                    match evaluate(&expression, &self.scope, &mut NoReferences) {
                        Ok(value) => value,
                        Err(error) => {
                            self.report(error);
                            Value::null()
                        }
                    }
                }
            }
        }
    }

    fn report(&mut self, error: PreprocessError) {
        if self.lenient && !error.is_structural() {
            self.diagnostics.warn(Warning {
                message: format!("{} (substituted null)", error),
                location: error.location,
            });
        } else {
            self.diagnostics.error(error);
        }
    }
}
