//! Template directives: the `<…>` control-flow constructs
//!
//! Templates exist only between parsing and expansion; the expander
//! replaces each of them with the nodes it produces, and a successful
//! preprocess run leaves none behind.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::nodes::Node;
use crate::ast::values::{Expression, Value};
use crate::location::Location;

/// `<set name = expression>` - binds into the enclosing scope frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTemplate {
    pub name: String,
    pub expression: Expression,
    pub location: Location,
}

/// One `<elseif expression>` branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseifBranch {
    pub condition: Expression,
    pub children: Vec<Node>,
    pub location: Location,
}

/// `<if expression> … <elseif …> … <else> … </if>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfTemplate {
    pub condition: Expression,
    pub children: Vec<Node>,
    pub elseifs: Vec<ElseifBranch>,
    pub else_children: Option<Vec<Node>>,
    pub location: Location,
}

/// `<foreach (loopVar[, indexVar] in expression)> … </foreach>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeachTemplate {
    pub loop_var: String,
    pub index_var: Option<String>,
    pub iterable: Expression,
    pub children: Vec<Node>,
    pub location: Location,
}

/// `<while expression> … </while>` with an iteration cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileTemplate {
    pub condition: Expression,
    pub children: Vec<Node>,
    pub max_iterations: usize,
    pub location: Location,
}

/// `<on-data provider (props)> … <on-error> … </on-data>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnDataTemplate {
    /// Provider id (the directive's head identifier).
    pub provider: String,
    pub properties: IndexMap<String, Value>,
    pub children: Vec<Node>,
    pub error_children: Option<Vec<Node>>,
    pub location: Location,
}

/// The closed set of template variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateNode {
    Set(SetTemplate),
    If(IfTemplate),
    Foreach(ForeachTemplate),
    While(WhileTemplate),
    OnData(OnDataTemplate),
}

impl TemplateNode {
    pub fn location(&self) -> &Location {
        match self {
            TemplateNode::Set(t) => &t.location,
            TemplateNode::If(t) => &t.location,
            TemplateNode::Foreach(t) => &t.location,
            TemplateNode::While(t) => &t.location,
            TemplateNode::OnData(t) => &t.location,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TemplateNode::Set(_) => "set",
            TemplateNode::If(_) => "if",
            TemplateNode::Foreach(_) => "foreach",
            TemplateNode::While(_) => "while",
            TemplateNode::OnData(_) => "on-data",
        }
    }
}
