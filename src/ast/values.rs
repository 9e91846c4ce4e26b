//! Property values: literals, arrays, deferred expressions, references
//!
//! Values parsed from property lists stay unevaluated where they involve
//! computation: a parenthesized expression is stored as a token list and
//! evaluated by the preprocessor, and a `$`-reference is resolved by the
//! two-pass resolver once the whole file's block registry exists. After
//! successful preprocessing only `Literal` and `Array` variants remain.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// A primitive literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Number(_) => "number",
            Literal::Bool(_) => "boolean",
            Literal::Null => "null",
        }
    }

    /// `false`, `null`, `0`, and `""` are falsy; everything else truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Literal::Bool(b) => *b,
            Literal::Null => false,
            Literal::Number(n) => *n != 0.0,
            Literal::String(s) => !s.is_empty(),
        }
    }

    /// Render the literal the way OX source writes it. Whole numbers
    /// print without a fractional part.
    pub fn render(&self) -> String {
        match self {
            Literal::String(s) => s.clone(),
            Literal::Number(n) => format_number(*n),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => "null".to_string(),
        }
    }
}

/// Format an OX number, preserving integer display where possible.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// The head of a `$`-reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefHead {
    /// `$this` - the block the reference appears on.
    This,
    /// `$parent` - the enclosing block.
    Parent,
    /// `$SomeId` - a block registered by id in the current file.
    Id(String),
}

impl std::fmt::Display for RefHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefHead::This => write!(f, "$this"),
            RefHead::Parent => write!(f, "$parent"),
            RefHead::Id(id) => write!(f, "${}", id),
        }
    }
}

/// A symbolic reference: head plus a chain of member accesses, resolved
/// in pass 2 against the per-file block registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub head: RefHead,
    pub chain: Vec<String>,
    pub resolved: bool,
    pub value: Option<Box<Value>>,
    pub location: Location,
}

impl Reference {
    pub fn new(head: RefHead, chain: Vec<String>, location: Location) -> Self {
        Self {
            head,
            chain,
            resolved: false,
            value: None,
            location,
        }
    }

    /// Render the reference as it appears in source, for messages.
    pub fn render(&self) -> String {
        let mut out = self.head.to_string();
        for member in &self.chain {
            out.push('.');
            out.push_str(member);
        }
        out
    }
}

/// Operators and grouping inside a stored expression token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Not,
    LParen,
    RParen,
}

impl ExprOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ExprOp::Or => "||",
            ExprOp::And => "&&",
            ExprOp::Eq => "==",
            ExprOp::Ne => "!=",
            ExprOp::Lt => "<",
            ExprOp::Le => "<=",
            ExprOp::Gt => ">",
            ExprOp::Ge => ">=",
            ExprOp::Add => "+",
            ExprOp::Sub => "-",
            ExprOp::Mul => "*",
            ExprOp::Div => "/",
            ExprOp::Rem => "%",
            ExprOp::Pow => "**",
            ExprOp::Not => "!",
            ExprOp::LParen => "(",
            ExprOp::RParen => ")",
        }
    }
}

/// One element of a stored expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprToken {
    /// A literal, or a scope value substituted during expansion.
    Const(Value),
    /// A scope-variable name, looked up at evaluation time.
    Ident(String),
    /// A `$`-reference, resolved in pass 2.
    Ref(Reference),
    Op(ExprOp),
}

/// An unevaluated expression: a token list plus resolution state. The
/// preprocessor parses it into an operator tree on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub tokens: Vec<ExprToken>,
    pub resolved: bool,
    pub value: Option<Box<Value>>,
    pub location: Location,
}

impl Expression {
    pub fn new(tokens: Vec<ExprToken>, location: Location) -> Self {
        Self {
            tokens,
            resolved: false,
            value: None,
            location,
        }
    }

    /// Does any token carry a `$`-reference?
    pub fn has_references(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, ExprToken::Ref(_)))
    }

    /// Does any token name a scope variable?
    pub fn has_idents(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, ExprToken::Ident(_)))
    }
}

/// A property value in any pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Literal(Literal),
    Array(Vec<Value>),
    Expression(Expression),
    Reference(Reference),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Literal(Literal::String(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Value::Literal(Literal::Number(n))
    }

    pub fn bool(b: bool) -> Self {
        Value::Literal(Literal::Bool(b))
    }

    pub fn null() -> Self {
        Value::Literal(Literal::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Literal(lit) => lit.type_name(),
            Value::Array(_) => "array",
            Value::Expression(_) => "expression",
            Value::Reference(_) => "reference",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Literal(lit) => lit.is_truthy(),
            Value::Array(items) => !items.is_empty(),
            // Unevaluated variants never reach truthiness checks on the
            // happy path; treat them as falsy.
            Value::Expression(_) | Value::Reference(_) => false,
        }
    }

    /// True when the value is fully evaluated: a literal, or an array of
    /// pure data all the way down.
    pub fn is_pure_data(&self) -> bool {
        match self {
            Value::Literal(_) => true,
            Value::Array(items) => items.iter().all(Value::is_pure_data),
            Value::Expression(_) | Value::Reference(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Literal(Literal::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Literal(Literal::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Convert a JSON value from a module getter into an OX value. Arrays
/// wrap recursively; objects are kept as JSON strings since OX has no
/// object literal.
pub fn value_from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::bool(*b),
        serde_json::Value::Number(n) => Value::number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(_) => Value::string(json.to_string()),
    }
}
