//! Expression evaluation
//!
//! Stored expression token lists are parsed into an operator tree on
//! demand and evaluated against a scope. Precedence, low to high:
//! logical-or, logical-and, equality, relational, additive,
//! multiplicative, exponentiation (right-associative), unary, primary.
//!
//! `$`-references are evaluated through a resolver hook: the two-pass
//! resolver supplies one backed by the block registry during pass 2,
//! while template expansion runs with a resolver that rejects them,
//! since references only become resolvable after expansion completes.

use crate::ast::values::{
    format_number, ExprOp, ExprToken, Expression, Literal, Reference, Value,
};
use crate::errors::{PreprocessError, PreprocessErrorKind};
use crate::location::Location;
use crate::preprocess::scope::Scope;

/// Hook through which the evaluator resolves `$`-references.
pub trait ReferenceResolver {
    fn resolve(&mut self, reference: &Reference) -> Result<Value, PreprocessError>;
}

/// Resolver for contexts where references are not available, such as
/// template-directive conditions evaluated before pass 2.
pub struct NoReferences;

impl ReferenceResolver for NoReferences {
    fn resolve(&mut self, reference: &Reference) -> Result<Value, PreprocessError> {
        Err(PreprocessError::at(
            PreprocessErrorKind::Evaluation,
            format!(
                "reference '{}' cannot be used here; references resolve only in block properties",
                reference.render()
            ),
            reference.location.clone(),
        ))
    }
}

/// Evaluate an expression to a pure-data value.
pub fn evaluate(
    expression: &Expression,
    scope: &Scope,
    resolver: &mut dyn ReferenceResolver,
) -> Result<Value, PreprocessError> {
    let ast = ExprParser::new(&expression.tokens, &expression.location).parse()?;
    eval_ast(&ast, scope, resolver, &expression.location)
}

/// Replace scope-variable tokens with their current values, leaving
/// `$`-references untouched. Used when an expression must be deferred to
/// pass 2 but its scope frames will be gone by then.
pub fn substitute_scope_vars(expression: &mut Expression, scope: &Scope) {
    for token in &mut expression.tokens {
        if let ExprToken::Ident(name) = token {
            if let Some(value) = scope.lookup(name) {
                *token = ExprToken::Const(value.clone());
            }
        }
    }
}

/// Parsed operator tree, built lazily from the token list.
#[derive(Debug, Clone)]
enum ExprAst {
    Const(Value),
    Ident(String),
    Ref(Reference),
    Unary(ExprOp, Box<ExprAst>),
    Binary(ExprOp, Box<ExprAst>, Box<ExprAst>),
}

struct ExprParser<'a> {
    tokens: &'a [ExprToken],
    position: usize,
    location: &'a Location,
}

impl<'a> ExprParser<'a> {
    fn new(tokens: &'a [ExprToken], location: &'a Location) -> Self {
        Self {
            tokens,
            position: 0,
            location,
        }
    }

    fn parse(mut self) -> Result<ExprAst, PreprocessError> {
        let ast = self.parse_or()?;
        if self.position != self.tokens.len() {
            return Err(self.error("trailing tokens after expression"));
        }
        Ok(ast)
    }

    fn error(&self, message: impl Into<String>) -> PreprocessError {
        PreprocessError::at(
            PreprocessErrorKind::Evaluation,
            message,
            self.location.clone(),
        )
    }

    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.position)
    }

    fn peek_op(&self) -> Option<ExprOp> {
        match self.peek() {
            Some(ExprToken::Op(op)) => Some(*op),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<&ExprToken> {
        let token = self.tokens.get(self.position);
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some(ExprOp::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = ExprAst::Binary(ExprOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_equality()?;
        while self.peek_op() == Some(ExprOp::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = ExprAst::Binary(ExprOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_relational()?;
        while let Some(op @ (ExprOp::Eq | ExprOp::Ne)) = self.peek_op() {
            self.advance();
            let right = self.parse_relational()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_additive()?;
        while let Some(op @ (ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge)) = self.peek_op() {
            self.advance();
            let right = self.parse_additive()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op @ (ExprOp::Add | ExprOp::Sub)) = self.peek_op() {
            self.advance();
            let right = self.parse_multiplicative()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<ExprAst, PreprocessError> {
        let mut left = self.parse_power()?;
        while let Some(op @ (ExprOp::Mul | ExprOp::Div | ExprOp::Rem)) = self.peek_op() {
            self.advance();
            let right = self.parse_power()?;
            left = ExprAst::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // Right-associative: 2 ** 3 ** 2 is 2 ** (3 ** 2).
    fn parse_power(&mut self) -> Result<ExprAst, PreprocessError> {
        let base = self.parse_unary()?;
        if self.peek_op() == Some(ExprOp::Pow) {
            self.advance();
            let exponent = self.parse_power()?;
            return Ok(ExprAst::Binary(
                ExprOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<ExprAst, PreprocessError> {
        match self.peek_op() {
            Some(op @ (ExprOp::Sub | ExprOp::Not)) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(ExprAst::Unary(op, Box::new(operand)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprAst, PreprocessError> {
        match self.advance() {
            Some(ExprToken::Const(value)) => Ok(ExprAst::Const(value.clone())),
            Some(ExprToken::Ident(name)) => Ok(ExprAst::Ident(name.clone())),
            Some(ExprToken::Ref(reference)) => Ok(ExprAst::Ref(reference.clone())),
            Some(ExprToken::Op(ExprOp::LParen)) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(ExprToken::Op(ExprOp::RParen)) => Ok(inner),
                    _ => Err(self.error("unbalanced parentheses in expression")),
                }
            }
            Some(ExprToken::Op(op)) => {
                let op = *op;
                Err(self.error(format!("unexpected operator '{}'", op.symbol())))
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn eval_ast(
    ast: &ExprAst,
    scope: &Scope,
    resolver: &mut dyn ReferenceResolver,
    location: &Location,
) -> Result<Value, PreprocessError> {
    let err = |message: String| {
        PreprocessError::at(PreprocessErrorKind::Evaluation, message, location.clone())
    };

    match ast {
        ExprAst::Const(value) => deep_eval(value, scope, resolver, location),
        ExprAst::Ident(name) => {
            let value = scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| err(format!("undefined variable '{}'", name)))?;
            deep_eval(&value, scope, resolver, location)
        }
        ExprAst::Ref(reference) => resolver.resolve(reference),
        ExprAst::Unary(op, operand) => {
            let value = eval_ast(operand, scope, resolver, location)?;
            match op {
                ExprOp::Sub => match value.as_number() {
                    Some(n) => Ok(Value::number(-n)),
                    None => Err(err(format!("cannot negate a {}", value.type_name()))),
                },
                ExprOp::Not => Ok(Value::bool(!value.is_truthy())),
                _ => unreachable!("only '-' and '!' parse as unary"),
            }
        }
        ExprAst::Binary(op, left, right) => {
            // Logical operators short-circuit.
            if *op == ExprOp::Or {
                let left = eval_ast(left, scope, resolver, location)?;
                if left.is_truthy() {
                    return Ok(Value::bool(true));
                }
                let right = eval_ast(right, scope, resolver, location)?;
                return Ok(Value::bool(right.is_truthy()));
            }
            if *op == ExprOp::And {
                let left = eval_ast(left, scope, resolver, location)?;
                if !left.is_truthy() {
                    return Ok(Value::bool(false));
                }
                let right = eval_ast(right, scope, resolver, location)?;
                return Ok(Value::bool(right.is_truthy()));
            }

            let left = eval_ast(left, scope, resolver, location)?;
            let right = eval_ast(right, scope, resolver, location)?;
            eval_binary(*op, &left, &right, location)
        }
    }
}

/// Evaluate a value that may carry unevaluated parts: array literals
/// parsed inside expressions keep their element expressions until the
/// array is first used.
fn deep_eval(
    value: &Value,
    scope: &Scope,
    resolver: &mut dyn ReferenceResolver,
    location: &Location,
) -> Result<Value, PreprocessError> {
    match value {
        Value::Literal(_) => Ok(value.clone()),
        Value::Array(items) => {
            let mut evaluated = Vec::with_capacity(items.len());
            for item in items {
                evaluated.push(deep_eval(item, scope, resolver, location)?);
            }
            Ok(Value::Array(evaluated))
        }
        Value::Expression(expression) => evaluate(expression, scope, resolver),
        Value::Reference(reference) => resolver.resolve(reference),
    }
}

fn eval_binary(
    op: ExprOp,
    left: &Value,
    right: &Value,
    location: &Location,
) -> Result<Value, PreprocessError> {
    let err = |message: String| {
        PreprocessError::at(PreprocessErrorKind::Evaluation, message, location.clone())
    };
    let type_error = |op: ExprOp| {
        err(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))
    };

    match op {
        ExprOp::Eq => Ok(Value::bool(left == right)),
        ExprOp::Ne => Ok(Value::bool(left != right)),
        ExprOp::Lt | ExprOp::Le | ExprOp::Gt | ExprOp::Ge => {
            let ordering = match (left, right) {
                (Value::Literal(Literal::Number(a)), Value::Literal(Literal::Number(b))) => a
                    .partial_cmp(b)
                    .ok_or_else(|| err("cannot compare NaN".to_string()))?,
                // String comparison is lexicographic.
                (Value::Literal(Literal::String(a)), Value::Literal(Literal::String(b))) => {
                    a.cmp(b)
                }
                _ => return Err(type_error(op)),
            };
            let result = match op {
                ExprOp::Lt => ordering.is_lt(),
                ExprOp::Le => ordering.is_le(),
                ExprOp::Gt => ordering.is_gt(),
                ExprOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::bool(result))
        }
        ExprOp::Add => match (left, right) {
            (Value::Literal(Literal::Number(a)), Value::Literal(Literal::Number(b))) => {
                Ok(Value::number(a + b))
            }
            // `+` with a string operand concatenates.
            (Value::Literal(Literal::String(a)), b) => {
                Ok(Value::string(format!("{}{}", a, render_for_concat(b)?)))
            }
            (a, Value::Literal(Literal::String(b))) => {
                Ok(Value::string(format!("{}{}", render_for_concat(a)?, b)))
            }
            _ => Err(type_error(op)),
        },
        ExprOp::Sub | ExprOp::Mul | ExprOp::Div | ExprOp::Rem | ExprOp::Pow => {
            let (a, b) = match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(type_error(op)),
            };
            match op {
                ExprOp::Sub => Ok(Value::number(a - b)),
                ExprOp::Mul => Ok(Value::number(a * b)),
                ExprOp::Div => {
                    if b == 0.0 {
                        Err(err("division by zero".to_string()))
                    } else {
                        Ok(Value::number(a / b))
                    }
                }
                ExprOp::Rem => {
                    if b == 0.0 {
                        Err(err("division by zero".to_string()))
                    } else {
                        Ok(Value::number(a % b))
                    }
                }
                ExprOp::Pow => Ok(Value::number(a.powf(b))),
                _ => unreachable!(),
            }
        }
        _ => Err(type_error(op)),
    }
}

fn render_for_concat(value: &Value) -> Result<String, PreprocessError> {
    match value {
        Value::Literal(lit) => Ok(match lit {
            Literal::Number(n) => format_number(*n),
            other => other.render(),
        }),
        other => Err(PreprocessError::new(
            PreprocessErrorKind::Evaluation,
            format!("cannot concatenate a {}", other.type_name()),
        )),
    }
}
