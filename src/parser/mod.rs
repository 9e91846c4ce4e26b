//! OX Parser - tokens to typed AST
//!
//! Recursive descent with one token of lookahead, except for the shared
//! tag-lookahead routine that peeks past a run of tags to decide between
//! a block and a free-text node. Parse errors are fatal and abort the
//! phase, unlike the preprocessor which collects where safe.
//!
//! Pipeline: `Source Text` → `Tokens` → **`AST`** → `Preprocessed AST`

pub mod dedent;

pub use dedent::{dedent as dedent_text, merge_adjacent_free_text, strip_common_indent};

use indexmap::IndexMap;

use crate::ast::nodes::{
    BlockNode, Document, FreeTextNode, FreeTextRaw, ImportDirective, InjectDirective, Node, Tag,
    TagKind, TopLevelInject,
};
use crate::ast::templates::{
    ElseifBranch, ForeachTemplate, IfTemplate, OnDataTemplate, SetTemplate, TemplateNode,
    WhileTemplate,
};
use crate::ast::values::{ExprOp, ExprToken, Expression, RefHead, Reference, Value};
use crate::errors::ParseError;
use crate::lexer::{Keyword, Token, TokenKind};
use crate::location::Location;

/// Parser-level default for the `while` iteration cap.
pub const DEFAULT_MAX_WHILE_ITERATIONS: usize = 10_000;

/// Knobs for a single parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Merge adjacent free-text siblings with identical tag lists.
    pub merge_free_text: bool,
    /// Iteration cap recorded on parsed `while` templates.
    pub max_while_iterations: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            merge_free_text: true,
            max_while_iterations: DEFAULT_MAX_WHILE_ITERATIONS,
        }
    }
}

/// Parse a token stream into a document.
pub fn parse(tokens: Vec<Token>, source_path: Option<String>) -> Result<Document, ParseError> {
    parse_with_options(tokens, source_path, ParseOptions::default())
}

pub fn parse_with_options(
    tokens: Vec<Token>,
    source_path: Option<String>,
    options: ParseOptions,
) -> Result<Document, ParseError> {
    Parser::new(tokens, source_path, options).parse_document()
}

/// Where an expression's token collection stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprEnd {
    /// `>` at paren depth zero (directive headers).
    CloseAngle,
    /// `)` at paren depth zero (foreach heads, property values).
    CloseParen,
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    source_path: Option<String>,
    options: ParseOptions,
}

impl Parser {
    fn new(mut tokens: Vec<Token>, source_path: Option<String>, options: ParseOptions) -> Self {
        // The lexer always terminates the stream; guard direct callers.
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, "", Location::default()));
        }
        Self {
            tokens,
            position: 0,
            source_path,
            options,
        }
    }

    // ------------------------------------------------------------------
    // Document level
    // ------------------------------------------------------------------

    fn parse_document(mut self) -> Result<Document, ParseError> {
        let mut document = Document::new(self.source_path.clone());

        while !self.peek().is_eof() {
            match self.peek().kind.clone() {
                TokenKind::Lt => match self.peek_kind_at(1) {
                    Some(TokenKind::Keyword(Keyword::Import)) => {
                        let import = self.parse_import_directive()?;
                        document.imports.push(import);
                    }
                    Some(TokenKind::Keyword(Keyword::Inject)) => {
                        let directive = self.parse_inject_directive()?;
                        document.injects.push(TopLevelInject {
                            directive,
                            anchor: document.nodes.len(),
                        });
                    }
                    _ => {
                        let template = self.parse_template()?;
                        document.nodes.push(Node::Template(template));
                    }
                },
                TokenKind::LBracket => {
                    let block = self.parse_block(Vec::new())?;
                    document.nodes.push(Node::Block(block));
                }
                TokenKind::At | TokenKind::Hash => {
                    let node = self.parse_tagged_node()?;
                    if matches!(node, Node::FreeText(_)) {
                        return Err(ParseError::new(
                            "free-text blocks must be children of a block",
                            node.location().clone(),
                        ));
                    }
                    document.nodes.push(node);
                }
                TokenKind::FreeText { .. } => {
                    return Err(ParseError::new(
                        "free-text blocks must be children of a block",
                        self.peek().location.clone(),
                    ));
                }
                _ => {
                    let token = self.peek();
                    return Err(ParseError::expecting(
                        format!("unexpected {} at document level", token.kind.describe()),
                        "a block, tag, import, inject, or template directive",
                        token.location.clone(),
                    ));
                }
            }
        }

        tracing::trace!(
            blocks = document.nodes.len(),
            imports = document.imports.len(),
            "parsed document"
        );
        Ok(document)
    }

    // ------------------------------------------------------------------
    // Blocks and children
    // ------------------------------------------------------------------

    fn parse_block(&mut self, tags: Vec<Tag>) -> Result<BlockNode, ParseError> {
        let open = self.expect(&TokenKind::LBracket)?;
        let location = tags
            .first()
            .map(|t| t.location.clone())
            .unwrap_or(open.location);

        let mut block = BlockNode::new(None, location);
        block.tags = tags;

        if let TokenKind::Ident(_) = self.peek().kind {
            if let TokenKind::Ident(id) = self.advance().kind {
                block.id = Some(id);
            }
        }

        if self.peek().kind == TokenKind::LParen {
            block.properties = self.parse_property_list()?;
        }

        block.children = self.parse_children()?;
        self.expect(&TokenKind::RBracket)?;
        Ok(block)
    }

    /// Parse child nodes until a terminator: `]`, a closing tag, an
    /// `<elseif>`/`<else>`/`<on-error>` continuation, or end of file.
    /// The caller consumes whichever terminator it expects.
    fn parse_children(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut children = Vec::new();

        while !self.at_children_end() {
            match self.peek().kind.clone() {
                TokenKind::LBracket => {
                    let block = self.parse_block(Vec::new())?;
                    children.push(Node::Block(block));
                }
                TokenKind::At | TokenKind::Hash => {
                    children.push(self.parse_tagged_node()?);
                }
                TokenKind::FreeText { .. } => {
                    children.push(Node::FreeText(self.parse_free_text(Vec::new())?));
                }
                TokenKind::Lt => match self.peek_kind_at(1) {
                    Some(TokenKind::Keyword(Keyword::Import)) => {
                        return Err(ParseError::new(
                            "imports are only allowed at document top level",
                            self.peek().location.clone(),
                        ));
                    }
                    Some(TokenKind::Keyword(Keyword::Inject)) => {
                        let directive = self.parse_inject_directive()?;
                        children.push(Node::Inject(directive));
                    }
                    _ => {
                        children.push(Node::Template(self.parse_template()?));
                    }
                },
                other => {
                    let token = self.peek();
                    return Err(ParseError::expecting(
                        format!("unexpected {} in block body", other.describe()),
                        "a child block, tag, free-text, or template directive",
                        token.location.clone(),
                    ));
                }
            }
        }

        if self.options.merge_free_text {
            children = merge_adjacent_free_text(children);
        }
        Ok(children)
    }

    fn at_children_end(&self) -> bool {
        match &self.peek().kind {
            TokenKind::RBracket | TokenKind::Eof => true,
            TokenKind::Lt => matches!(
                self.peek_kind_at(1),
                Some(TokenKind::Slash)
                    | Some(TokenKind::Keyword(Keyword::Elseif))
                    | Some(TokenKind::Keyword(Keyword::Else))
                    | Some(TokenKind::Keyword(Keyword::OnError))
            ),
            _ => false,
        }
    }

    /// Shared tag lookahead: consume the run of tags, then dispatch on
    /// what follows. Used identically at top level and child position.
    fn parse_tagged_node(&mut self) -> Result<Node, ParseError> {
        let tags = self.parse_tags()?;
        match self.peek().kind {
            TokenKind::LBracket => Ok(Node::Block(self.parse_block(tags)?)),
            TokenKind::FreeText { .. } => Ok(Node::FreeText(self.parse_free_text(tags)?)),
            _ => {
                let token = self.peek();
                Err(ParseError::expecting(
                    format!("unexpected {} after tags", token.kind.describe()),
                    "'[' or a free-text block",
                    token.location.clone(),
                ))
            }
        }
    }

    fn parse_tags(&mut self) -> Result<Vec<Tag>, ParseError> {
        let mut tags = Vec::new();
        loop {
            let kind = match self.peek().kind {
                TokenKind::At => TagKind::Definition,
                TokenKind::Hash => TagKind::Instance,
                _ => break,
            };
            let sigil = self.advance();
            let first = self.expect_ident("tag name")?;

            // `#ns.name` - a namespaced instance lookup.
            let (namespace, name) = if self.peek().kind == TokenKind::Dot {
                self.advance();
                let name = self.expect_ident("tag name after namespace")?;
                (Some(first), name)
            } else {
                (None, first)
            };

            let argument = if self.peek().kind == TokenKind::LParen {
                self.advance();
                // Any single token is accepted here; the tag processor
                // validates identifier shape and reports
                // InvalidTagArgument with this location.
                let arg_token = self.advance();
                if arg_token.is_eof() {
                    return Err(ParseError::expecting(
                        "unterminated tag argument",
                        "an identifier",
                        arg_token.location,
                    ));
                }
                self.expect(&TokenKind::RParen)?;
                Some(arg_token.raw)
            } else {
                None
            };

            tags.push(Tag {
                kind,
                name,
                argument,
                namespace,
                resolved: false,
                location: sigil.location,
            });
        }
        Ok(tags)
    }

    fn parse_free_text(&mut self, tags: Vec<Tag>) -> Result<FreeTextNode, ParseError> {
        let token = self.advance();
        let (content, delim_len) = match token.kind {
            TokenKind::FreeText { content, delim_len } => (content, delim_len),
            _ => unreachable!("parse_free_text called off a free-text token"),
        };

        let location = tags
            .first()
            .map(|t| t.location.clone())
            .unwrap_or_else(|| token.location.clone());
        let mut node = FreeTextNode::new(dedent_text(&content), tags, location);
        node.end = token.location;
        node.raw = Some(FreeTextRaw {
            text: content,
            delim_len,
        });
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Properties and values
    // ------------------------------------------------------------------

    fn parse_property_list(&mut self) -> Result<IndexMap<String, Value>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut properties = IndexMap::new();

        if self.peek().kind != TokenKind::RParen {
            loop {
                let key_location = self.peek().location.clone();
                let key = self.expect_ident("property name")?;
                if properties.contains_key(&key) {
                    return Err(ParseError::new(
                        format!("duplicate property key '{}'", key),
                        key_location,
                    ));
                }
                self.expect(&TokenKind::Colon)?;
                let value = self.parse_value()?;
                properties.insert(key, value);

                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(&TokenKind::RParen)?;
        Ok(properties)
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Value::number(n))
            }
            TokenKind::Str(ref s) => {
                let s = s.clone();
                self.advance();
                Ok(Value::string(s))
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Value::bool(b))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::null())
            }
            TokenKind::Minus => {
                self.advance();
                let next = self.advance();
                match next.kind {
                    TokenKind::Number(n) => Ok(Value::number(-n)),
                    _ => Err(ParseError::expecting(
                        "'-' in value position must precede a number",
                        "a number literal",
                        next.location,
                    )),
                }
            }
            TokenKind::LParen => {
                let location = token.location.clone();
                self.advance();
                let expression = self.parse_expression_tokens(ExprEnd::CloseParen, location)?;
                self.expect(&TokenKind::RParen)?;
                Ok(Value::Expression(expression))
            }
            TokenKind::LBrace => self.parse_array_value(),
            TokenKind::Dollar => Ok(Value::Reference(self.parse_reference()?)),
            TokenKind::Ident(ref name) => {
                // A bare identifier is a scope-variable expression.
                let name = name.clone();
                self.advance();
                Ok(Value::Expression(Expression::new(
                    vec![ExprToken::Ident(name)],
                    token.location,
                )))
            }
            other => Err(ParseError::expecting(
                format!("unexpected {} in value position", other.describe()),
                "a literal, expression, array, or reference",
                token.location,
            )),
        }
    }

    fn parse_array_value(&mut self) -> Result<Value, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut items = Vec::new();
        if self.peek().kind != TokenKind::RBrace {
            loop {
                items.push(self.parse_value()?);
                if self.peek().kind == TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Value::Array(items))
    }

    fn parse_reference(&mut self) -> Result<Reference, ParseError> {
        let dollar = self.expect(&TokenKind::Dollar)?;
        let head_name = self.expect_ident("reference target after '$'")?;
        let head = match head_name.as_str() {
            "this" => RefHead::This,
            "parent" => RefHead::Parent,
            _ => RefHead::Id(head_name),
        };

        let mut chain = Vec::new();
        while self.peek().kind == TokenKind::Dot {
            self.advance();
            chain.push(self.expect_ident("member name after '.'")?);
        }

        Ok(Reference::new(head, chain, dollar.location))
    }

    /// Collect expression tokens until the terminator at paren depth
    /// zero. Inside directive headers a bare `>` closes the directive,
    /// so comparisons there must be parenthesized.
    fn parse_expression_tokens(
        &mut self,
        end: ExprEnd,
        location: Location,
    ) -> Result<Expression, ParseError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;

        loop {
            let token = self.peek().clone();
            let op = match token.kind {
                TokenKind::Eof => {
                    return Err(ParseError::expecting(
                        "unterminated expression",
                        match end {
                            ExprEnd::CloseAngle => "'>'",
                            ExprEnd::CloseParen => "')'",
                        },
                        token.location,
                    ));
                }
                TokenKind::Gt if depth == 0 && end == ExprEnd::CloseAngle => break,
                TokenKind::RParen if depth == 0 && end == ExprEnd::CloseParen => break,
                TokenKind::Number(n) => {
                    self.advance();
                    tokens.push(ExprToken::Const(Value::number(n)));
                    continue;
                }
                TokenKind::Str(ref s) => {
                    let s = s.clone();
                    self.advance();
                    tokens.push(ExprToken::Const(Value::string(s)));
                    continue;
                }
                TokenKind::Bool(b) => {
                    self.advance();
                    tokens.push(ExprToken::Const(Value::bool(b)));
                    continue;
                }
                TokenKind::Null => {
                    self.advance();
                    tokens.push(ExprToken::Const(Value::null()));
                    continue;
                }
                TokenKind::Ident(ref name) => {
                    let name = name.clone();
                    self.advance();
                    tokens.push(ExprToken::Ident(name));
                    continue;
                }
                TokenKind::Dollar => {
                    tokens.push(ExprToken::Ref(self.parse_reference()?));
                    continue;
                }
                TokenKind::LBrace => {
                    let array = self.parse_array_value()?;
                    tokens.push(ExprToken::Const(array));
                    continue;
                }
                TokenKind::LParen => {
                    depth += 1;
                    ExprOp::LParen
                }
                TokenKind::RParen => {
                    if depth == 0 {
                        return Err(ParseError::new("unmatched ')'", token.location));
                    }
                    depth -= 1;
                    ExprOp::RParen
                }
                TokenKind::OrOr => ExprOp::Or,
                TokenKind::AndAnd => ExprOp::And,
                TokenKind::EqEq => ExprOp::Eq,
                TokenKind::NotEq => ExprOp::Ne,
                TokenKind::Lt => ExprOp::Lt,
                TokenKind::LtEq => ExprOp::Le,
                TokenKind::Gt => ExprOp::Gt,
                TokenKind::GtEq => ExprOp::Ge,
                TokenKind::Plus => ExprOp::Add,
                TokenKind::Minus => ExprOp::Sub,
                TokenKind::Star => ExprOp::Mul,
                TokenKind::Slash => ExprOp::Div,
                TokenKind::Percent => ExprOp::Rem,
                TokenKind::StarStar => ExprOp::Pow,
                TokenKind::Bang => ExprOp::Not,
                ref other => {
                    return Err(ParseError::expecting(
                        format!("unexpected {} in expression", other.describe()),
                        "an operand or operator",
                        token.location,
                    ));
                }
            };
            self.advance();
            tokens.push(ExprToken::Op(op));
        }

        if tokens.is_empty() {
            return Err(ParseError::new("empty expression", location));
        }
        Ok(Expression::new(tokens, location))
    }

    // ------------------------------------------------------------------
    // Template directives
    // ------------------------------------------------------------------

    fn parse_template(&mut self) -> Result<TemplateNode, ParseError> {
        let open = self.expect(&TokenKind::Lt)?;
        let location = open.location;

        match self.peek().kind {
            TokenKind::Keyword(Keyword::Set) => self.parse_set(location),
            TokenKind::Keyword(Keyword::If) => self.parse_if(location),
            TokenKind::Keyword(Keyword::Foreach) => self.parse_foreach(location),
            TokenKind::Keyword(Keyword::While) => self.parse_while(location),
            TokenKind::Keyword(Keyword::OnData) => self.parse_on_data(location),
            ref other => Err(ParseError::expecting(
                format!("unknown template directive starting with {}", other.describe()),
                "'set', 'if', 'foreach', 'while', 'on-data', 'import', or 'inject'",
                self.peek().location.clone(),
            )),
        }
    }

    fn parse_set(&mut self, location: Location) -> Result<TemplateNode, ParseError> {
        self.advance(); // set
        let name = self.expect_ident("variable name after 'set'")?;
        self.expect(&TokenKind::Equals)?;
        let expr_location = self.peek().location.clone();
        let expression = self.parse_expression_tokens(ExprEnd::CloseAngle, expr_location)?;
        self.expect(&TokenKind::Gt)?;
        Ok(TemplateNode::Set(SetTemplate {
            name,
            expression,
            location,
        }))
    }

    fn parse_if(&mut self, location: Location) -> Result<TemplateNode, ParseError> {
        self.advance(); // if
        let expr_location = self.peek().location.clone();
        let condition = self.parse_expression_tokens(ExprEnd::CloseAngle, expr_location)?;
        self.expect(&TokenKind::Gt)?;
        let children = self.parse_children()?;

        let mut elseifs = Vec::new();
        let mut else_children = None;

        loop {
            match (self.peek().kind.clone(), self.peek_kind_at(1)) {
                (TokenKind::Lt, Some(TokenKind::Keyword(Keyword::Elseif))) => {
                    let branch_location = self.advance().location; // <
                    self.advance(); // elseif
                    let expr_location = self.peek().location.clone();
                    let condition =
                        self.parse_expression_tokens(ExprEnd::CloseAngle, expr_location)?;
                    self.expect(&TokenKind::Gt)?;
                    let children = self.parse_children()?;
                    elseifs.push(ElseifBranch {
                        condition,
                        children,
                        location: branch_location,
                    });
                }
                (TokenKind::Lt, Some(TokenKind::Keyword(Keyword::Else))) => {
                    self.advance(); // <
                    self.advance(); // else
                    self.expect(&TokenKind::Gt)?;
                    else_children = Some(self.parse_children()?);
                    break;
                }
                _ => break,
            }
        }

        self.expect_closing(Keyword::If)?;
        Ok(TemplateNode::If(IfTemplate {
            condition,
            children,
            elseifs,
            else_children,
            location,
        }))
    }

    fn parse_foreach(&mut self, location: Location) -> Result<TemplateNode, ParseError> {
        self.advance(); // foreach
        self.expect(&TokenKind::LParen)?;
        let loop_var = self.expect_ident("loop variable")?;
        let index_var = if self.peek().kind == TokenKind::Comma {
            self.advance();
            Some(self.expect_ident("index variable")?)
        } else {
            None
        };
        self.expect_keyword(Keyword::In)?;
        let expr_location = self.peek().location.clone();
        let iterable = self.parse_expression_tokens(ExprEnd::CloseParen, expr_location)?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::Gt)?;

        let children = self.parse_children()?;
        self.expect_closing(Keyword::Foreach)?;
        Ok(TemplateNode::Foreach(ForeachTemplate {
            loop_var,
            index_var,
            iterable,
            children,
            location,
        }))
    }

    fn parse_while(&mut self, location: Location) -> Result<TemplateNode, ParseError> {
        self.advance(); // while
        let expr_location = self.peek().location.clone();
        let condition = self.parse_expression_tokens(ExprEnd::CloseAngle, expr_location)?;
        self.expect(&TokenKind::Gt)?;

        let children = self.parse_children()?;
        self.expect_closing(Keyword::While)?;
        Ok(TemplateNode::While(WhileTemplate {
            condition,
            children,
            max_iterations: self.options.max_while_iterations,
            location,
        }))
    }

    fn parse_on_data(&mut self, location: Location) -> Result<TemplateNode, ParseError> {
        self.advance(); // on-data
        let provider = self.expect_ident("provider id after 'on-data'")?;
        let properties = if self.peek().kind == TokenKind::LParen {
            self.parse_property_list()?
        } else {
            IndexMap::new()
        };
        self.expect(&TokenKind::Gt)?;

        let children = self.parse_children()?;

        let error_children = if self.peek().kind == TokenKind::Lt
            && self.peek_kind_at(1) == Some(TokenKind::Keyword(Keyword::OnError))
        {
            self.advance(); // <
            self.advance(); // on-error
            self.expect(&TokenKind::Gt)?;
            Some(self.parse_children()?)
        } else {
            None
        };

        self.expect_closing(Keyword::OnData)?;
        Ok(TemplateNode::OnData(OnDataTemplate {
            provider,
            properties,
            children,
            error_children,
            location,
        }))
    }

    fn parse_import_directive(&mut self) -> Result<ImportDirective, ParseError> {
        let open = self.expect(&TokenKind::Lt)?;
        self.expect_keyword(Keyword::Import)?;
        let path = self.expect_string("import path")?;
        let alias = if self.peek().kind == TokenKind::Keyword(Keyword::As) {
            self.advance();
            Some(self.expect_ident("import alias after 'as'")?)
        } else {
            None
        };
        self.expect(&TokenKind::Gt)?;
        Ok(ImportDirective {
            path,
            alias,
            location: open.location,
        })
    }

    fn parse_inject_directive(&mut self) -> Result<InjectDirective, ParseError> {
        let open = self.expect(&TokenKind::Lt)?;
        self.expect_keyword(Keyword::Inject)?;
        let path = self.expect_string("inject path")?;
        self.expect(&TokenKind::Gt)?;
        Ok(InjectDirective {
            path,
            location: open.location,
        })
    }

    fn expect_closing(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        self.expect(&TokenKind::Lt)?;
        self.expect(&TokenKind::Slash)?;
        self.expect_keyword(keyword)?;
        self.expect(&TokenKind::Gt)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.position + offset)
            .map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            let token = self.peek();
            Err(ParseError::expecting(
                format!("unexpected {}", token.kind.describe()),
                kind.describe(),
                token.location.clone(),
            ))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        self.expect(&TokenKind::Keyword(keyword))
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::expecting(
                format!("unexpected {}", other.describe()),
                what.to_string(),
                self.peek().location.clone(),
            )),
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Str(value) => {
                self.advance();
                Ok(value)
            }
            other => Err(ParseError::expecting(
                format!("unexpected {}", other.describe()),
                what.to_string(),
                self.peek().location.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(source: &str) -> Document {
        parse(tokenize(source).unwrap(), None).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse(tokenize(source).unwrap(), None).unwrap_err()
    }

    #[test]
    fn basic_block_with_properties() {
        let doc = parse_str("[Player (name: \"Hero\", health: 100)]");
        assert_eq!(doc.nodes.len(), 1);
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.id.as_deref(), Some("Player"));
        assert_eq!(
            block.properties.get("name"),
            Some(&Value::string("Hero"))
        );
        assert_eq!(
            block.properties.get("health"),
            Some(&Value::number(100.0))
        );
        assert!(block.children.is_empty());
    }

    #[test]
    fn property_order_is_preserved() {
        let doc = parse_str("[B (z: 1, a: 2, m: 3)]");
        let block = doc.blocks().next().unwrap();
        let keys: Vec<_> = block.properties.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn duplicate_property_keys_rejected() {
        let err = parse_err("[B (a: 1, a: 2)]");
        assert!(err.message.contains("duplicate property key"));
    }

    #[test]
    fn nested_blocks() {
        let doc = parse_str("[A [B [C]] [D]]");
        let a = doc.blocks().next().unwrap();
        assert_eq!(a.child_blocks().count(), 2);
    }

    #[test]
    fn tags_on_blocks() {
        let doc = parse_str("#card(Wide) @style [B]");
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.tags.len(), 2);
        assert_eq!(block.tags[0].kind, TagKind::Instance);
        assert_eq!(block.tags[0].name, "card");
        assert_eq!(block.tags[0].argument.as_deref(), Some("Wide"));
        assert_eq!(block.tags[1].kind, TagKind::Definition);
    }

    #[test]
    fn namespaced_tag_instance() {
        let doc = parse_str("#ui.component(Button) [MyBtn]");
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.tags[0].namespace.as_deref(), Some("ui"));
        assert_eq!(block.tags[0].name, "component");
    }

    #[test]
    fn expression_value_is_deferred() {
        let doc = parse_str("[B (size: ($parent.width - 20))]");
        let block = doc.blocks().next().unwrap();
        match block.properties.get("size").unwrap() {
            Value::Expression(expr) => {
                assert!(!expr.resolved);
                assert!(expr.has_references());
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }

    #[test]
    fn array_values() {
        let doc = parse_str("[B (items: {1, \"two\", true, {2}})]");
        let block = doc.blocks().next().unwrap();
        match block.properties.get("items").unwrap() {
            Value::Array(items) => {
                assert_eq!(items.len(), 4);
                assert_eq!(items[3], Value::Array(vec![Value::number(2.0)]));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn negative_number_literal() {
        let doc = parse_str("[B (x: -5)]");
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.properties.get("x"), Some(&Value::number(-5.0)));
    }

    #[test]
    fn reference_value() {
        let doc = parse_str("[B (w: $Content.width)]");
        let block = doc.blocks().next().unwrap();
        match block.properties.get("w").unwrap() {
            Value::Reference(reference) => {
                assert_eq!(reference.head, RefHead::Id("Content".to_string()));
                assert_eq!(reference.chain, vec!["width".to_string()]);
                assert!(!reference.resolved);
            }
            other => panic!("expected reference, got {:?}", other),
        }
    }

    #[test]
    fn free_text_child_with_dedent() {
        let doc = parse_str("[B ```\n    line one\n      line two\n    line three\n```]");
        let block = doc.blocks().next().unwrap();
        match &block.children[0] {
            Node::FreeText(text) => {
                assert_eq!(text.value, "line one\n  line two\nline three");
                assert_eq!(text.raw.as_ref().unwrap().delim_len, 3);
            }
            other => panic!("expected free text, got {:?}", other),
        }
    }

    #[test]
    fn adjacent_free_text_merges() {
        let doc = parse_str("[B ```one``` ```two```]");
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.children.len(), 1);
        match &block.children[0] {
            Node::FreeText(text) => assert_eq!(text.value, "one\n\ntwo"),
            other => panic!("expected free text, got {:?}", other),
        }
    }

    #[test]
    fn merge_respects_tag_lists() {
        let doc = parse_str("[B #code ```one``` ```two```]");
        let block = doc.blocks().next().unwrap();
        assert_eq!(block.children.len(), 2);
    }

    #[test]
    fn merge_can_be_disabled() {
        let tokens = tokenize("[B ```one``` ```two```]").unwrap();
        let doc = parse_with_options(
            tokens,
            None,
            ParseOptions {
                merge_free_text: false,
                ..ParseOptions::default()
            },
        )
        .unwrap();
        assert_eq!(doc.blocks().next().unwrap().children.len(), 2);
    }

    #[test]
    fn set_template() {
        let doc = parse_str("<set items = {1, 2, 3}>");
        match &doc.nodes[0] {
            Node::Template(TemplateNode::Set(set)) => {
                assert_eq!(set.name, "items");
                assert_eq!(set.expression.tokens.len(), 1);
            }
            other => panic!("expected set template, got {:?}", other),
        }
    }

    #[test]
    fn if_elseif_else_template() {
        let doc = parse_str("<if (x == 1)> [A] <elseif (x == 2)> [B] <else> [C] </if>");
        match &doc.nodes[0] {
            Node::Template(TemplateNode::If(template)) => {
                assert_eq!(template.children.len(), 1);
                assert_eq!(template.elseifs.len(), 1);
                assert_eq!(template.else_children.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected if template, got {:?}", other),
        }
    }

    #[test]
    fn foreach_template_with_index() {
        let doc = parse_str("<foreach (item, i in items)> [Row] </foreach>");
        match &doc.nodes[0] {
            Node::Template(TemplateNode::Foreach(template)) => {
                assert_eq!(template.loop_var, "item");
                assert_eq!(template.index_var.as_deref(), Some("i"));
                assert_eq!(template.children.len(), 1);
            }
            other => panic!("expected foreach template, got {:?}", other),
        }
    }

    #[test]
    fn while_template_records_cap() {
        let doc = parse_str("<while (x < 3)> [A] </while>");
        match &doc.nodes[0] {
            Node::Template(TemplateNode::While(template)) => {
                assert_eq!(template.max_iterations, DEFAULT_MAX_WHILE_ITERATIONS);
            }
            other => panic!("expected while template, got {:?}", other),
        }
    }

    #[test]
    fn on_data_template_with_error_branch() {
        let doc =
            parse_str("<on-data users (limit: 10)> [Row] <on-error> [Oops] </on-data>");
        match &doc.nodes[0] {
            Node::Template(TemplateNode::OnData(template)) => {
                assert_eq!(template.provider, "users");
                assert_eq!(
                    template.properties.get("limit"),
                    Some(&Value::number(10.0))
                );
                assert_eq!(template.children.len(), 1);
                assert_eq!(template.error_children.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected on-data template, got {:?}", other),
        }
    }

    #[test]
    fn imports_and_injects_at_top_level() {
        let doc = parse_str("<import \"./a.ox\" as ui>\n<inject \"./b.ox\">\n[App]");
        assert_eq!(doc.imports.len(), 1);
        assert_eq!(doc.imports[0].alias.as_deref(), Some("ui"));
        assert_eq!(doc.injects.len(), 1);
        assert_eq!(doc.injects[0].anchor, 0);
        assert_eq!(doc.nodes.len(), 1);
    }

    #[test]
    fn inject_as_block_child_stays_inline() {
        let doc = parse_str("[App [Header] <inject \"./b.ox\"> [Footer]]");
        let app = doc.blocks().next().unwrap();
        assert!(matches!(app.children[1], Node::Inject(_)));
    }

    #[test]
    fn import_below_top_level_rejected() {
        let err = parse_err("[App <import \"./a.ox\">]");
        assert!(err.message.contains("top level"));
    }

    #[test]
    fn free_text_at_top_level_rejected() {
        let err = parse_err("```floating```");
        assert!(err.message.contains("children of a block"));
    }

    #[test]
    fn unclosed_block_fails_with_hint() {
        let err = parse_err("[A (x: 1)");
        assert_eq!(err.expected.as_deref(), Some("']'"));
    }
}
