//! Token types produced by the lexer
//!
//! Every token carries its source location and the raw text it was read
//! from. Keywords are classified at lex time so the parser can match on
//! them directly; `<` and `>` double as comparison operators and template
//! delimiters, which the parser disambiguates by context.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Reserved words of the OX language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    Set,
    If,
    Elseif,
    Else,
    Foreach,
    While,
    In,
    OnData,
    OnError,
    Import,
    Inject,
    As,
}

impl Keyword {
    /// Classify an identifier-shaped lexeme. `on-data` and `on-error`
    /// are handled separately by the lexer since they contain a dash.
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        match ident {
            "set" => Some(Keyword::Set),
            "if" => Some(Keyword::If),
            "elseif" => Some(Keyword::Elseif),
            "else" => Some(Keyword::Else),
            "foreach" => Some(Keyword::Foreach),
            "while" => Some(Keyword::While),
            "in" => Some(Keyword::In),
            "import" => Some(Keyword::Import),
            "inject" => Some(Keyword::Inject),
            "as" => Some(Keyword::As),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Set => "set",
            Keyword::If => "if",
            Keyword::Elseif => "elseif",
            Keyword::Else => "else",
            Keyword::Foreach => "foreach",
            Keyword::While => "while",
            Keyword::In => "in",
            Keyword::OnData => "on-data",
            Keyword::OnError => "on-error",
            Keyword::Import => "import",
            Keyword::Inject => "inject",
            Keyword::As => "as",
        }
    }
}

/// The tagged variants a token can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Punctuation
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Equals,

    // Sigils
    At,
    Hash,
    Dollar,

    // Operators (Lt/Gt also open and close template directives)
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    NotEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    AndAnd,
    OrOr,
    Bang,

    // Literals and names
    Ident(String),
    Keyword(Keyword),
    Number(f64),
    Str(String),
    Bool(bool),
    Null,

    /// Verbatim free-text content, pre-dedent, with the opening
    /// delimiter length that produced it.
    FreeText { content: String, delim_len: usize },

    Eof,
}

impl TokenKind {
    /// Human-readable name used in expected-token hints.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Equals => "'='".to_string(),
            TokenKind::At => "'@'".to_string(),
            TokenKind::Hash => "'#'".to_string(),
            TokenKind::Dollar => "'$'".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::LtEq => "'<='".to_string(),
            TokenKind::GtEq => "'>='".to_string(),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Percent => "'%'".to_string(),
            TokenKind::StarStar => "'**'".to_string(),
            TokenKind::AndAnd => "'&&'".to_string(),
            TokenKind::OrOr => "'||'".to_string(),
            TokenKind::Bang => "'!'".to_string(),
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Keyword(kw) => format!("keyword '{}'", kw.as_str()),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Bool(b) => format!("'{}'", b),
            TokenKind::Null => "'null'".to_string(),
            TokenKind::FreeText { .. } => "free-text block".to_string(),
            TokenKind::Eof => "end of file".to_string(),
        }
    }
}

/// A single lexed token: variant, raw source text, and location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub raw: String,
    pub location: Location,
}

impl Token {
    pub fn new(kind: TokenKind, raw: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            raw: raw.into(),
            location,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
