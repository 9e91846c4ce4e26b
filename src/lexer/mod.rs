//! OX Lexer - single-pass scanner with free-text mode
//!
//! Converts OX source text into a flat token stream with `(file, line,
//! column, raw)` on every token. Whitespace is skipped, `//` comments run
//! to end of line, and a run of three or more backticks switches the
//! scanner into free-text mode where content is consumed verbatim until
//! the matching closing run.
//!
//! Pipeline: **`Source Text` → `Tokens`** → `AST` → `Preprocessed AST`

pub mod tokens;

pub use tokens::{Keyword, Token, TokenKind};

use crate::errors::{LexError, LexErrorKind};
use crate::location::Location;

/// Default cap on the byte size of a single free-text block.
pub const DEFAULT_MAX_FREE_TEXT_BYTES: usize = 10 * 1024 * 1024;

/// Knobs for a single lexer run.
#[derive(Debug, Clone)]
pub struct LexOptions {
    /// Source file name attached to every location, when known.
    pub file: Option<String>,
    /// Per-block byte limit for free-text content.
    pub max_free_text_bytes: usize,
}

impl Default for LexOptions {
    fn default() -> Self {
        Self {
            file: None,
            max_free_text_bytes: DEFAULT_MAX_FREE_TEXT_BYTES,
        }
    }
}

impl LexOptions {
    pub fn for_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }
}

/// Tokenize source text with default options.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source, LexOptions::default()).tokenize()
}

/// Tokenize source text read from a named file.
pub fn tokenize_file(source: &str, file: impl Into<String>) -> Result<Vec<Token>, LexError> {
    Lexer::new(source, LexOptions::for_file(file)).tokenize()
}

/// Single-pass scanner over the input characters.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    options: LexOptions,
}

impl Lexer {
    pub fn new(input: &str, options: LexOptions) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            options,
        }
    }

    /// Scan the whole input, ending with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::Eof, "", self.location()));
                break;
            }
            tokens.push(self.next_token()?);
        }
        tracing::trace!(tokens = tokens.len(), "lexed source");
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let location = self.location();
        let ch = self.peek().expect("next_token called at end of input");

        if ch == '`' {
            return self.read_free_text(location);
        }
        if ch == '"' {
            return self.read_string(location);
        }
        if ch.is_ascii_digit() {
            return self.read_number(location);
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            return Ok(self.read_identifier(location));
        }

        self.read_punctuation(location)
    }

    // Whitespace and comments carry no tokens.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\n') | Some('\r') => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_punctuation(&mut self, location: Location) -> Result<Token, LexError> {
        let ch = self.advance().unwrap();
        let next = self.peek();

        let (kind, raw) = match (ch, next) {
            ('*', Some('*')) => {
                self.advance();
                (TokenKind::StarStar, "**")
            }
            ('=', Some('=')) => {
                self.advance();
                (TokenKind::EqEq, "==")
            }
            ('!', Some('=')) => {
                self.advance();
                (TokenKind::NotEq, "!=")
            }
            ('<', Some('=')) => {
                self.advance();
                (TokenKind::LtEq, "<=")
            }
            ('>', Some('=')) => {
                self.advance();
                (TokenKind::GtEq, ">=")
            }
            ('&', Some('&')) => {
                self.advance();
                (TokenKind::AndAnd, "&&")
            }
            ('|', Some('|')) => {
                self.advance();
                (TokenKind::OrOr, "||")
            }
            ('[', _) => (TokenKind::LBracket, "["),
            (']', _) => (TokenKind::RBracket, "]"),
            ('(', _) => (TokenKind::LParen, "("),
            (')', _) => (TokenKind::RParen, ")"),
            ('{', _) => (TokenKind::LBrace, "{"),
            ('}', _) => (TokenKind::RBrace, "}"),
            (',', _) => (TokenKind::Comma, ","),
            (':', _) => (TokenKind::Colon, ":"),
            ('.', _) => (TokenKind::Dot, "."),
            ('=', _) => (TokenKind::Equals, "="),
            ('@', _) => (TokenKind::At, "@"),
            ('#', _) => (TokenKind::Hash, "#"),
            ('$', _) => (TokenKind::Dollar, "$"),
            ('<', _) => (TokenKind::Lt, "<"),
            ('>', _) => (TokenKind::Gt, ">"),
            ('+', _) => (TokenKind::Plus, "+"),
            ('-', _) => (TokenKind::Minus, "-"),
            ('*', _) => (TokenKind::Star, "*"),
            ('/', _) => (TokenKind::Slash, "/"),
            ('%', _) => (TokenKind::Percent, "%"),
            ('!', _) => (TokenKind::Bang, "!"),
            (other, _) => {
                return Err(LexError::new(
                    LexErrorKind::UnknownCharacter,
                    format!("unknown character '{}'", other),
                    location,
                ));
            }
        };

        Ok(Token::new(kind, raw, location))
    }

    fn read_identifier(&mut self, location: Location) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // `on-data` / `on-error` are the only keywords with a dash.
        if ident == "on" && self.peek() == Some('-') {
            for (suffix, keyword) in [("data", Keyword::OnData), ("error", Keyword::OnError)] {
                let after = 1 + suffix.len();
                if self.matches_ahead(1, suffix)
                    && !self
                        .peek_at(after)
                        .map(|c| c.is_ascii_alphanumeric() || c == '_')
                        .unwrap_or(false)
                {
                    for _ in 0..after {
                        self.advance();
                    }
                    let raw = format!("on-{}", suffix);
                    return Token::new(TokenKind::Keyword(keyword), raw, location);
                }
            }
        }

        let kind = match ident.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            "null" => TokenKind::Null,
            _ => match Keyword::from_ident(&ident) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Ident(ident.clone()),
            },
        };
        Token::new(kind, ident, location)
    }

    fn read_number(&mut self, location: Location) -> Result<Token, LexError> {
        let mut raw = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                raw.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.')
            && self
                .peek_at(1)
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            raw.push('.');
            self.advance();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    raw.push(ch);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let value: f64 = raw.parse().map_err(|_| {
            LexError::new(
                LexErrorKind::MalformedNumber,
                format!("malformed number literal '{}'", raw),
                location.clone(),
            )
        })?;
        Ok(Token::new(TokenKind::Number(value), raw, location))
    }

    fn read_string(&mut self, location: Location) -> Result<Token, LexError> {
        let mut raw = String::from("\"");
        let mut value = String::new();
        self.advance(); // opening quote

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedString,
                        "unterminated string literal",
                        location,
                    ));
                }
                Some('"') => {
                    raw.push('"');
                    self.advance();
                    break;
                }
                Some('\\') => {
                    raw.push('\\');
                    self.advance();
                    let escape = self.peek().ok_or_else(|| {
                        LexError::new(
                            LexErrorKind::UnterminatedString,
                            "unterminated string literal",
                            location.clone(),
                        )
                    })?;
                    raw.push(escape);
                    let resolved = match escape {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        other => {
                            return Err(LexError::new(
                                LexErrorKind::UnknownCharacter,
                                format!("unknown escape sequence '\\{}'", other),
                                self.location(),
                            ));
                        }
                    };
                    value.push(resolved);
                    self.advance();
                }
                Some(ch) => {
                    raw.push(ch);
                    value.push(ch);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::Str(value), raw, location))
    }

    /// Free-text mode. The opening run of N >= 3 backticks fixes the
    /// delimiter length; content is consumed verbatim until a run of
    /// exactly N backticks not followed by another backtick. A run of
    /// 2N backticks (even length >= 6) is an empty block with delimiter
    /// N.
    fn read_free_text(&mut self, location: Location) -> Result<Token, LexError> {
        let mut opening = 0usize;
        while self.peek() == Some('`') {
            opening += 1;
            self.advance();
        }

        if opening < 3 {
            return Err(LexError::new(
                LexErrorKind::UnknownCharacter,
                format!(
                    "free-text blocks open with at least 3 backticks, found {}",
                    opening
                ),
                location,
            ));
        }

        if opening >= 6 && opening % 2 == 0 {
            let delim_len = opening / 2;
            let raw = "`".repeat(opening);
            return Ok(Token::new(
                TokenKind::FreeText {
                    content: String::new(),
                    delim_len,
                },
                raw,
                location,
            ));
        }

        let delim_len = opening;
        let mut content = String::new();
        let mut content_bytes = 0usize;

        loop {
            match self.peek() {
                None => {
                    return Err(LexError::new(
                        LexErrorKind::UnterminatedFreeText,
                        format!(
                            "unterminated free-text block, expected closing run of {} backticks",
                            delim_len
                        ),
                        location,
                    ));
                }
                Some('`') => {
                    let mut run = 0usize;
                    while self.peek() == Some('`') {
                        run += 1;
                        self.advance();
                    }
                    if run == delim_len {
                        break;
                    }
                    // A run of the wrong length is ordinary content.
                    for _ in 0..run {
                        content.push('`');
                    }
                    content_bytes += run;
                }
                Some(ch) => {
                    content.push(ch);
                    content_bytes += ch.len_utf8();
                    self.advance();
                }
            }

            if content_bytes > self.options.max_free_text_bytes {
                return Err(LexError::new(
                    LexErrorKind::FreeTextTooLarge,
                    format!(
                        "free-text block exceeds {} bytes",
                        self.options.max_free_text_bytes
                    ),
                    location,
                ));
            }
        }

        let raw = format!(
            "{}{}{}",
            "`".repeat(delim_len),
            content,
            "`".repeat(delim_len)
        );
        Ok(Token::new(
            TokenKind::FreeText { content, delim_len },
            raw,
            location,
        ))
    }

    fn location(&self) -> Location {
        Location::new(self.options.file.clone(), self.line, self.column)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn matches_ahead(&self, offset: usize, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(i, ch)| self.peek_at(offset + i) == Some(ch))
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            // Tabs advance the column by one, like any other character.
            self.column += 1;
        }
        Some(ch)
    }
}
