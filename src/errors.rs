//! Error types for all pipeline phases
//!
//! Two phases, two policies. Lex and parse errors are fail-fast: the
//! first one aborts the phase. Preprocess errors are collected where safe
//! and surfaced together; structural errors (paths, cycles, missing
//! files, unresolved references) short-circuit the current file, while
//! non-structural errors (a failed evaluation in one subtree) may be
//! downgraded to warnings with a null substitute in lenient mode.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// What went wrong inside the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexErrorKind {
    UnknownCharacter,
    UnterminatedString,
    UnterminatedFreeText,
    FreeTextTooLarge,
    MalformedNumber,
}

/// Fatal scanning error with the position it was detected at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    pub location: Location,
}

impl LexError {
    pub fn new(kind: LexErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }
}

impl std::fmt::Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lex error at {}: {}", self.location, self.message)
    }
}

impl std::error::Error for LexError {}

/// Fatal parse error. Carries an expected-token hint when the parser
/// knows what it was looking for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub location: Location,
    pub expected: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
            expected: None,
        }
    }

    pub fn expecting(
        message: impl Into<String>,
        expected: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            message: message.into(),
            location,
            expected: Some(expected.into()),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at {}: {}", self.location, self.message)?;
        if let Some(expected) = &self.expected {
            write!(f, " (expected {})", expected)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Classification of everything that can fail after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessErrorKind {
    /// `#tag` with no registered definition.
    UnresolvedTagInstance,
    /// Two `@tag` with the same key in the same namespace.
    DuplicateTagDefinition,
    /// Non-identifier inside `@tag(…)` / `#tag(…)`.
    InvalidTagArgument,
    /// OX source property shadows a module-injected name.
    ModulePropertyConflict,
    /// `$Id` with no block of that id in file scope.
    UnresolvedReference,
    /// Two blocks with the same id in one file.
    DuplicateBlockId,
    /// Property-chain resolution re-entered the same property.
    CircularReference,
    /// Arithmetic or logical operation on unsupported operands.
    Evaluation,
    /// `while` loop exceeded its iteration cap.
    WhileLimit,
    /// Data provider failed and no `on-error` branch was defined.
    DataSource,
    /// Import or inject cycle.
    CircularDependency,
    /// Import graph depth exceeded the limit.
    MaxDepthExceeded,
    /// Resolved path escapes the project base directory.
    PathTraversal,
    FileNotFound,
    FileTooLarge,
    /// Import alias failed the identifier/reserved-word check.
    InvalidImportAlias,
    /// A macro hook raised a user-defined error.
    MacroAbort,
}

impl PreprocessErrorKind {
    /// Structural errors short-circuit the current file; non-structural
    /// ones may be downgraded to warnings in lenient mode.
    pub fn is_structural(self) -> bool {
        !matches!(
            self,
            PreprocessErrorKind::Evaluation
                | PreprocessErrorKind::WhileLimit
                | PreprocessErrorKind::DataSource
                | PreprocessErrorKind::ModulePropertyConflict
        )
    }

    fn name(self) -> &'static str {
        match self {
            PreprocessErrorKind::UnresolvedTagInstance => "UnresolvedTagInstance",
            PreprocessErrorKind::DuplicateTagDefinition => "DuplicateTagDefinition",
            PreprocessErrorKind::InvalidTagArgument => "InvalidTagArgument",
            PreprocessErrorKind::ModulePropertyConflict => "ModulePropertyConflict",
            PreprocessErrorKind::UnresolvedReference => "UnresolvedReference",
            PreprocessErrorKind::DuplicateBlockId => "DuplicateBlockId",
            PreprocessErrorKind::CircularReference => "CircularReferenceError",
            PreprocessErrorKind::Evaluation => "EvaluationError",
            PreprocessErrorKind::WhileLimit => "WhileLimitError",
            PreprocessErrorKind::DataSource => "DataSourceError",
            PreprocessErrorKind::CircularDependency => "CircularDependencyError",
            PreprocessErrorKind::MaxDepthExceeded => "MaxDepthExceeded",
            PreprocessErrorKind::PathTraversal => "PathTraversalError",
            PreprocessErrorKind::FileNotFound => "FileNotFound",
            PreprocessErrorKind::FileTooLarge => "FileTooLarge",
            PreprocessErrorKind::InvalidImportAlias => "InvalidImportAlias",
            PreprocessErrorKind::MacroAbort => "MacroAbort",
        }
    }
}

/// An error raised during preprocessing, with location when one is known
/// and optional "did you mean"-style suggestion text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessError {
    pub kind: PreprocessErrorKind,
    pub message: String,
    pub location: Option<Location>,
    pub suggestion: Option<String>,
}

impl PreprocessError {
    pub fn new(kind: PreprocessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    pub fn at(kind: PreprocessErrorKind, message: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(location),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_structural(&self) -> bool {
        self.kind.is_structural()
    }
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.name())?;
        if let Some(location) = &self.location {
            write!(f, " at {}", location)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for PreprocessError {}

/// A non-fatal observation surfaced alongside the result: import
/// overrides, lenient-mode substitutions, and similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub location: Option<Location>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
        }
    }
}

/// Collection point for the preprocess phase: errors where collection is
/// safe, warnings always.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub errors: Vec<PreprocessError>,
    pub warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, error: PreprocessError) {
        self.errors.push(error);
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Fold collected errors into a single result, keeping warnings
    /// available on the success path.
    pub fn into_result(self) -> Result<Vec<Warning>, BuildError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else if self.errors.len() == 1 {
            Err(BuildError::Preprocess(
                self.errors.into_iter().next().unwrap(),
            ))
        } else {
            Err(BuildError::Collected(self.errors))
        }
    }
}

/// Top-level error for a project build, spanning every phase.
#[derive(Debug)]
pub enum BuildError {
    Lex(LexError),
    Parse(ParseError),
    Preprocess(PreprocessError),
    Collected(Vec<PreprocessError>),
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Lex(err) => write!(f, "{}", err),
            BuildError::Parse(err) => write!(f, "{}", err),
            BuildError::Preprocess(err) => write!(f, "{}", err),
            BuildError::Collected(errors) => {
                writeln!(f, "{} preprocessing errors:", errors.len())?;
                for err in errors {
                    writeln!(f, "  {}", err)?;
                }
                Ok(())
            }
            BuildError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Lex(err) => Some(err),
            BuildError::Parse(err) => Some(err),
            BuildError::Preprocess(err) => Some(err),
            BuildError::Collected(_) => None,
            BuildError::Io { source, .. } => Some(source),
        }
    }
}

impl From<LexError> for BuildError {
    fn from(err: LexError) -> Self {
        BuildError::Lex(err)
    }
}

impl From<ParseError> for BuildError {
    fn from(err: ParseError) -> Self {
        BuildError::Parse(err)
    }
}

impl From<PreprocessError> for BuildError {
    fn from(err: PreprocessError) -> Self {
        BuildError::Preprocess(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_classification() {
        assert!(PreprocessErrorKind::PathTraversal.is_structural());
        assert!(PreprocessErrorKind::CircularDependency.is_structural());
        assert!(PreprocessErrorKind::UnresolvedReference.is_structural());
        assert!(!PreprocessErrorKind::Evaluation.is_structural());
        assert!(!PreprocessErrorKind::DataSource.is_structural());
        assert!(!PreprocessErrorKind::WhileLimit.is_structural());
    }

    #[test]
    fn display_includes_location_and_suggestion() {
        let err = PreprocessError::at(
            PreprocessErrorKind::UnresolvedReference,
            "no block named 'Contnet'",
            Location::new(Some("a.ox".to_string()), 4, 12),
        )
        .with_suggestion("did you mean 'Content'?");
        let rendered = err.to_string();
        assert!(rendered.contains("UnresolvedReference at a.ox:4:12"));
        assert!(rendered.contains("did you mean 'Content'?"));
    }

    #[test]
    fn diagnostics_fold_to_result() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(Warning::new("override"));
        assert_eq!(diagnostics.clone().into_result().unwrap().len(), 1);

        diagnostics.error(PreprocessError::new(
            PreprocessErrorKind::Evaluation,
            "bad operand",
        ));
        assert!(diagnostics.into_result().is_err());
    }
}
