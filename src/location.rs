//! Source location tracking
//!
//! Every token and AST node carries a `Location` naming the file (when
//! known), line, and column it came from. Lines and columns are 1-based;
//! a newline increments the line and resets the column, and tabs advance
//! the column by one.

use serde::{Deserialize, Serialize};

/// A point in an OX source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Source file path, when the text came from a file.
    pub file: Option<String>,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl Location {
    pub fn new(file: Option<String>, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    /// Location for text with no file association (string input, tests).
    pub fn anonymous(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self {
            file: None,
            line: 1,
            column: 1,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_and_without_file() {
        let loc = Location::new(Some("main.ox".to_string()), 3, 7);
        assert_eq!(loc.to_string(), "main.ox:3:7");
        assert_eq!(Location::anonymous(1, 1).to_string(), "1:1");
    }
}
