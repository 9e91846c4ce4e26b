//! Free-text dedent and adjacent-node merging
//!
//! Raw free-text content keeps the indentation it had in the source
//! file. Dedent normalizes it: one leading and one trailing newline are
//! trimmed, the minimum indentation across non-blank lines is measured
//! (tabs count as four columns for measurement only), and that many
//! columns are stripped from every non-blank line. Blank lines pass
//! through unchanged.

use crate::ast::nodes::{FreeTextNode, Node};

/// Tab width used for indent measurement.
const TAB_WIDTH: usize = 4;

/// Full dedent: newline trim plus indent stripping.
pub fn dedent(content: &str) -> String {
    let trimmed = content
        .strip_prefix('\n')
        .unwrap_or(content);
    let trimmed = trimmed.strip_suffix('\n').unwrap_or(trimmed);
    strip_common_indent(trimmed)
}

/// Strip the common indentation from every non-blank line. Idempotent:
/// after one pass the minimum indent is zero.
pub fn strip_common_indent(content: &str) -> String {
    let min_indent = content
        .split('\n')
        .filter(|line| !is_blank(line))
        .map(indent_width)
        .min()
        .unwrap_or(0);

    if min_indent == 0 {
        return content.to_string();
    }

    content
        .split('\n')
        .map(|line| {
            if is_blank(line) {
                line
            } else {
                strip_columns(line, min_indent)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_blank(line: &str) -> bool {
    line.chars().all(|ch| ch == ' ' || ch == '\t')
}

/// Leading whitespace width in columns, tabs expanding to four.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH,
            _ => break,
        }
    }
    width
}

/// Drop leading whitespace characters until at least `columns` columns
/// have been removed.
fn strip_columns(line: &str, columns: usize) -> &str {
    let mut stripped = 0;
    for (index, ch) in line.char_indices() {
        if stripped >= columns {
            return &line[index..];
        }
        match ch {
            ' ' => stripped += 1,
            '\t' => stripped += TAB_WIDTH,
            _ => return &line[index..],
        }
    }
    ""
}

/// Merge adjacent free-text siblings with identical tag lists by
/// joining their values with a blank line. The merged node keeps the
/// first node's location with a span ending at the last; its raw form
/// is dropped since it no longer maps to a single source block.
pub fn merge_adjacent_free_text(nodes: Vec<Node>) -> Vec<Node> {
    let mut merged: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match (merged.last_mut(), node) {
            (Some(Node::FreeText(previous)), Node::FreeText(next))
                if previous.same_tags(&next) =>
            {
                previous.value.push_str("\n\n");
                previous.value.push_str(&next.value);
                previous.end = next.end;
                previous.raw = None;
            }
            (_, node) => merged.push(node),
        }
    }
    merged
}
