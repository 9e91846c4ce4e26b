//! Parser integration tests: structure, ordering, dedent, round-trips
//!
//! Includes the universally quantified invariants: round-trip equality
//! for pure-data documents (rendered back to OX source and reparsed,
//! plus serde JSON), dedent idempotence, and the free-text merge
//! identity.

use proptest::prelude::*;
use rstest::rstest;

use oxdef::ast::{Document, Literal, Node, Value};
use oxdef::parser::{dedent_text, strip_common_indent};
use oxdef::parse_str;

// =============================================================================
// Helpers: a minimal renderer for pure-data documents (tests only; the
// core deliberately ships no serializer)
// =============================================================================

fn render_value(value: &Value) -> String {
    match value {
        Value::Literal(Literal::String(s)) => format!("{:?}", s),
        Value::Literal(literal) => literal.render(),
        Value::Array(items) => {
            let rendered: Vec<_> = items.iter().map(render_value).collect();
            format!("{{{}}}", rendered.join(", "))
        }
        other => panic!("renderer only handles pure data, got {:?}", other),
    }
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Block(block) => {
            let mut out = String::from("[");
            if let Some(id) = &block.id {
                out.push_str(id);
            }
            if !block.properties.is_empty() {
                let rendered: Vec<_> = block
                    .properties
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, render_value(value)))
                    .collect();
                out.push_str(&format!(" ({})", rendered.join(", ")));
            }
            for child in &block.children {
                out.push(' ');
                out.push_str(&render_node(child));
            }
            out.push(']');
            out
        }
        other => panic!("renderer only handles blocks, got {:?}", other),
    }
}

fn render_document(document: &Document) -> String {
    document
        .nodes
        .iter()
        .map(render_node)
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn scenario_basic_block_and_properties() {
    let document = parse_str("[Player (name: \"Hero\", health: 100)]", None).unwrap();
    let player = document.blocks().next().unwrap();
    assert_eq!(player.id.as_deref(), Some("Player"));
    assert_eq!(player.properties.get("name"), Some(&Value::string("Hero")));
    assert_eq!(
        player.properties.get("health"),
        Some(&Value::number(100.0))
    );
    assert!(player.children.is_empty());
}

#[rstest]
#[case("[A]", 1)]
#[case("[A] [B]", 2)]
#[case("[A [B [C]]] [D]", 2)]
fn top_level_block_counts(#[case] source: &str, #[case] expected: usize) {
    let document = parse_str(source, None).unwrap();
    assert_eq!(document.blocks().count(), expected);
}

#[test]
fn locations_point_into_source() {
    let document = parse_str("[A]\n  [B]", Some("x.ox")).unwrap();
    let b = document.blocks().nth(1).unwrap();
    assert_eq!(b.location.file.as_deref(), Some("x.ox"));
    assert_eq!(b.location.line, 2);
    assert_eq!(b.location.column, 3);
}

#[test]
fn template_nesting_round_trips_structurally() {
    let source = "<if (mode == 1)> [A <foreach (x in xs)> [B] </foreach>] <else> [C] </if>";
    let document = parse_str(source, None).unwrap();
    assert_eq!(document.nodes.len(), 1);
    assert!(matches!(document.nodes[0], Node::Template(_)));
}

// =============================================================================
// Dedent (scenario 8) and its idempotence invariant
// =============================================================================

#[test]
fn scenario_free_text_dedent() {
    let input = "\n    line one\n      line two\n    line three\n";
    assert_eq!(dedent_text(input), "line one\n  line two\nline three");
}

#[rstest]
#[case("no indent", "no indent")]
#[case("\n  two\n  two\n", "two\ntwo")]
#[case("\n\tx\n", "x")]
#[case("\n   a\n\n   b\n", "a\n\nb")]
fn dedent_cases(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(dedent_text(input), expected);
}

proptest! {
    // Indent stripping is idempotent on any input: after one pass, the
    // minimum indent is zero.
    #[test]
    fn strip_common_indent_idempotent(content in "[a-z \t\n]{0,200}") {
        let once = strip_common_indent(&content);
        prop_assert_eq!(strip_common_indent(&once), once);
    }

    // Full dedent is idempotent on canonically authored content: lines
    // of indented text framed by the delimiter newlines.
    #[test]
    fn dedent_idempotent_on_authored_content(
        lines in prop::collection::vec(("[ ]{0,6}", "[a-z]{1,8}"), 1..8)
    ) {
        let body: Vec<String> = lines
            .iter()
            .map(|(indent, text)| format!("{}{}", indent, text))
            .collect();
        let content = format!("\n{}\n", body.join("\n"));
        let once = dedent_text(&content);
        prop_assert_eq!(dedent_text(&once), once);
    }
}

// =============================================================================
// Free-text merging invariant
// =============================================================================

#[test]
fn merge_identity_joins_with_blank_line() {
    // Merging at parse time equals rendering each block and joining
    // with "\n\n".
    let parts = ["alpha", "beta", "gamma"];
    let source = format!(
        "[B {}]",
        parts
            .iter()
            .map(|p| format!("```{}```", p))
            .collect::<Vec<_>>()
            .join(" ")
    );
    let document = parse_str(&source, None).unwrap();
    let block = document.blocks().next().unwrap();
    assert_eq!(block.children.len(), 1);
    match &block.children[0] {
        Node::FreeText(text) => assert_eq!(text.value, parts.join("\n\n")),
        other => panic!("expected merged free text, got {:?}", other),
    }
}

#[test]
fn merged_span_covers_first_to_last() {
    let document = parse_str("[B ```one```\n```two```]", None).unwrap();
    let block = document.blocks().next().unwrap();
    match &block.children[0] {
        Node::FreeText(text) => {
            assert_eq!(text.location.line, 1);
            assert_eq!(text.end.line, 2);
        }
        other => panic!("expected free text, got {:?}", other),
    }
}

// =============================================================================
// Round-trip invariants
// =============================================================================

#[rstest]
#[case("[A (x: 1, y: \"two\", z: true, w: null)]")]
#[case("[Outer (a: 1) [Inner (b: 2) [Leaf]]]")]
#[case("[L (items: {1, 2, {\"nested\", false}})]")]
#[case("[A] [B] [C (last: 3.5)]")]
fn pure_data_render_reparse_round_trip(#[case] source: &str) {
    let first = parse_str(source, None).unwrap();
    let rendered = render_document(&first);
    let second = parse_str(&rendered, None).unwrap();
    assert_eq!(first.nodes, second.nodes);
}

#[rstest]
#[case("[Player (name: \"Hero\", health: 100)]")]
#[case("[B #tag(Arg) ```text``` [C (v: ($parent.x + 1))]]")]
#[case("<set xs = {1, 2}> <foreach (x in xs)> [I (v: x)] </foreach>")]
fn serde_json_round_trip(#[case] source: &str) {
    let document = parse_str(source, None).unwrap();
    let json = serde_json::to_string(&document).unwrap();
    let back: Document = serde_json::from_str(&json).unwrap();
    assert_eq!(document, back);
}

proptest! {
    // Property lists of arbitrary literals survive render → reparse,
    // preserving order and values.
    #[test]
    fn property_lists_round_trip(
        literals in prop::collection::vec(
            prop_oneof![
                (-1000i32..1000).prop_map(|n| Literal::Number(n as f64)),
                any::<bool>().prop_map(Literal::Bool),
                "[a-z]{0,12}".prop_map(Literal::String),
                Just(Literal::Null),
            ],
            0..8,
        )
    ) {
        let rendered: Vec<String> = literals
            .iter()
            .enumerate()
            .map(|(index, literal)| {
                format!("k{}: {}", index, render_value(&Value::Literal(literal.clone())))
            })
            .collect();
        let source = if rendered.is_empty() {
            "[B]".to_string()
        } else {
            format!("[B ({})]", rendered.join(", "))
        };

        let document = parse_str(&source, None).unwrap();
        let block = document.blocks().next().unwrap();
        prop_assert_eq!(block.properties.len(), literals.len());
        for (index, literal) in literals.iter().enumerate() {
            let key = format!("k{}", index);
            prop_assert_eq!(
                block.properties.get(&key),
                Some(&Value::Literal(literal.clone()))
            );
        }
        // Ordering preserved.
        let keys: Vec<String> = block.properties.keys().cloned().collect();
        let expected: Vec<String> =
            (0..literals.len()).map(|i| format!("k{}", i)).collect();
        prop_assert_eq!(keys, expected);
    }
}
