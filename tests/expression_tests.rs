//! Expression evaluation through the full pipeline
//!
//! Each case preprocesses a one-block document and checks the computed
//! property value, exercising precedence, associativity, string
//! semantics, truthiness, and failure modes end to end.

use rstest::rstest;

use oxdef::{preprocess_str, BuildError, PreprocessErrorKind, Value};

fn eval(expr: &str) -> Value {
    let source = format!("[B (v: ({}))]", expr);
    let document = preprocess_str(&source, None).unwrap();
    let value = document
        .blocks()
        .next()
        .unwrap()
        .properties
        .get("v")
        .cloned()
        .unwrap();
    value
}

fn eval_err(expr: &str) -> PreprocessErrorKind {
    let source = format!("[B (v: ({}))]", expr);
    match preprocess_str(&source, None).unwrap_err() {
        BuildError::Preprocess(error) => error.kind,
        other => panic!("expected preprocess error, got {:?}", other),
    }
}

// =============================================================================
// Arithmetic and precedence
// =============================================================================

#[rstest]
#[case("1 + 2", 3.0)]
#[case("2 + 3 * 4", 14.0)]
#[case("(2 + 3) * 4", 20.0)]
#[case("10 - 2 - 3", 5.0)]
#[case("20 / 4 / 5", 1.0)]
#[case("7 % 4", 3.0)]
#[case("2 ** 10", 1024.0)]
#[case("2 ** 3 ** 2", 512.0)]
#[case("-3 + 10", 7.0)]
#[case("-(2 + 3)", -5.0)]
#[case("1 + 2 * 3 ** 2", 19.0)]
fn arithmetic(#[case] expr: &str, #[case] expected: f64) {
    assert_eq!(eval(expr), Value::number(expected));
}

// =============================================================================
// Comparison and logic
// =============================================================================

#[rstest]
#[case("1 < 2", true)]
#[case("2 <= 2", true)]
#[case("3 > 4", false)]
#[case("1 == 1", true)]
#[case("1 != 1", false)]
#[case("\"abc\" == \"abc\"", true)]
#[case("\"apple\" < \"banana\"", true)]
#[case("\"b\" >= \"a\"", true)]
#[case("true && false", false)]
#[case("true || false", true)]
#[case("!false", true)]
#[case("!0", true)]
#[case("!\"\"", true)]
#[case("1 < 2 && 2 < 3", true)]
#[case("null || \"fallback\"", true)]
fn comparison_and_logic(#[case] expr: &str, #[case] expected: bool) {
    assert_eq!(eval(expr), Value::bool(expected));
}

// =============================================================================
// Strings
// =============================================================================

#[rstest]
#[case("\"a\" + \"b\"", "ab")]
#[case("\"n = \" + 42", "n = 42")]
#[case("\"half: \" + 0.5", "half: 0.5")]
#[case("100 + \"px\"", "100px")]
#[case("\"is \" + true", "is true")]
fn string_concatenation(#[case] expr: &str, #[case] expected: &str) {
    assert_eq!(eval(expr), Value::string(expected));
}

// =============================================================================
// Failures
// =============================================================================

#[rstest]
#[case("1 / 0")]
#[case("5 % 0")]
#[case("true * 2")]
#[case("\"a\" - 1")]
#[case("null ** 2")]
#[case("missing_var + 1")]
fn evaluation_errors(#[case] expr: &str) {
    assert_eq!(eval_err(expr), PreprocessErrorKind::Evaluation);
}

// =============================================================================
// Scope interaction
// =============================================================================

#[test]
fn set_chain_threads_through_expressions() {
    let document = preprocess_str(
        "<set base = 10>\
         <set doubled = (base * 2)>\
         [B (v: (doubled + base))]",
        None,
    )
    .unwrap();
    let block = document.blocks().next().unwrap();
    assert_eq!(block.properties.get("v"), Some(&Value::number(30.0)));
}

#[test]
fn later_set_shadows_earlier() {
    let document = preprocess_str(
        "<set x = 1> [A (v: x)] <set x = 2> [B (v: x)]",
        None,
    )
    .unwrap();
    let values: Vec<_> = document
        .blocks()
        .map(|b| b.properties.get("v").cloned().unwrap())
        .collect();
    assert_eq!(values, vec![Value::number(1.0), Value::number(2.0)]);
}

#[test]
fn arrays_flow_through_scope() {
    let document = preprocess_str(
        "<set xs = {1, 2, 3}> [B (all: xs, n: ($this.all.length))]",
        None,
    )
    .unwrap();
    let block = document.blocks().next().unwrap();
    assert_eq!(block.properties.get("n"), Some(&Value::number(3.0)));
}
