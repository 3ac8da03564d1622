//! Tests for arithmetic, comparisons, field access and interpolation

use super::helpers::{
    error_message, output, parse_unchecked, quiet_connectors, run_body, run_program, workflow,
};
use crate::executor::Value;
use serde_json::json;

/* ===================== Arithmetic ===================== */

#[tokio::test]
async fn test_arithmetic_is_left_to_right() {
    let report = run_body("complete with total 2 plus 3 times 4").await;
    assert_eq!(output(&report)["total"], Value::Number(20.0));
}

#[tokio::test]
async fn test_grouping_overrides_order() {
    let report = run_body("complete with total 2 plus (3 times 4)").await;
    assert_eq!(output(&report)["total"], Value::Number(14.0));
}

#[tokio::test]
async fn test_division_by_zero_is_fatal() {
    let report =
        run_body("set zero to 0\nlog \"before\"\nset ratio to 10 divided by zero\nlog \"after\"")
            .await;
    assert_eq!(error_message(&report), "Division by zero");

    let crate::executor::WorkflowResult::Errored { diagnostic } = &report.result else {
        unreachable!()
    };
    assert_eq!(diagnostic.line, 9);

    let logged: Vec<_> = report.entries_for("log").collect();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].details["message"], "before");
}

#[tokio::test]
async fn test_rounded_to_truncates() {
    let report = run_body(
        "complete with third 10 divided by 3 rounded to 2 and price 2.999 rounded to 1 places",
    )
    .await;
    let out = output(&report);
    assert_eq!(out["third"], Value::Number(3.33));
    assert_eq!(out["price"], Value::Number(2.9));
}

#[tokio::test]
async fn test_rounded_to_keeps_exact_digits() {
    let report = run_body(
        "set small to 0 minus 0.04\ncomplete with a 0.29 rounded to 2 and b 4.35 rounded to 2 and c 1.15 rounded to 2 and d 7.89 rounded to 0 and e small rounded to 1",
    )
    .await;
    let out = output(&report);
    assert_eq!(out["a"], Value::Number(0.29));
    assert_eq!(out["b"], Value::Number(4.35));
    assert_eq!(out["c"], Value::Number(1.15));
    assert_eq!(out["d"], Value::Number(7.0));
    assert_eq!(out["e"].render(), "0");
}

#[tokio::test]
async fn test_rounded_to_rejects_fractional_places() {
    let report = run_body("complete with x 1.5 rounded to 0.5").await;
    assert!(error_message(&report).contains("whole number of places"));
}

#[tokio::test]
async fn test_plus_joins_text() {
    let report = run_body("complete with name \"Ada\" plus \" Lovelace\"").await;
    assert_eq!(output(&report)["name"], Value::text("Ada Lovelace"));
}

#[tokio::test]
async fn test_plus_text_and_number_is_fatal() {
    let report = run_body("complete with name \"Order \" plus 5").await;
    assert_eq!(error_message(&report), "Cannot use 'plus' with text and a number");

    let crate::executor::WorkflowResult::Errored { diagnostic } = &report.result else {
        unreachable!()
    };
    assert!(diagnostic.hint.is_some());
}

/* ===================== Comparisons ===================== */

#[tokio::test]
async fn test_numeric_comparisons() {
    let report = run_body(
        "complete with a (5 is above 3) and b (5 is below 3) and c (5 is at least 5) and d (4 is at most 3)",
    )
    .await;
    let out = output(&report);
    assert_eq!(out["a"], Value::Bool(true));
    assert_eq!(out["b"], Value::Bool(false));
    assert_eq!(out["c"], Value::Bool(true));
    assert_eq!(out["d"], Value::Bool(false));
}

#[tokio::test]
async fn test_ordering_needs_numbers() {
    let report = run_body("complete with a (\"b\" is above 3)").await;
    assert_eq!(error_message(&report), "Cannot use 'is above' with text and a number");
}

#[tokio::test]
async fn test_contains() {
    let report = run_body(
        "complete with a (\"hello world\" contains \"world\") and b ([1, 2, 3] contains 2) and c ([1, 2] does not contain 5) and d (\"order 42\" contains 42)",
    )
    .await;
    let out = output(&report);
    assert_eq!(out["a"], Value::Bool(true));
    assert_eq!(out["b"], Value::Bool(true));
    assert_eq!(out["c"], Value::Bool(true));
    assert_eq!(out["d"], Value::Bool(true));
}

#[tokio::test]
async fn test_contains_on_number_is_fatal() {
    let report = run_body("complete with a (5 contains 5)").await;
    assert!(error_message(&report).contains("'contains'"));
}

#[tokio::test]
async fn test_equality_and_emptiness() {
    let report = run_body(
        "complete with a (\"x\" is \"x\") and b (1 is not 1) and c ([] is empty) and d (\"\" is not empty) and e (request.missing does not exist)",
    )
    .await;
    let out = output(&report);
    assert_eq!(out["a"], Value::Bool(true));
    assert_eq!(out["b"], Value::Bool(false));
    assert_eq!(out["c"], Value::Bool(true));
    assert_eq!(out["d"], Value::Bool(false));
    assert_eq!(out["e"], Value::Bool(true));
}

/* ===================== Logic ===================== */

#[tokio::test]
async fn test_and_short_circuits() {
    let report = run_body(
        "set zero to 0\nif request.flag exists and 1 divided by zero is 1:\n    log \"never\"\ncomplete",
    )
    .await;
    assert!(report.result.is_completed(), "{:?}", report.result);
}

#[tokio::test]
async fn test_or_short_circuits() {
    let report =
        run_body("set zero to 0\ncomplete with ok (1 is 1 or 1 divided by zero is 1)").await;
    assert_eq!(output(&report)["ok"], Value::Bool(true));
}

#[tokio::test]
async fn test_not_uses_truthiness() {
    let report = run_body("complete with a (not request.missing exists) and b (not 0 is 1)").await;
    let out = output(&report);
    assert_eq!(out["a"], Value::Bool(true));
    assert_eq!(out["b"], Value::Bool(true));
}

/* ===================== Fields and Names ===================== */

#[tokio::test]
async fn test_missing_field_and_unknown_root_are_absent() {
    let program = parse_unchecked(&workflow(
        "complete with a request.customer.name and b unknown.field and c request.nothing.deeper",
    ));
    let report = run_program(
        &program,
        json!({"customer": {"name": "Ada"}}),
        &quiet_connectors(),
    )
    .await;
    let out = output(&report);
    assert_eq!(out["a"], Value::text("Ada"));
    assert_eq!(out["b"], Value::Absent);
    assert_eq!(out["c"], Value::Absent);
}

#[tokio::test]
async fn test_field_of_text_is_fatal() {
    let report = run_body("set name to \"x\"\nlog name.first").await;
    assert_eq!(error_message(&report), "Cannot read field 'first' of text");
}

#[tokio::test]
async fn test_unset_name_is_fatal_at_runtime() {
    let program = parse_unchecked(&workflow("log missing"));
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    assert_eq!(error_message(&report), "'missing' is not set");
}

#[tokio::test]
async fn test_interpolation_renders_values() {
    let program = parse_unchecked(&workflow(
        "set count to 3\ncomplete with line \"{request.name} ordered {count} items, paid: {request.paid}\"",
    ));
    let report = run_program(
        &program,
        json!({"name": "Ada", "paid": true}),
        &quiet_connectors(),
    )
    .await;
    assert_eq!(output(&report)["line"], Value::text("Ada ordered 3 items, paid: true"));
}

#[tokio::test]
async fn test_list_literal() {
    let report = run_body("set n to 2\ncomplete with items [1, n plus 1, \"x\"]").await;
    assert_eq!(
        output(&report)["items"],
        Value::List(vec![Value::Number(1.0), Value::Number(3.0), Value::text("x")])
    );
}
