//! Tests for control flow, loops, steps, and the global bindings of a run

use super::helpers::{
    actions, error_message, output, parse_unchecked, parse_validated, quiet_connectors, run_body,
    run_program, workflow,
};
use crate::executor::{Outcome, Value, WorkflowResult};
use serde_json::json;

/* ===================== Complete / Reject ===================== */

#[tokio::test]
async fn test_complete_halts_execution() {
    let report = run_body("log \"first\"\ncomplete with status \"done\"\nlog \"never\"").await;

    assert_eq!(output(&report)["status"], Value::text("done"));
    let messages: Vec<_> = report
        .entries_for("log")
        .map(|entry| entry.details["message"].clone())
        .collect();
    assert_eq!(messages, vec![json!("first")]);
}

#[tokio::test]
async fn test_reject_inside_loop_unwinds() {
    let report = run_body(
        "for each n in [1, 2, 3]:\n    if n is 2:\n        reject with \"bad item {n}\"\n    log \"item {n}\"\nlog \"after loop\"",
    )
    .await;

    assert_eq!(
        report.result,
        WorkflowResult::Rejected {
            message: "bad item 2".to_string()
        }
    );
    assert_eq!(report.entries_for("log").count(), 1);
}

#[tokio::test]
async fn test_workflow_without_complete_has_empty_output() {
    let report = run_body("set x to 1").await;
    assert!(output(&report).is_empty());
}

#[tokio::test]
async fn test_missing_workflow_block_completes() {
    let program = parse_validated("config:\n    name: \"empty\"\n");
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    assert!(report.result.is_completed());
    assert!(report.log.is_empty());
}

/* ===================== If ===================== */

#[tokio::test]
async fn test_if_chain_picks_first_true_branch() {
    let body = "set total to 75\nif total is above 100:\n    set size to \"big\"\notherwise if total is at least 50:\n    set size to \"medium\"\notherwise:\n    set size to \"small\"\ncomplete with size size";
    let report = run_body(body).await;
    assert_eq!(output(&report)["size"], Value::text("medium"));
}

#[tokio::test]
async fn test_if_without_match_falls_through() {
    let report = run_body("set x to 1\nif x is 2:\n    set x to 3\ncomplete with x x").await;
    assert_eq!(output(&report)["x"], Value::Number(1.0));
}

#[tokio::test]
async fn test_if_uses_truthiness() {
    let report = run_body(
        "set items to []\nset label to \"none\"\nif items:\n    set label to \"some\"\ncomplete with label label",
    )
    .await;
    assert_eq!(output(&report)["label"], Value::text("none"));
}

/* ===================== For Each ===================== */

#[tokio::test]
async fn test_loop_accumulates_into_outer_variable() {
    let program = parse_validated(&workflow(
        "set total to 0\nfor each item in request.items:\n    set total to total plus item.price\ncomplete with total total",
    ));
    let request = json!({"items": [{"price": 10}, {"price": 2.5}, {"price": 7.5}]});
    let report = run_program(&program, request, &quiet_connectors()).await;
    assert_eq!(output(&report)["total"], Value::Number(20.0));
}

#[tokio::test]
async fn test_loop_over_record_yields_key_value() {
    let program = parse_validated(&workflow(
        "set keys to \"\"\nfor each entry in request.counts:\n    set keys to keys plus entry.key\ncomplete with keys keys",
    ));
    let report = run_program(
        &program,
        json!({"counts": {"b": 1, "a": 2}}),
        &quiet_connectors(),
    )
    .await;
    assert_eq!(output(&report)["keys"], Value::text("ba"));
}

#[tokio::test]
async fn test_loop_over_absent_is_skipped() {
    let report = run_body("for each item in request.items:\n    log \"x\"\ncomplete").await;

    assert!(report.result.is_completed());
    let skipped: Vec<_> = report.entries_for("for each item").collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].outcome, Outcome::Skipped);
    assert_eq!(report.entries_for("log").count(), 0);
}

#[tokio::test]
async fn test_loop_over_number_is_fatal() {
    let report = run_body("for each item in 5:\n    log \"x\"").await;
    assert_eq!(error_message(&report), "'for each' needs a list or record, found a number");
}

#[tokio::test]
async fn test_loop_name_is_gone_after_loop() {
    let program = parse_unchecked(&workflow("for each item in [1]:\n    log item\nlog item"));
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    assert_eq!(error_message(&report), "'item' is not set");
}

/* ===================== Steps ===================== */

#[tokio::test]
async fn test_steps_tag_log_entries() {
    let report = run_body(
        "step \"Prepare\":\n    log \"inside\"\n    step \"Inner\":\n        log \"deeper\"\nlog \"outside\"",
    )
    .await;

    let tagged: Vec<(&str, Option<&str>)> = report
        .log
        .iter()
        .map(|entry| (entry.action.as_str(), entry.step.as_deref()))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("enter step", Some("Prepare")),
            ("log", Some("Prepare")),
            ("enter step", Some("Inner")),
            ("log", Some("Inner")),
            ("exit step", Some("Inner")),
            ("exit step", Some("Prepare")),
            ("log", None),
        ]
    );
    assert!(report.log.iter().filter(|e| e.action == "exit step").all(|e| e.duration_ms.is_some()));
}

#[tokio::test]
async fn test_steps_share_variables() {
    let report = run_body(
        "step one:\n    set x to 1\nstep two:\n    set x to x plus 1\ncomplete with x x",
    )
    .await;
    assert_eq!(output(&report)["x"], Value::Number(2.0));
}

#[tokio::test]
async fn test_complete_inside_step_still_logs_exit() {
    let report = run_body("step \"Finish\":\n    complete\nlog \"never\"").await;
    assert!(report.result.is_completed());
    assert_eq!(actions(&report), vec!["enter step", "exit step"]);
}

/* ===================== Globals ===================== */

#[tokio::test]
async fn test_request_fields_are_exploded() {
    let program =
        parse_unchecked(&workflow("complete with who name and same (request.name is name)"));
    let report = run_program(&program, json!({"name": "Ada"}), &quiet_connectors()).await;
    let out = output(&report);
    assert_eq!(out["who"], Value::text("Ada"));
    assert_eq!(out["same"], Value::Bool(true));
}

#[tokio::test]
async fn test_explicit_request_field_wins() {
    let program = parse_unchecked(&workflow("complete with id request.id"));
    let report = run_program(
        &program,
        json!({"id": 1, "request": {"id": 2}}),
        &quiet_connectors(),
    )
    .await;
    assert_eq!(output(&report)["id"], Value::Number(2.0));
}

#[tokio::test]
async fn test_config_and_services_are_visible() {
    let source = format!(
        "config:\n    name: \"demo\"\n    version: 3\n\n{}",
        workflow("complete with title name and version version and shop Shop.target")
    );
    let program = parse_validated(&source);
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    let out = output(&report);
    assert_eq!(out["title"], Value::text("demo"));
    assert_eq!(out["version"], Value::Number(3.0));
    assert_eq!(out["shop"], Value::text("https://shop.example.com"));
}
