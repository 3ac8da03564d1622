//! Tests for service calls, retries, fallbacks, and environment access

use super::helpers::{
    actions, error_message, output, parse_unchecked, parse_validated, quiet_connectors,
    run_program, run_with_shop, workflow,
};
use crate::executor::connector::{
    ConnectorError, ConnectorTable, ScriptedConnector, ServiceResponse,
};
use crate::executor::types::ast::ServiceKind;
use crate::executor::{
    execute_workflow, ExecutionInput, Interpreter, Outcome, RunOptions, Value, WorkflowResult,
};
use indexmap::IndexMap;
use maplit::hashmap;
use serde_json::json;
use std::time::Duration;

/* ===================== Calls ===================== */

#[tokio::test]
async fn test_call_builds_request_and_binds_result() {
    let shop = ScriptedConnector::new().then_respond(Value::from_json(json!({"name": "Ada"})));
    let body = "set id to 7\nget customer details using Shop at \"/customers/{id}\" with currency \"usd\" and limit 2\n    save the result as customer\ncomplete with name customer.name";
    let report = run_with_shop(body, shop.clone()).await;

    assert_eq!(output(&report)["name"], Value::text("Ada"));

    let requests = shop.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.service, "Shop");
    assert_eq!(request.kind, ServiceKind::Api);
    assert_eq!(request.target, "https://shop.example.com");
    assert_eq!(request.verb, "get");
    assert_eq!(request.method(), "GET");
    assert_eq!(request.description, "customer details");
    assert_eq!(request.path.as_deref(), Some("/customers/7"));
    assert_eq!(request.params["currency"], Value::text("usd"));
    assert_eq!(request.params["limit"], Value::Number(2.0));

    assert_eq!(actions(&report), vec!["get customer details using Shop"]);
    assert_eq!(report.log[0].outcome, Outcome::Success);
}

#[tokio::test]
async fn test_default_result_binding() {
    let shop = ScriptedConnector::new().then_respond(Value::Number(4.0));
    let report = run_with_shop("check stock using Shop\ncomplete with stock result", shop).await;
    assert_eq!(output(&report)["stock"], Value::Number(4.0));
}

#[tokio::test]
async fn test_status_and_headers_bindings() {
    let response = ServiceResponse::ok(Value::Absent)
        .with_status(201)
        .with_headers(IndexMap::from([("etag".to_string(), "abc".to_string())]));
    let shop = ScriptedConnector::new().then(Ok(response));
    let body = "create order using Shop\n    save the status as code\n    save the headers as meta\ncomplete with code code and etag meta.etag";
    let report = run_with_shop(body, shop).await;

    let out = output(&report);
    assert_eq!(out["code"], Value::Number(201.0));
    assert_eq!(out["etag"], Value::text("abc"));
}

#[tokio::test]
async fn test_missing_status_binds_absent() {
    let shop = ScriptedConnector::new().then_respond(Value::Bool(true));
    let body = "create order using Shop\n    save the status as code\ncomplete with known (code exists)";
    let report = run_with_shop(body, shop).await;
    assert_eq!(output(&report)["known"], Value::Bool(false));
}

#[tokio::test]
async fn test_failure_without_handler_is_fatal() {
    let shop = ScriptedConnector::new().then_fail("connection refused");
    let report = run_with_shop("get stock using Shop\nlog \"never\"", shop).await;

    assert_eq!(
        error_message(&report),
        "Service 'Shop' failed: connection refused"
    );
    assert_eq!(actions(&report), vec!["get stock using Shop"]);
    assert_eq!(report.log[0].outcome, Outcome::Failure);
}

#[tokio::test]
async fn test_missing_connector_is_fatal() {
    let program = parse_validated(&workflow("get stock using Shop"));
    let report = run_program(&program, json!({}), &ConnectorTable::new()).await;
    assert_eq!(
        error_message(&report),
        "No connector is available for service 'Shop'"
    );
}

/* ===================== Retry ===================== */

#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let shop = ScriptedConnector::new()
        .then_fail("timeout")
        .then_fail("timeout")
        .then_respond(Value::text("ok"));
    let body = "get stock using Shop\n    on failure:\n        retry 2 times waiting 1 seconds\ncomplete with stock result";
    let report = run_with_shop(body, shop.clone()).await;

    assert_eq!(output(&report)["stock"], Value::text("ok"));
    assert_eq!(shop.requests().await.len(), 3);

    let call_entries: Vec<&str> = actions(&report)
        .into_iter()
        .filter(|action| *action != "wait")
        .collect();
    assert_eq!(call_entries, vec!["retry", "retry", "get stock using Shop"]);

    let retries: Vec<_> = report.entries_for("retry").collect();
    assert!(retries.iter().all(|e| e.outcome == Outcome::Failure));
    assert_eq!(retries[1].details["attempt"], 2);

    let waits: Vec<_> = report.entries_for("wait").collect();
    assert_eq!(waits.len(), 2);
    assert_eq!(waits[0].duration_ms, Some(1000));
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_between_attempts() {
    let shop = ScriptedConnector::new()
        .then_fail("busy")
        .then_respond(Value::Absent);
    let body = "get stock using Shop\n    on failure:\n        retry 3 times waiting 2 minutes";
    let started = tokio::time::Instant::now();
    let report = run_with_shop(body, shop).await;

    assert!(report.result.is_completed());
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_runs_fallback() {
    let shop = ScriptedConnector::new()
        .then_fail("down")
        .then_fail("down")
        .then_fail("down");
    let body = "get stock using Shop\n    on failure:\n        retry 2 times waiting 1 seconds\n        if still failing:\n            reject with \"Shop unavailable\"\nlog \"never\"";
    let report = run_with_shop(body, shop.clone()).await;

    assert_eq!(
        report.result,
        WorkflowResult::Rejected {
            message: "Shop unavailable".to_string()
        }
    );
    assert_eq!(shop.requests().await.len(), 3);

    let tail: Vec<&str> = actions(&report).into_iter().rev().take(2).collect();
    assert_eq!(tail, vec!["fallback", "get stock using Shop"]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_without_fallback_is_fatal() {
    let shop = ScriptedConnector::new().then_fail("down").then_fail("down");
    let body = "get stock using Shop\n    on failure:\n        retry 1 times";
    let report = run_with_shop(body, shop).await;
    assert_eq!(
        error_message(&report),
        "Service 'Shop' still failing after 2 attempts: down"
    );
}

#[tokio::test]
async fn test_fallback_without_retry() {
    let shop = ScriptedConnector::new().then_fail("down");
    let body = "get stock using Shop\n    save the result as stock\n    on failure:\n        set stock to 0\ncomplete with stock stock";
    let report = run_with_shop(body, shop.clone()).await;

    assert_eq!(output(&report)["stock"], Value::Number(0.0));
    assert_eq!(shop.requests().await.len(), 1);
}

#[tokio::test]
async fn test_wait_scale_zero_skips_waiting() {
    let shop = ScriptedConnector::new()
        .then_fail("busy")
        .then_respond(Value::Absent);
    let program = parse_validated(&workflow(
        "get stock using Shop\n    on failure:\n        retry 1 times waiting 30 seconds",
    ));
    let connectors = quiet_connectors().with_service("Shop", shop);
    let options = RunOptions {
        retry_wait_scale: 0.0,
        ..RunOptions::default()
    };
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        execute_workflow(&program, ExecutionInput::new(json!({})), &connectors, &options),
    )
    .await
    .expect("run should not wait");

    assert!(report.result.is_completed());
    assert_eq!(report.entries_for("wait").count(), 0);
}

/* ===================== Ask ===================== */

#[tokio::test]
async fn test_ask_sends_rendered_prompt() {
    let writer = ScriptedConnector::new().then_respond(Value::text("Thanks, Ada!"));
    let program = parse_validated(&workflow(
        "set who to \"Ada\"\nask Writer to \"Thank {who}\" with tone \"warm\"\n    save the result as note\ncomplete with note note",
    ));
    let connectors = quiet_connectors().with_service("Writer", writer.clone());
    let report = run_program(&program, json!({}), &connectors).await;

    assert_eq!(output(&report)["note"], Value::text("Thanks, Ada!"));
    let requests = writer.requests().await;
    assert_eq!(requests[0].verb, "ask");
    assert_eq!(requests[0].kind, ServiceKind::Ai);
    assert_eq!(requests[0].description, "Thank Ada");
    assert_eq!(requests[0].params["tone"], Value::text("warm"));
    assert_eq!(actions(&report), vec!["ask Writer"]);
}

#[tokio::test]
async fn test_kind_connector_serves_undeclared_name() {
    let ai = ScriptedConnector::new().then(Err(ConnectorError::Timeout));
    let program = parse_validated(&workflow("ask Writer to \"hi\""));
    let connectors = ConnectorTable::new().with_kind(ServiceKind::Ai, ai);
    let report = run_program(&program, json!({}), &connectors).await;
    assert_eq!(
        error_message(&report),
        "Service 'Writer' failed: request timed out"
    );
}

/* ===================== Environment ===================== */

fn header_program() -> crate::executor::types::ast::Program {
    parse_validated(
        "services:\n    Shop is an API at \"https://shop.example.com\"\n        with headers:\n            Authorization: \"Bearer {env.SHOP_TOKEN}\"\n\nworkflow:\n    get stock using Shop\n    complete with region env.REGION",
    )
}

#[tokio::test]
async fn test_headers_evaluated_from_env() {
    let shop = ScriptedConnector::new().then_respond(Value::Absent);
    let connectors = ConnectorTable::new().with_service("Shop", shop.clone());
    let input = ExecutionInput::new(json!({}))
        .with_env("SHOP_TOKEN", "s3cret")
        .with_env("REGION", "eu");
    let report =
        execute_workflow(&header_program(), input, &connectors, &RunOptions::default()).await;

    assert_eq!(output(&report)["region"], Value::text("eu"));
    let requests = shop.requests().await;
    let expected = hashmap! { "Authorization" => "Bearer s3cret" };
    for (name, value) in expected {
        assert_eq!(requests[0].headers[name], value);
    }
}

#[tokio::test]
async fn test_missing_env_is_absent_with_warning() {
    let shop = ScriptedConnector::new().then_respond(Value::Absent);
    let connectors = ConnectorTable::new().with_service("Shop", shop);
    let report = execute_workflow(
        &header_program(),
        ExecutionInput::new(json!({})),
        &connectors,
        &RunOptions::default(),
    )
    .await;

    assert_eq!(output(&report)["region"], Value::Absent);
    let warnings: Vec<_> = report
        .log
        .iter()
        .filter(|e| e.outcome == Outcome::Skipped)
        .map(|e| e.action.as_str())
        .collect();
    assert_eq!(warnings, vec!["read env.SHOP_TOKEN", "read env.REGION"]);
}

#[tokio::test]
async fn test_strict_environment_fails_on_missing_env() {
    let connectors = ConnectorTable::new();
    let options = RunOptions {
        strict_environment: true,
        ..RunOptions::default()
    };
    let report = execute_workflow(
        &header_program(),
        ExecutionInput::new(json!({})),
        &connectors,
        &options,
    )
    .await;
    assert_eq!(
        error_message(&report),
        "Environment variable 'SHOP_TOKEN' is not set"
    );
    assert!(report.log.is_empty());
}

#[tokio::test]
async fn test_strict_from_config_block() {
    let program = parse_validated(&format!(
        "config:\n    strict: true\n\n{}",
        workflow("log env.API_KEY")
    ));
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    assert_eq!(error_message(&report), "Environment variable 'API_KEY' is not set");
}

#[tokio::test]
async fn test_environment_is_another_name_for_env() {
    let program = parse_validated(&workflow(
        "set same to env.API_KEY is environment.API_KEY\ncomplete with key environment.API_KEY and same same",
    ));
    let report = execute_workflow(
        &program,
        ExecutionInput::new(json!({})).with_env("API_KEY", "k-123"),
        &quiet_connectors(),
        &RunOptions::default(),
    )
    .await;

    let out = output(&report);
    assert_eq!(out["key"], Value::text("k-123"));
    assert_eq!(out["same"], Value::Bool(true));
}

#[tokio::test]
async fn test_strict_mode_covers_environment_spelling() {
    let program = parse_validated(&format!(
        "config:\n    strict: true\n\n{}",
        workflow("log environment.API_KEY")
    ));
    let report = run_program(&program, json!({}), &quiet_connectors()).await;
    assert_eq!(error_message(&report), "Environment variable 'API_KEY' is not set");
}

/* ===================== Deadline ===================== */

#[tokio::test(start_paused = true)]
async fn test_deadline_keeps_partial_log() {
    let shop = ScriptedConnector::new()
        .then_fail("slow")
        .then_respond(Value::Absent);
    let program = parse_validated(&format!(
        "config:\n    timeout: 5\n\n{}",
        workflow(
            "log \"start\"\nget stock using Shop\n    on failure:\n        retry 1 times waiting 1 minutes"
        )
    ));
    let connectors = quiet_connectors().with_service("Shop", shop);
    let report = run_program(&program, json!({}), &connectors).await;

    assert_eq!(error_message(&report), "Workflow did not finish within 5 seconds");
    assert_eq!(actions(&report), vec!["log", "retry"]);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_retry_wait_saturates() {
    let shop = ScriptedConnector::new()
        .then_fail("busy")
        .then_respond(Value::Number(3.0));
    let program = parse_unchecked(&workflow(
        "get stock using Shop\n    on failure:\n        retry 1 times waiting 99999999999999999999 seconds\ncomplete with stock result",
    ));
    let connectors = quiet_connectors().with_service("Shop", shop);
    let report = tokio::spawn(async move { run_program(&program, json!({}), &connectors).await })
        .await
        .expect("run must not panic");

    assert_eq!(output(&report)["stock"], Value::Number(3.0));
    let wait = report.entries_for("wait").next().unwrap();
    assert_eq!(wait.duration_ms, Some(u64::MAX));
}

#[tokio::test]
async fn test_oversized_timeout_means_no_deadline() {
    let program = parse_unchecked(&format!(
        "config:\n    timeout: 99999999999999999999\n\n{}",
        workflow("complete with done true")
    ));
    let report =
        tokio::spawn(async move { run_program(&program, json!({}), &quiet_connectors()).await })
            .await
            .expect("run must not panic");
    assert_eq!(output(&report)["done"], Value::Bool(true));
}

#[tokio::test]
async fn test_report_serializes_with_status_tag() {
    let shop = ScriptedConnector::new().then_respond(Value::Number(1.0));
    let report = run_with_shop("get stock using Shop\ncomplete with stock result", shop).await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["result"]["status"], "completed");
    assert_eq!(json["result"]["output"]["stock"], 1);
    assert_eq!(json["log"][0]["action"], "get stock using Shop");
    assert_eq!(json["execution_id"].as_str().map(str::len), Some(36));
}

#[tokio::test]
async fn test_interpreter_reused_across_runs() {
    let shop = ScriptedConnector::new()
        .then_fail("down")
        .then_respond(Value::Number(2.0))
        .then_respond(Value::Number(5.0));
    let interpreter =
        Interpreter::new(quiet_connectors().with_service("Shop", shop)).with_options(RunOptions {
            retry_wait_scale: 0.0,
            ..RunOptions::default()
        });
    assert_eq!(interpreter.options().retry_wait_scale, 0.0);

    let program = parse_validated(&workflow(
        "get stock using Shop\n    on failure:\n        retry 1 times waiting 10 seconds\ncomplete with stock result",
    ));

    let first = interpreter.run(&program, ExecutionInput::new(json!({}))).await;
    assert_eq!(output(&first)["stock"], Value::Number(2.0));
    assert_eq!(first.entries_for("retry").count(), 1);
    assert_eq!(first.entries_for("wait").count(), 0);

    let second = interpreter.run(&program, ExecutionInput::new(json!({}))).await;
    assert_eq!(output(&second)["stock"], Value::Number(5.0));
    assert_eq!(second.entries_for("retry").count(), 0);
    assert_ne!(first.execution_id, second.execution_id);
}
