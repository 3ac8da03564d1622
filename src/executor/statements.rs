//! Statement execution
//!
//! Blocks run their statements in order until one produces a [`Flow`] other
//! than `Continue`; that flow then unwinds every enclosing block. Blocks are
//! boxed futures so `if`, `for each`, steps and fallbacks can nest freely.

use indexmap::IndexMap;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connector::{ServiceRequest, ServiceResponse};
use super::errors::{RuntimeError, RuntimeErrorKind};
use super::log::Outcome;
use super::retry::{RetryMachine, RetryState};
use super::types::ast::{
    AskCall, Bindings, ElseIf, ErrorHandler, Expr, OutputField, Param, ServiceCall, ServiceDecl,
    Span, Stmt,
};
use super::types::control::Flow;
use super::types::values::Value;
use super::Run;
use crate::parser::semantic_validator::rules::DEFAULT_RESULT_NAME;

type FlowFuture<'f> = Pin<Box<dyn Future<Output = Result<Flow, RuntimeError>> + Send + 'f>>;

/// What a call produced once retries are settled
enum CallOutcome {
    Responded(ServiceResponse),
    Fallback,
}

impl<'a> Run<'a> {
    /// Execute a block of statements
    pub(crate) fn exec_block<'f>(&'f mut self, body: &'f [Stmt]) -> FlowFuture<'f> {
        Box::pin(async move {
            for stmt in body {
                let flow = self.exec_stmt(stmt).await?;
                if !flow.is_continue() {
                    return Ok(flow);
                }
            }
            Ok(Flow::Continue)
        })
    }

    async fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Step { label, body, .. } => self.exec_step(label, body).await,

            Stmt::Set { name, value, .. } => {
                let value = self.eval(value)?;
                self.env.assign(name, value);
                Ok(Flow::Continue)
            }

            Stmt::If {
                test,
                then_body,
                else_ifs,
                else_body,
                ..
            } => self.exec_if(test, then_body, else_ifs, else_body.as_deref()).await,

            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => self.exec_for_each(binding, iterable, body).await,

            Stmt::Log { message, .. } => {
                let message = self.eval(message)?.render();
                info!(step = self.log.current_step(), "{}", message);
                self.log.record("log", Outcome::Success).details = json!({ "message": message });
                Ok(Flow::Continue)
            }

            Stmt::Complete { outputs, .. } => Ok(Flow::Completed(self.eval_outputs(outputs)?)),

            Stmt::Reject { message, .. } => Ok(Flow::Rejected(self.eval(message)?.render())),

            Stmt::Call(call) => self.exec_call(call).await,
            Stmt::Ask(ask) => self.exec_ask(ask).await,
        }
    }

    /* ===================== Blocks ===================== */

    async fn exec_step(&mut self, label: &str, body: &[Stmt]) -> Result<Flow, RuntimeError> {
        let previous = self.log.enter_step(label);
        debug!(step = label, "entering step");
        self.log.record("enter step", Outcome::Success);

        let started = Instant::now();
        let flow = self.exec_block(body).await;
        let outcome = if flow.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        let entry = self
            .log
            .entry("exit step", outcome)
            .with_duration(started.elapsed());
        self.log.push(entry);
        self.log.leave_step(previous);
        flow
    }

    async fn exec_if(
        &mut self,
        test: &Expr,
        then_body: &[Stmt],
        else_ifs: &[ElseIf],
        else_body: Option<&[Stmt]>,
    ) -> Result<Flow, RuntimeError> {
        if self.eval(test)?.is_truthy() {
            return self.exec_block(then_body).await;
        }
        for branch in else_ifs {
            if self.eval(&branch.test)?.is_truthy() {
                return self.exec_block(&branch.body).await;
            }
        }
        match else_body {
            Some(body) => self.exec_block(body).await,
            None => Ok(Flow::Continue),
        }
    }

    async fn exec_for_each(
        &mut self,
        binding: &str,
        iterable: &Expr,
        body: &[Stmt],
    ) -> Result<Flow, RuntimeError> {
        let items = match self.eval(iterable)? {
            Value::List(items) => items,
            Value::Record(fields) => fields
                .into_iter()
                .map(|(key, value)| {
                    Value::Record(IndexMap::from([
                        ("key".to_string(), Value::Text(key)),
                        ("value".to_string(), value),
                    ]))
                })
                .collect(),
            Value::Absent => {
                self.log
                    .record(format!("for each {}", binding), Outcome::Skipped)
                    .details = json!({ "reason": "nothing to loop over" });
                return Ok(Flow::Continue);
            }
            other => {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::NotIterable {
                        found: other.type_name(),
                    },
                    iterable.span(),
                ))
            }
        };

        for item in items {
            self.env.push_scope();
            self.env.define(binding, item);
            let flow = self.exec_block(body).await;
            self.env.pop_scope();

            let flow = flow?;
            if !flow.is_continue() {
                return Ok(flow);
            }
        }
        Ok(Flow::Continue)
    }

    fn eval_outputs(
        &mut self,
        outputs: &[OutputField],
    ) -> Result<IndexMap<String, Value>, RuntimeError> {
        let mut output = IndexMap::new();
        for field in outputs {
            let value = self.eval(&field.value)?;
            output.insert(field.name.clone(), value);
        }
        Ok(output)
    }

    fn eval_params(&mut self, params: &[Param]) -> Result<IndexMap<String, Value>, RuntimeError> {
        let mut values = IndexMap::new();
        for param in params {
            let value = self.eval(&param.value)?;
            values.insert(param.name.clone(), value);
        }
        Ok(values)
    }

    /* ===================== Service Calls ===================== */

    fn service_decl(&self, name: &str, span: Span) -> Result<&'a ServiceDecl, RuntimeError> {
        self.program.service(name).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::UnknownService {
                    service: name.to_string(),
                },
                span,
            )
        })
    }

    fn build_request(&self, decl: &ServiceDecl, verb: &str, description: String) -> ServiceRequest {
        ServiceRequest {
            service: decl.name.clone(),
            kind: decl.kind,
            target: decl.target.clone(),
            verb: verb.to_string(),
            description,
            path: None,
            params: IndexMap::new(),
            headers: self.headers.get(&decl.name).cloned().unwrap_or_default(),
        }
    }

    async fn exec_call(&mut self, call: &ServiceCall) -> Result<Flow, RuntimeError> {
        let decl = self.service_decl(&call.service, call.service_span)?;

        let mut request = self.build_request(decl, &call.verb, call.description.clone());
        if let Some(path) = &call.path {
            request.path = Some(self.eval(path)?.render());
        }
        request.params = self.eval_params(&call.params)?;

        let action = [call.verb.as_str(), call.description.as_str(), "using", call.service.as_str()]
            .iter()
            .filter(|word| !word.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        let outcome = self
            .dispatch(request, &action, call.on_failure.as_ref(), call.span)
            .await?;
        self.settle(outcome, &call.bindings, call.on_failure.as_ref()).await
    }

    async fn exec_ask(&mut self, ask: &AskCall) -> Result<Flow, RuntimeError> {
        let decl = self.service_decl(&ask.agent, ask.agent_span)?;

        let prompt = self.eval(&ask.prompt)?.render();
        let mut request = self.build_request(decl, "ask", prompt);
        request.params = self.eval_params(&ask.params)?;

        let action = format!("ask {}", ask.agent);
        let outcome = self
            .dispatch(request, &action, ask.on_failure.as_ref(), ask.span)
            .await?;
        self.settle(outcome, &ask.bindings, ask.on_failure.as_ref()).await
    }

    /// Run one request through the retry machine.
    ///
    /// Failed attempts with retries left are logged as `retry`, pauses as
    /// `wait`. The final failed attempt is logged under the call's own action.
    async fn dispatch(
        &mut self,
        request: ServiceRequest,
        action: &str,
        handler: Option<&ErrorHandler>,
        span: Span,
    ) -> Result<CallOutcome, RuntimeError> {
        let service = request.service.clone();
        let connector = self
            .connectors
            .resolve(&service, request.kind)
            .ok_or_else(|| {
                RuntimeError::new(
                    RuntimeErrorKind::NoConnector {
                        service: service.clone(),
                    },
                    span,
                )
                .with_hint("Register a connector for this service or for its kind")
            })?;

        let mut machine = RetryMachine::new(handler);
        let mut response: Option<ServiceResponse> = None;
        let mut last_error = String::new();

        loop {
            match machine.state() {
                RetryState::Attempting(attempt) => {
                    let started = Instant::now();
                    let result = connector.call(request.clone()).await;
                    let elapsed = started.elapsed();

                    match result {
                        Ok(answer) => {
                            debug!(service = %service, attempt, "service call succeeded");
                            let mut details = json!({ "service": service, "attempt": attempt });
                            if let Some(status) = answer.status {
                                details["status"] = json!(status);
                            }
                            let entry = self
                                .log
                                .entry(action, Outcome::Success)
                                .with_duration(elapsed)
                                .with_details(details);
                            self.log.push(entry);
                            response = Some(answer);
                            machine.succeed();
                        }
                        Err(error) => {
                            last_error = error.to_string();
                            machine.fail();
                            let retrying = matches!(machine.state(), RetryState::Waiting { .. });
                            warn!(
                                service = %service,
                                attempt,
                                error = %last_error,
                                retrying,
                                "service call failed"
                            );
                            let entry = self
                                .log
                                .entry(if retrying { "retry" } else { action }, Outcome::Failure)
                                .with_duration(elapsed)
                                .with_details(json!({
                                    "service": service,
                                    "attempt": attempt,
                                    "error": last_error,
                                }));
                            self.log.push(entry);
                        }
                    }
                }

                RetryState::Waiting { next_attempt } => {
                    if let Some(wait) = machine.wait_duration(self.options.retry_wait_scale) {
                        tokio::time::sleep(wait).await;
                        let entry = self
                            .log
                            .entry("wait", Outcome::Success)
                            .with_duration(wait)
                            .with_details(json!({
                                "service": service,
                                "next_attempt": next_attempt
                            }));
                        self.log.push(entry);
                    }
                    machine.resume();
                }

                RetryState::Succeeded => {
                    return Ok(CallOutcome::Responded(response.take().unwrap_or_default()));
                }

                RetryState::FallbackRunning => {
                    self.log.record("fallback", Outcome::Success).details =
                        json!({ "service": service, "error": last_error });
                    return Ok(CallOutcome::Fallback);
                }

                RetryState::Failed => {
                    let attempts = machine.max_attempts();
                    let error = if attempts > 1 {
                        RuntimeError::new(
                            RuntimeErrorKind::RetriesExhausted {
                                service,
                                attempts,
                                message: last_error,
                            },
                            span,
                        )
                        .with_hint("Add 'if still failing:' to handle the failure")
                    } else {
                        RuntimeError::new(
                            RuntimeErrorKind::ServiceFailed {
                                service,
                                message: last_error,
                            },
                            span,
                        )
                        .with_hint("Add an 'on failure:' block to retry or fall back")
                    };
                    return Err(error);
                }
            }
        }
    }

    /// Save the response, or run the fallback block.
    async fn settle(
        &mut self,
        outcome: CallOutcome,
        bindings: &Bindings,
        handler: Option<&ErrorHandler>,
    ) -> Result<Flow, RuntimeError> {
        match outcome {
            CallOutcome::Responded(response) => {
                self.bind_response(bindings, response);
                Ok(Flow::Continue)
            }
            CallOutcome::Fallback => match handler.and_then(|h| h.fallback.as_deref()) {
                Some(body) => self.exec_block(body).await,
                None => Ok(Flow::Continue),
            },
        }
    }

    fn bind_response(&mut self, bindings: &Bindings, response: ServiceResponse) {
        let result_name = bindings
            .result
            .as_ref()
            .map(|b| b.name.as_str())
            .unwrap_or(DEFAULT_RESULT_NAME);
        self.env.assign(result_name, response.value);

        if let Some(binding) = &bindings.status {
            let status = response
                .status
                .map(|code| Value::Number(f64::from(code)))
                .unwrap_or(Value::Absent);
            self.env.assign(&binding.name, status);
        }

        if let Some(binding) = &bindings.headers {
            let headers = response
                .headers
                .map(|headers| {
                    Value::Record(
                        headers
                            .into_iter()
                            .map(|(name, value)| (name, Value::Text(value)))
                            .collect(),
                    )
                })
                .unwrap_or(Value::Absent);
            self.env.assign(&binding.name, headers);
        }
    }
}
