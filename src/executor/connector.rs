//! Service connectors
//!
//! The interpreter never talks to the network itself. Each call or `ask`
//! becomes a [`ServiceRequest`] handed to a [`Connector`] picked from a
//! [`ConnectorTable`], first by service name and then by service kind.
//!
//! Ships with three connectors:
//! - [`StaticConnector`] answers every request the same way
//! - [`ScriptedConnector`] replays a queue of responses and records requests
//! - [`FixtureConnector`] answers per service from a JSON fixture file

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError};
use thiserror::Error;
use tokio::sync::Mutex;

use super::types::ast::ServiceKind;
use super::types::values::Value;

/// Verb to HTTP method, for connectors that speak HTTP
static VERB_METHODS: &[(&str, &str)] = &[
    ("get", "GET"),
    ("fetch", "GET"),
    ("find", "GET"),
    ("list", "GET"),
    ("look", "GET"),
    ("check", "GET"),
    ("load", "GET"),
    ("create", "POST"),
    ("send", "POST"),
    ("add", "POST"),
    ("submit", "POST"),
    ("post", "POST"),
    ("notify", "POST"),
    ("charge", "POST"),
    ("update", "PUT"),
    ("replace", "PUT"),
    ("change", "PATCH"),
    ("patch", "PATCH"),
    ("delete", "DELETE"),
    ("remove", "DELETE"),
    ("cancel", "DELETE"),
];

/// HTTP method for a call verb. Unknown verbs are treated as `POST`.
pub fn http_method(verb: &str) -> &'static str {
    let verb = verb.to_ascii_lowercase();
    VERB_METHODS
        .iter()
        .find(|(v, _)| *v == verb)
        .map(|(_, method)| *method)
        .unwrap_or("POST")
}

/* ===================== Requests and Responses ===================== */

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRequest {
    pub service: String,
    pub kind: ServiceKind,
    /// URL, model name, or plugin name from the declaration
    pub target: String,
    /// `ask` for agent calls
    pub verb: String,
    /// Call description, or the rendered prompt for `ask`
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub params: IndexMap<String, Value>,
    pub headers: IndexMap<String, String>,
}

impl ServiceRequest {
    pub fn method(&self) -> &'static str {
        http_method(&self.verb)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceResponse {
    pub value: Value,
    pub status: Option<u16>,
    pub headers: Option<IndexMap<String, String>>,
}

impl ServiceResponse {
    pub fn ok(value: Value) -> Self {
        Self {
            value,
            status: None,
            headers: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_headers(mut self, headers: IndexMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectorError {
    #[error("{0}")]
    Failed(String),

    #[error("service answered with status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("no response configured for '{0}'")]
    NoResponse(String),
}

/* ===================== Connector Trait ===================== */

#[async_trait]
pub trait Connector: Send + Sync {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceResponse, ConnectorError>;
}

/// Connectors keyed by service name, with per-kind defaults
#[derive(Clone, Default)]
pub struct ConnectorTable {
    by_name: HashMap<String, Arc<dyn Connector>>,
    by_kind: HashMap<ServiceKind, Arc<dyn Connector>>,
}

impl ConnectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(
        mut self,
        name: impl Into<String>,
        connector: impl Connector + 'static,
    ) -> Self {
        self.by_name.insert(name.into(), Arc::new(connector));
        self
    }

    pub fn with_kind(mut self, kind: ServiceKind, connector: impl Connector + 'static) -> Self {
        self.by_kind.insert(kind, Arc::new(connector));
        self
    }

    /// Register one shared connector for every service kind.
    pub fn with_fallback(mut self, connector: Arc<dyn Connector>) -> Self {
        for kind in [
            ServiceKind::Api,
            ServiceKind::Ai,
            ServiceKind::Plugin,
            ServiceKind::Webhook,
        ] {
            self.by_kind.insert(kind, connector.clone());
        }
        self
    }

    pub fn resolve(&self, service: &str, kind: ServiceKind) -> Option<Arc<dyn Connector>> {
        self.by_name
            .get(service)
            .or_else(|| self.by_kind.get(&kind))
            .cloned()
    }
}

/* ===================== Built-in Connectors ===================== */

/// Answers every request with the same result
#[derive(Debug, Clone)]
pub struct StaticConnector {
    response: Result<ServiceResponse, ConnectorError>,
}

impl StaticConnector {
    pub fn new(body: Value) -> Self {
        Self {
            response: Ok(ServiceResponse::ok(body)),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(ConnectorError::Failed(message.into())),
        }
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn call(&self, _request: ServiceRequest) -> Result<ServiceResponse, ConnectorError> {
        self.response.clone()
    }
}

/// Replays queued results in order and remembers every request
///
/// Clones share the same queue, so a test can keep a handle after moving
/// one into a [`ConnectorTable`]. The queue is never held across an await.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<std::sync::Mutex<VecDeque<Result<ServiceResponse, ConnectorError>>>>,
    received: Arc<Mutex<Vec<ServiceRequest>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_respond(self, body: Value) -> Self {
        self.then(Ok(ServiceResponse::ok(body)))
    }

    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.then(Err(ConnectorError::Failed(message.into())))
    }

    pub fn then(self, result: Result<ServiceResponse, ConnectorError>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
        self
    }

    pub async fn requests(&self) -> Vec<ServiceRequest> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceResponse, ConnectorError> {
        let service = request.service.clone();
        self.received.lock().await.push(request);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or(Err(ConnectorError::NoResponse(service)))
    }
}

/// Per-service answers loaded from JSON
///
/// The fixture is an object keyed by service name. Each value is the
/// response body, `{"fail": "message"}` to make every call fail, or
/// `{"fail_status": 503}` to fail with an HTTP status.
#[derive(Debug, Clone, Default)]
pub struct FixtureConnector {
    responses: HashMap<String, Result<Value, ConnectorError>>,
}

impl FixtureConnector {
    pub fn from_json(fixtures: serde_json::Value) -> Result<Self, ConnectorError> {
        let serde_json::Value::Object(entries) = fixtures else {
            return Err(ConnectorError::Failed(
                "fixtures must be a JSON object keyed by service name".to_string(),
            ));
        };

        let responses = entries
            .into_iter()
            .map(|(service, answer)| {
                let response = match fixture_failure(&answer) {
                    Some(error) => Err(error),
                    None => Ok(Value::from_json(answer)),
                };
                (service, response)
            })
            .collect();

        Ok(Self { responses })
    }
}

/// A single-key `fail` or `fail_status` object; anything else is a body.
fn fixture_failure(answer: &serde_json::Value) -> Option<ConnectorError> {
    let fields = answer.as_object().filter(|fields| fields.len() == 1)?;
    if let Some(message) = fields.get("fail").and_then(|m| m.as_str()) {
        return Some(ConnectorError::Failed(message.to_string()));
    }
    fields
        .get("fail_status")
        .and_then(|code| code.as_u64())
        .and_then(|code| u16::try_from(code).ok())
        .map(ConnectorError::Status)
}

#[async_trait]
impl Connector for FixtureConnector {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceResponse, ConnectorError> {
        match self.responses.get(&request.service) {
            Some(Ok(body)) => Ok(ServiceResponse::ok(body.clone()).with_status(200)),
            Some(Err(error)) => Err(error.clone()),
            None => Err(ConnectorError::NoResponse(request.service)),
        }
    }
}
