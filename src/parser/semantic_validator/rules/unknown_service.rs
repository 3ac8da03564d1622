//! Rule: Unknown Service
//!
//! Every `using <Service>` and `ask <Agent>` must name a declared service.
//! `ask` only works with AI services; calling an AI service with `using`
//! is allowed but flagged.

use crate::executor::types::ast::{Program, ServiceKind, Stmt};

use super::super::{closest_match, walk_stmts, ValidationError, ValidationRule};

pub struct UnknownServiceRule;

impl ValidationRule for UnknownServiceRule {
    fn id(&self) -> &'static str {
        "unknown-service"
    }

    fn description(&self) -> &'static str {
        "Calls must name a declared service of the right kind"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let declared: Vec<&str> = program
            .services
            .iter()
            .flat_map(|block| block.services.iter().map(|s| s.name.as_str()))
            .collect();
        let mut errors = Vec::new();

        let unknown = |name: &str, span| {
            let mut error = ValidationError::error(
                span,
                format!("Unknown service '{}'", name),
                self.id(),
            )
            .suggesting(closest_match(name, declared.iter().copied()));
            if declared.is_empty() {
                error = error.with_hint("Declare services in a 'services:' block");
            }
            error
        };

        walk_stmts(program.statements(), &mut |stmt| match stmt {
            Stmt::Call(call) => match program.service(&call.service) {
                None => errors.push(unknown(&call.service, call.service_span)),
                Some(decl) if decl.kind == ServiceKind::Ai => {
                    errors.push(
                        ValidationError::warning(
                            call.service_span,
                            format!("'{}' is an AI service called with 'using'", call.service),
                            self.id(),
                        )
                        .with_hint(format!("Write: ask {} to ...", call.service)),
                    );
                }
                Some(_) => {}
            },
            Stmt::Ask(ask) => match program.service(&ask.agent) {
                None => errors.push(unknown(&ask.agent, ask.agent_span)),
                Some(decl) if decl.kind != ServiceKind::Ai => {
                    errors.push(
                        ValidationError::error(
                            ask.agent_span,
                            format!(
                                "'{}' is {} service; only AI services can be asked",
                                ask.agent,
                                article_kind(decl.kind)
                            ),
                            self.id(),
                        )
                        .with_hint(format!(
                            "Call it with: <verb> <description> using {}",
                            ask.agent
                        )),
                    );
                }
                Some(_) => {}
            },
            _ => {}
        });

        errors
    }
}

fn article_kind(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Api => "an API",
        ServiceKind::Ai => "an AI",
        ServiceKind::Plugin => "a plugin",
        ServiceKind::Webhook => "a webhook",
    }
}
