//! Rule: Retry Policy
//!
//! `retry 0 times` never retries anything, and a wait has to fit in a
//! duration the runtime can sleep for.

use std::time::Duration;

use crate::executor::types::ast::{ErrorHandler, Program, Stmt};

use super::super::{walk_stmts, ValidationError, ValidationRule};

pub struct RetryPolicyRule;

impl ValidationRule for RetryPolicyRule {
    fn id(&self) -> &'static str {
        "retry-policy"
    }

    fn description(&self) -> &'static str {
        "Retry counts should be at least one and waits must fit in a duration"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let mut handlers: Vec<&ErrorHandler> = Vec::new();
        walk_stmts(program.statements(), &mut |stmt| match stmt {
            Stmt::Call(call) => handlers.extend(call.on_failure.as_ref()),
            Stmt::Ask(ask) => handlers.extend(ask.on_failure.as_ref()),
            _ => {}
        });

        let mut errors = Vec::new();
        for policy in handlers.into_iter().filter_map(|handler| handler.retry.as_ref()) {
            if policy.retries == 0 {
                errors.push(
                    ValidationError::warning(
                        policy.span,
                        "'retry 0 times' does not retry",
                        self.id(),
                    )
                    .with_hint("Remove the retry line, or retry at least once"),
                );
            }
            if let Some(secs) = policy.wait_seconds {
                if Duration::try_from_secs_f64(secs).is_err() {
                    errors.push(
                        ValidationError::error(policy.span, "The retry wait is too long", self.id())
                            .with_hint("Use a shorter wait"),
                    );
                }
            }
        }
        errors
    }
}
