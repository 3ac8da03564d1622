//! Rule: Unreachable Code
//!
//! Warns about statements that follow `complete` or `reject` in the same
//! block. They can never run.

use crate::executor::types::ast::{Program, Stmt};

use super::super::{child_bodies, ValidationError, ValidationRule};

pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Statements after complete or reject never run"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.check_body(program.statements(), &mut errors);
        errors
    }
}

impl UnreachableCodeRule {
    fn check_body(&self, body: &[Stmt], errors: &mut Vec<ValidationError>) {
        if let Some(end) = body.iter().position(Stmt::is_terminal) {
            if let Some(first_dead) = body.get(end + 1) {
                let word = match &body[end] {
                    Stmt::Reject { .. } => "reject",
                    _ => "complete",
                };
                errors.push(ValidationError::warning(
                    first_dead.span(),
                    format!("This statement never runs because it follows '{}'", word),
                    self.id(),
                ));
            }
        }

        for stmt in body {
            for child in child_bodies(stmt) {
                self.check_body(child, errors);
            }
        }
    }
}
