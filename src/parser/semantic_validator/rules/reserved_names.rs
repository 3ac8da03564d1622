//! Rule: Reserved Names
//!
//! `env` (or `environment`) and `request` hold the run's environment and
//! input. Nothing in a
//! workflow may assign to them, whether by `set`, a loop name, or a saved
//! call result.

use crate::executor::types::ast::{Program, Span, Stmt};

use super::super::{walk_stmts, ValidationError, ValidationRule};

pub const RESERVED_NAMES: &[&str] = &["env", "environment", "request"];

pub struct ReservedNameRule;

impl ValidationRule for ReservedNameRule {
    fn id(&self) -> &'static str {
        "reserved-name"
    }

    fn description(&self) -> &'static str {
        "'env', 'environment' and 'request' cannot be assigned"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let mut targets: Vec<(&str, Span)> = Vec::new();

        walk_stmts(program.statements(), &mut |stmt| match stmt {
            Stmt::Set {
                name, name_span, ..
            } => targets.push((name.as_str(), *name_span)),
            Stmt::ForEach {
                binding,
                binding_span,
                ..
            } => targets.push((binding.as_str(), *binding_span)),
            Stmt::Call(call) => {
                targets.extend(call.bindings.iter().map(|b| (b.name.as_str(), b.span)))
            }
            Stmt::Ask(ask) => {
                targets.extend(ask.bindings.iter().map(|b| (b.name.as_str(), b.span)))
            }
            _ => {}
        });

        targets
            .into_iter()
            .filter(|(name, _)| RESERVED_NAMES.contains(name))
            .map(|(name, span)| {
                ValidationError::error(
                    span,
                    format!("'{}' is reserved and cannot be assigned", name),
                    self.id(),
                )
                .with_hint("Pick a different name")
            })
            .collect()
    }
}
