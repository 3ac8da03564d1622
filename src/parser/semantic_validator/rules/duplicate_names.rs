//! Rule: Duplicate Names
//!
//! Step labels, service names, config keys, and the headers of one service
//! must each be unique.

use std::collections::HashMap;

use crate::executor::types::ast::{Program, Span, Stmt};

use super::super::{walk_stmts, ValidationError, ValidationRule};

pub struct DuplicateNameRule;

impl ValidationRule for DuplicateNameRule {
    fn id(&self) -> &'static str {
        "duplicate-name"
    }

    fn description(&self) -> &'static str {
        "Steps, services and config keys must be unique"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(config) = &program.config {
            let keys = config.entries.iter().map(|e| (e.key.as_str(), e.span));
            self.report(keys, "config key", &mut errors);
        }

        if let Some(services) = &program.services {
            let names = services.services.iter().map(|s| (s.name.as_str(), s.span));
            self.report(names, "service", &mut errors);

            for decl in &services.services {
                let headers = decl.headers.iter().map(|h| (h.name.as_str(), h.span));
                self.report(headers, "header", &mut errors);
            }
        }

        let mut steps = Vec::new();
        walk_stmts(program.statements(), &mut |stmt| {
            if let Stmt::Step { label, span, .. } = stmt {
                steps.push((label.as_str(), *span));
            }
        });
        self.report(steps.into_iter(), "step", &mut errors);

        errors
    }
}

impl DuplicateNameRule {
    /// Report every occurrence after the first of each name.
    fn report<'a>(
        &self,
        names: impl Iterator<Item = (&'a str, Span)>,
        what: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut first_seen: HashMap<&str, Span> = HashMap::new();
        for (name, span) in names {
            match first_seen.get(name) {
                Some(first) => errors.push(
                    ValidationError::error(
                        span,
                        format!("Duplicate {} '{}'", what, name),
                        self.id(),
                    )
                    .with_hint(format!("'{}' was first declared on line {}", name, first.line)),
                ),
                None => {
                    first_seen.insert(name, span);
                }
            }
        }
    }
}
