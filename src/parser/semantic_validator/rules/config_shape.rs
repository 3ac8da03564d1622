//! Rule: Config Shape
//!
//! Known config keys must hold the right kind of literal. Unknown keys are
//! allowed but flagged, with a suggestion when they look like a typo.

use std::time::Duration;

use crate::executor::types::ast::{ConfigEntry, Expr, Program};

use super::super::{closest_match, ValidationError, ValidationRule};

/// What a config value has to look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Text,
    NumberOrText,
    NonNegativeNumber,
    Boolean,
}

impl Shape {
    fn accepts(&self, value: &Expr) -> bool {
        match (self, value) {
            (Shape::Text, Expr::LitStr { .. }) => true,
            (Shape::NumberOrText, Expr::LitStr { .. } | Expr::LitNum { .. }) => true,
            (Shape::NonNegativeNumber, Expr::LitNum { v, .. }) => {
                *v >= 0.0 && Duration::try_from_secs_f64(*v).is_ok()
            }
            (Shape::Boolean, Expr::LitBool { .. }) => true,
            _ => false,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Shape::Text => "text in quotes",
            Shape::NumberOrText => "a number or text",
            Shape::NonNegativeNumber => "a number of seconds, zero or more",
            Shape::Boolean => "true or false",
        }
    }
}

const KNOWN_KEYS: &[(&str, Shape)] = &[
    ("name", Shape::Text),
    ("description", Shape::Text),
    ("version", Shape::NumberOrText),
    ("timeout", Shape::NonNegativeNumber),
    ("strict", Shape::Boolean),
];

pub struct ConfigShapeRule;

impl ValidationRule for ConfigShapeRule {
    fn id(&self) -> &'static str {
        "config-shape"
    }

    fn description(&self) -> &'static str {
        "Config values must match their key"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let Some(config) = &program.config else {
            return Vec::new();
        };
        config
            .entries
            .iter()
            .filter_map(|entry| self.check_entry(entry))
            .collect()
    }
}

impl ConfigShapeRule {
    fn check_entry(&self, entry: &ConfigEntry) -> Option<ValidationError> {
        let known = KNOWN_KEYS.iter().find(|(key, _)| *key == entry.key);

        match known {
            Some((_, shape)) if !shape.accepts(&entry.value) => Some(
                ValidationError::error(
                    entry.value.span(),
                    format!("'{}' must be {}", entry.key, shape.describe()),
                    self.id(),
                ),
            ),
            Some(_) => None,
            None => Some(
                ValidationError::warning(
                    entry.span,
                    format!("Unknown config key '{}'", entry.key),
                    self.id(),
                )
                .suggesting(closest_match(
                    &entry.key,
                    KNOWN_KEYS.iter().map(|(key, _)| *key),
                )),
            ),
        }
    }
}
