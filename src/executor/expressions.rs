//! Expression evaluation
//!
//! Expressions never call services, so evaluation is synchronous. The only
//! side effect is the log entry written when a non-strict run reads an
//! environment variable that is not set.

use serde_json::json;
use tracing::warn;

use super::errors::{RuntimeError, RuntimeErrorKind};
use super::log::Outcome;
use super::types::ast::{ArithOp, CompareOp, Expr, LogicalOp, Span, StrPart};
use super::types::values::{format_number, Value};
use super::{is_env_root, Run, ENV_NAME};

/// Most decimal places `rounded to` accepts
const MAX_ROUND_PLACES: f64 = 15.0;

impl Run<'_> {
    /// Evaluate expression to a value
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::LitStr { v, .. } => Ok(Value::Text(v.clone())),
            Expr::LitNum { v, .. } => Ok(Value::Number(*v)),
            Expr::LitBool { v, .. } => Ok(Value::Bool(*v)),

            Expr::Interpolated { parts, .. } => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        StrPart::Text(text) => out.push_str(text),
                        StrPart::Expr(inner) => out.push_str(&self.eval(inner)?.render()),
                    }
                }
                Ok(Value::Text(out))
            }

            Expr::LitList { elements, .. } => elements
                .iter()
                .map(|element| self.eval(element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),

            Expr::Ident { name, span } => self.env.get(name).cloned().ok_or_else(|| {
                RuntimeError::new(RuntimeErrorKind::UndefinedVariable { name: name.clone() }, *span)
            }),

            Expr::Field { root, path, span } => self.eval_field(root, path, *span),

            Expr::Arith {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arithmetic(*op, &left, &right, *span)
            }

            Expr::Compare {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left)?;
                let right = match right {
                    Some(right) => Some(self.eval(right)?),
                    None => None,
                };
                compare(*op, &left, right.as_ref(), *span).map(Value::Bool)
            }

            Expr::Logical {
                op, left, right, ..
            } => {
                let left = self.eval(left)?.is_truthy();
                match (op, left) {
                    (LogicalOp::And, false) => Ok(Value::Bool(false)),
                    (LogicalOp::Or, true) => Ok(Value::Bool(true)),
                    _ => Ok(Value::Bool(self.eval(right)?.is_truthy())),
                }
            }

            Expr::Not { inner, .. } => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
        }
    }

    /// Missing fields and unset roots read as absent. Reading a field of
    /// anything other than a record or an absent value is an error.
    fn eval_field(
        &mut self,
        root: &str,
        path: &[String],
        span: Span,
    ) -> Result<Value, RuntimeError> {
        if is_env_root(root) {
            if let Some(key) = path.first() {
                self.check_environment(key, span)?;
            }
        }

        let Some(mut current) = self.env.get(root) else {
            return Ok(Value::Absent);
        };
        for field in path {
            current = match current {
                Value::Record(fields) => match fields.get(field) {
                    Some(value) => value,
                    None => return Ok(Value::Absent),
                },
                Value::Absent => return Ok(Value::Absent),
                other => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::InvalidFieldAccess {
                            field: field.clone(),
                            found: other.type_name(),
                        },
                        span,
                    ))
                }
            };
        }
        Ok(current.clone())
    }

    fn check_environment(&mut self, key: &str, span: Span) -> Result<(), RuntimeError> {
        let is_set = matches!(
            self.env.get(ENV_NAME),
            Some(Value::Record(vars)) if vars.contains_key(key)
        );
        if is_set {
            return Ok(());
        }

        if self.strict_environment {
            return Err(RuntimeError::new(
                RuntimeErrorKind::MissingEnvironment {
                    name: key.to_string(),
                },
                span,
            )
            .with_hint("Set it in the environment or a .env file"));
        }

        warn!(variable = key, "environment variable is not set");
        self.log
            .record(format!("read env.{}", key), Outcome::Skipped)
            .details = json!({ "warning": format!("environment variable '{}' is not set", key) });
        Ok(())
    }
}

/* ===================== Operators ===================== */

/// `plus` adds numbers or joins two texts; every other operator needs numbers.
pub fn arithmetic(
    op: ArithOp,
    left: &Value,
    right: &Value,
    span: Span,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Text(a), Value::Text(b)) if op == ArithOp::Plus => {
            Ok(Value::Text(format!("{}{}", a, b)))
        }
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (*a, *b);
            let n = match op {
                ArithOp::Plus => a + b,
                ArithOp::Minus => a - b,
                ArithOp::Times => a * b,
                ArithOp::DividedBy => {
                    if b == 0.0 {
                        return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, span));
                    }
                    a / b
                }
                ArithOp::RoundedTo => truncate(a, b, span)?,
            };
            Ok(Value::Number(n))
        }
        _ => {
            let error = RuntimeError::new(
                RuntimeErrorKind::InvalidOperands {
                    op: op.phrase(),
                    left: left.type_name(),
                    right: right.type_name(),
                },
                span,
            );
            let mixes_text = matches!(left, Value::Text(_)) || matches!(right, Value::Text(_));
            if op == ArithOp::Plus && mixes_text {
                Err(error.with_hint(
                    "To join text with other values, write them inside a string: \"{a}{b}\"",
                ))
            } else {
                Err(error)
            }
        }
    }
}

/// `rounded to` cuts extra digits off rather than rounding half up.
///
/// The cut happens on the shortest decimal form of the number, so a value
/// such as `0.29` keeps both of its digits instead of losing one to binary
/// representation error.
fn truncate(value: f64, places: f64, span: Span) -> Result<f64, RuntimeError> {
    if places.fract() != 0.0 || !(0.0..=MAX_ROUND_PLACES).contains(&places) {
        return Err(RuntimeError::new(
            RuntimeErrorKind::InvalidRounding {
                places: format_number(places),
            },
            span,
        ));
    }
    if !value.is_finite() {
        return Ok(value);
    }

    let places = places as usize;
    let text = value.to_string();
    let Some((whole, fraction)) = text.split_once('.') else {
        return Ok(value);
    };
    if fraction.len() <= places {
        return Ok(value);
    }

    let cut = if places == 0 {
        whole.to_string()
    } else {
        format!("{}.{}", whole, &fraction[..places])
    };
    let truncated = cut.parse::<f64>().unwrap_or(value);
    // "-0.0" reads back as negative zero
    Ok(if truncated == 0.0 { 0.0 } else { truncated })
}

pub fn compare(
    op: CompareOp,
    left: &Value,
    right: Option<&Value>,
    span: Span,
) -> Result<bool, RuntimeError> {
    let right = right.unwrap_or(&Value::Absent);
    match op {
        CompareOp::Is => Ok(left == right),
        CompareOp::IsNot => Ok(left != right),
        CompareOp::Above => numbers(op, left, right, span).map(|(a, b)| a > b),
        CompareOp::Below => numbers(op, left, right, span).map(|(a, b)| a < b),
        CompareOp::AtLeast => numbers(op, left, right, span).map(|(a, b)| a >= b),
        CompareOp::AtMost => numbers(op, left, right, span).map(|(a, b)| a <= b),
        CompareOp::Contains => contains(op, left, right, span),
        CompareOp::NotContains => contains(op, left, right, span).map(|found| !found),
        CompareOp::IsEmpty => Ok(left.is_empty()),
        CompareOp::IsNotEmpty => Ok(!left.is_empty()),
        CompareOp::Exists => Ok(!left.is_absent()),
        CompareOp::NotExists => Ok(left.is_absent()),
    }
}

fn numbers(
    op: CompareOp,
    left: &Value,
    right: &Value,
    span: Span,
) -> Result<(f64, f64), RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(invalid_operands(op, left, right, span)),
    }
}

/// Substring test for text, membership test for lists
fn contains(op: CompareOp, left: &Value, right: &Value, span: Span) -> Result<bool, RuntimeError> {
    match left {
        Value::Text(haystack) => Ok(haystack.contains(right.render().as_str())),
        Value::List(items) => Ok(items.contains(right)),
        _ => Err(invalid_operands(op, left, right, span)),
    }
}

fn invalid_operands(op: CompareOp, left: &Value, right: &Value, span: Span) -> RuntimeError {
    RuntimeError::new(
        RuntimeErrorKind::InvalidOperands {
            op: op.phrase(),
            left: left.type_name(),
            right: right.type_name(),
        },
        span,
    )
}
