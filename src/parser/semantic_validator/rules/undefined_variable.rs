//! Rule: Undefined Variable
//!
//! Reports an error when a name is read before anything sets it.
//!
//! ```text
//! workflow:
//!     log total            # error: 'total' is used before it is set
//!     set total to 0
//! ```
//!
//! Names come from `set`, `for each`, and the result/status/headers a call
//! saves. Declared services, config keys, `env` (or `environment`) and
//! `request` are always visible. A loop body is a child scope: names first
//! set inside it are gone once the loop ends. Steps and `if` branches do not open scopes, so a name
//! set in one branch stays visible after the `if`.
//!
//! Field access (`order.total`) is not checked: its root may come from the
//! run's input, which is only known at run time.

use indexmap::IndexSet;

use crate::executor::types::ast::{
    AskCall, Bindings, ErrorHandler, Expr, Param, Program, ServiceCall, Span, Stmt, StrPart,
};

use super::super::{closest_match, ValidationError, ValidationRule};
use super::RESERVED_NAMES;

/// Name a call's response is saved under when it has no `save the result as`.
pub const DEFAULT_RESULT_NAME: &str = "result";

/// Rule that checks for reads of names that were never set.
pub struct UndefinedVariableRule;

impl ValidationRule for UndefinedVariableRule {
    fn id(&self) -> &'static str {
        "undefined-variable"
    }

    fn description(&self) -> &'static str {
        "Variables must be set before they are used"
    }

    fn validate(&self, program: &Program, _source: &str) -> Vec<ValidationError> {
        let mut checker = Checker {
            scopes: Scopes::new(program),
            errors: Vec::new(),
            rule_id: self.id(),
        };

        if let Some(services) = &program.services {
            for decl in &services.services {
                for header in &decl.headers {
                    checker.check_expr(&header.value);
                }
            }
        }
        checker.check_body(program.statements());

        checker.errors
    }
}

// ============================================================================
// Scope Tracking
// ============================================================================

/// Sets keep declaration order so suggestions break ties the same way on
/// every run.
struct Scopes {
    globals: IndexSet<String>,
    /// Workflow scope first, then one frame per enclosing loop body
    frames: Vec<IndexSet<String>>,
    /// Names that only ever lived inside a loop that has ended
    expired: IndexSet<String>,
}

impl Scopes {
    fn new(program: &Program) -> Self {
        let mut globals: IndexSet<String> =
            RESERVED_NAMES.iter().map(|s| s.to_string()).collect();
        if let Some(services) = &program.services {
            globals.extend(services.services.iter().map(|s| s.name.clone()));
        }
        if let Some(config) = &program.config {
            globals.extend(config.entries.iter().map(|e| e.key.clone()));
        }
        Self {
            globals,
            frames: vec![IndexSet::new()],
            expired: IndexSet::new(),
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.globals.contains(name) || self.frames.iter().any(|f| f.contains(name))
    }

    /// Assigning an existing name updates it where it lives; a new name goes
    /// in the innermost scope.
    fn assign(&mut self, name: &str) {
        if self.is_defined(name) {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string());
        }
    }

    fn push(&mut self) {
        self.frames.push(IndexSet::new());
    }

    fn pop(&mut self) {
        if self.frames.len() <= 1 {
            return;
        }
        if let Some(frame) = self.frames.pop() {
            for name in frame {
                if !self.is_defined(&name) {
                    self.expired.insert(name);
                }
            }
        }
    }

    fn visible(&self) -> impl Iterator<Item = &str> {
        self.frames
            .iter()
            .rev()
            .flatten()
            .chain(self.globals.iter())
            .map(String::as_str)
    }
}

// ============================================================================
// AST Traversal
// ============================================================================

struct Checker {
    scopes: Scopes,
    errors: Vec<ValidationError>,
    rule_id: &'static str,
}

impl Checker {
    fn check_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Step { body, .. } => self.check_body(body),

            Stmt::Set { name, value, .. } => {
                // the value is read before the name exists: `set x to x plus 1`
                self.check_expr(value);
                self.scopes.assign(name);
            }

            Stmt::If {
                test,
                then_body,
                else_ifs,
                else_body,
                ..
            } => {
                self.check_expr(test);
                self.check_body(then_body);
                for branch in else_ifs {
                    self.check_expr(&branch.test);
                    self.check_body(&branch.body);
                }
                if let Some(body) = else_body {
                    self.check_body(body);
                }
            }

            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => {
                self.check_expr(iterable);
                self.scopes.push();
                if let Some(frame) = self.scopes.frames.last_mut() {
                    frame.insert(binding.clone());
                }
                self.check_body(body);
                self.scopes.pop();
            }

            Stmt::Call(ServiceCall {
                path,
                params,
                bindings,
                on_failure,
                ..
            }) => {
                if let Some(path) = path {
                    self.check_expr(path);
                }
                self.check_call_tail(params, bindings, on_failure);
            }

            Stmt::Ask(AskCall {
                prompt,
                params,
                bindings,
                on_failure,
                ..
            }) => {
                self.check_expr(prompt);
                self.check_call_tail(params, bindings, on_failure);
            }

            Stmt::Log { message, .. } | Stmt::Reject { message, .. } => {
                self.check_expr(message);
            }

            Stmt::Complete { outputs, .. } => {
                for output in outputs {
                    self.check_expr(&output.value);
                }
            }
        }
    }

    /// Params are read first, then the fallback runs without the call's
    /// bindings, then the bindings exist for everything after the call.
    fn check_call_tail(
        &mut self,
        params: &[Param],
        bindings: &Bindings,
        on_failure: &Option<ErrorHandler>,
    ) {
        for param in params {
            self.check_expr(&param.value);
        }
        if let Some(fallback) = on_failure.as_ref().and_then(|h| h.fallback.as_ref()) {
            self.check_body(fallback);
        }
        if bindings.result.is_none() {
            self.scopes.assign(DEFAULT_RESULT_NAME);
        }
        for binding in bindings.iter() {
            self.scopes.assign(&binding.name);
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident { name, span } => self.check_name(name, *span),

            Expr::Interpolated { parts, .. } => {
                for part in parts {
                    if let StrPart::Expr(inner) = part {
                        self.check_expr(inner);
                    }
                }
            }

            Expr::LitList { elements, .. } => {
                for element in elements {
                    self.check_expr(element);
                }
            }

            Expr::Arith { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }

            Expr::Compare { left, right, .. } => {
                self.check_expr(left);
                if let Some(right) = right {
                    self.check_expr(right);
                }
            }

            Expr::Not { inner, .. } => self.check_expr(inner),

            // Roots of field access may come from run input
            Expr::Field { .. } => {}

            Expr::LitStr { .. } | Expr::LitNum { .. } | Expr::LitBool { .. } => {}
        }
    }

    fn check_name(&mut self, name: &str, span: Span) {
        if self.scopes.is_defined(name) {
            return;
        }

        let error = if self.scopes.expired.contains(name) {
            ValidationError::error(
                span,
                format!("'{}' only exists inside the loop that sets it", name),
                self.rule_id,
            )
            .with_hint(format!(
                "Set '{}' before the loop if you need it afterwards",
                name
            ))
        } else {
            let close = closest_match(name, self.scopes.visible());
            ValidationError::error(
                span,
                format!("'{}' is used before it is set", name),
                self.rule_id,
            )
            .suggesting(close)
        };
        self.errors.push(error);
    }
}
