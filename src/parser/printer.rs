//! Canonical source printer
//!
//! Turns a [`Program`] back into source text that parses to the same tree.
//! Used by `plainflow fmt`.

use std::fmt::Write;

use crate::executor::types::ast::{
    Bindings, ErrorHandler, Expr, LogicalOp, Param, Program, ServiceDecl, Stmt, StrPart,
};
use crate::executor::types::values::format_number;

use super::lexer::tokenize;
use super::token::TokenKind;

const INDENT: &str = "    ";

/// Print a whole program in canonical layout.
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::default();
    let mut first = true;

    if let Some(config) = &program.config {
        printer.line(0, "config:");
        for entry in &config.entries {
            printer.line(1, &format!("{}: {}", entry.key, print_expr(&entry.value)));
        }
        first = false;
    }

    if let Some(services) = &program.services {
        if !first {
            printer.blank();
        }
        printer.line(0, "services:");
        for decl in &services.services {
            printer.service(decl);
        }
        first = false;
    }

    if let Some(workflow) = &program.workflow {
        if !first {
            printer.blank();
        }
        printer.line(0, "workflow:");
        if let Some(trigger) = &workflow.trigger {
            printer.line(1, &format!("trigger: {}", quote(trigger)));
        }
        printer.block(1, &workflow.body);
    }

    printer.out
}

/// Print a single expression.
pub fn print_expr(expr: &Expr) -> String {
    expr_at(expr, Level::Logical)
}

#[derive(Default)]
struct Printer {
    out: String,
}

impl Printer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn service(&mut self, decl: &ServiceDecl) {
        self.line(
            1,
            &format!(
                "{} is {} {}",
                decl.name,
                decl.kind.declaration_phrase(),
                quote(&decl.target)
            ),
        );
        if !decl.headers.is_empty() {
            self.line(2, "with headers:");
            for header in &decl.headers {
                let name = if is_plain_name(&header.name) {
                    header.name.clone()
                } else {
                    quote(&header.name)
                };
                self.line(3, &format!("{}: {}", name, print_expr(&header.value)));
            }
        }
    }

    fn block(&mut self, depth: usize, body: &[Stmt]) {
        for stmt in body {
            self.stmt(depth, stmt);
        }
    }

    fn stmt(&mut self, depth: usize, stmt: &Stmt) {
        match stmt {
            Stmt::Step { label, body, .. } => {
                self.line(depth, &format!("step {}:", quote(label)));
                self.block(depth + 1, body);
            }
            Stmt::Call(call) => {
                let mut head = call.verb.clone();
                if !call.description.is_empty() {
                    head.push(' ');
                    head.push_str(&description_source(&call.verb, &call.description));
                }
                let _ = write!(head, " using {}", call.service);
                if let Some(path) = &call.path {
                    let _ = write!(head, " at {}", print_expr(path));
                }
                self.line(depth, &head);
                self.modifiers(depth + 1, &call.params, &call.bindings, call.on_failure.as_ref());
            }
            Stmt::Ask(ask) => {
                self.line(
                    depth,
                    &format!("ask {} to {}", ask.agent, print_expr(&ask.prompt)),
                );
                self.modifiers(depth + 1, &ask.params, &ask.bindings, ask.on_failure.as_ref());
            }
            Stmt::Set { name, value, .. } => {
                self.line(depth, &format!("set {} to {}", name, print_expr(value)));
            }
            Stmt::If {
                test,
                then_body,
                else_ifs,
                else_body,
                ..
            } => {
                self.line(depth, &format!("if {}:", print_expr(test)));
                self.block(depth + 1, then_body);
                for branch in else_ifs {
                    self.line(depth, &format!("otherwise if {}:", print_expr(&branch.test)));
                    self.block(depth + 1, &branch.body);
                }
                if let Some(body) = else_body {
                    self.line(depth, "otherwise:");
                    self.block(depth + 1, body);
                }
            }
            Stmt::ForEach {
                binding,
                iterable,
                body,
                ..
            } => {
                self.line(
                    depth,
                    &format!("for each {} in {}:", binding, print_expr(iterable)),
                );
                self.block(depth + 1, body);
            }
            Stmt::Log { message, .. } => {
                self.line(depth, &format!("log {}", print_expr(message)));
            }
            Stmt::Complete { outputs, .. } => {
                if outputs.is_empty() {
                    self.line(depth, "complete");
                } else {
                    let fields: Vec<String> = outputs
                        .iter()
                        .map(|o| format!("{} {}", o.name, expr_at(&o.value, Level::Arith)))
                        .collect();
                    self.line(depth, &format!("complete with {}", fields.join(" and ")));
                }
            }
            Stmt::Reject { message, .. } => {
                self.line(depth, &format!("reject with {}", print_expr(message)));
            }
        }
    }

    /// Modifier lines shared by service calls and `ask`.
    fn modifiers(
        &mut self,
        depth: usize,
        params: &[Param],
        bindings: &Bindings,
        on_failure: Option<&ErrorHandler>,
    ) {
        if !params.is_empty() {
            let params: Vec<String> = params
                .iter()
                .map(|p| format!("{} {}", p.name, expr_at(&p.value, Level::Arith)))
                .collect();
            self.line(depth, &format!("with {}", params.join(" and ")));
        }
        if let Some(binding) = &bindings.result {
            self.line(depth, &format!("save the result as {}", binding.name));
        }
        if let Some(binding) = &bindings.status {
            self.line(depth, &format!("save the status as {}", binding.name));
        }
        if let Some(binding) = &bindings.headers {
            self.line(depth, &format!("save the headers as {}", binding.name));
        }
        if let Some(handler) = on_failure {
            self.line(depth, "on failure:");
            match &handler.retry {
                Some(policy) => {
                    let mut line = format!("retry {} times", policy.retries);
                    if let Some(wait) = policy.wait_seconds {
                        let _ = write!(line, " waiting {} seconds", format_number(wait));
                    }
                    self.line(depth + 1, &line);
                    if let Some(fallback) = &handler.fallback {
                        self.line(depth + 1, "if still failing:");
                        self.block(depth + 2, fallback);
                    }
                }
                None => {
                    if let Some(fallback) = &handler.fallback {
                        self.block(depth + 1, fallback);
                    }
                }
            }
        }
    }
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Logical,
    Not,
    Compare,
    Arith,
    Primary,
}

fn level_of(expr: &Expr) -> Level {
    match expr {
        Expr::Logical { .. } => Level::Logical,
        Expr::Not { .. } => Level::Not,
        Expr::Compare { .. } => Level::Compare,
        Expr::Arith { .. } => Level::Arith,
        _ => Level::Primary,
    }
}

/// Print `expr` where the grammar expects at least `min`, adding parentheses
/// when the expression binds more loosely.
fn expr_at(expr: &Expr, min: Level) -> String {
    let text = match expr {
        Expr::LitStr { v, .. } => quote(v),
        Expr::Interpolated { parts, .. } => {
            let mut out = String::from("\"");
            for part in parts {
                match part {
                    StrPart::Text(text) => out.push_str(&escape(text)),
                    StrPart::Expr(inner) => {
                        out.push('{');
                        out.push_str(&expr_at(inner, Level::Primary));
                        out.push('}');
                    }
                }
            }
            out.push('"');
            out
        }
        Expr::LitNum { v, .. } => format_number(*v),
        Expr::LitBool { v, .. } => v.to_string(),
        Expr::LitList { elements, .. } => {
            let items: Vec<String> = elements.iter().map(print_expr).collect();
            format!("[{}]", items.join(", "))
        }
        Expr::Ident { name, .. } => name.clone(),
        Expr::Field { root, path, .. } => format!("{}.{}", root, path.join(".")),
        Expr::Arith {
            op, left, right, ..
        } => format!(
            "{} {} {}",
            expr_at(left, Level::Arith),
            op.phrase(),
            expr_at(right, Level::Primary)
        ),
        Expr::Compare {
            op, left, right, ..
        } => match right {
            Some(right) => format!(
                "{} {} {}",
                expr_at(left, Level::Arith),
                op.phrase(),
                expr_at(right, Level::Arith)
            ),
            None => format!("{} {}", expr_at(left, Level::Arith), op.phrase()),
        },
        Expr::Logical {
            op, left, right, ..
        } => {
            let word = match op {
                LogicalOp::And => "and",
                LogicalOp::Or => "or",
            };
            format!(
                "{} {} {}",
                expr_at(left, Level::Logical),
                word,
                expr_at(right, Level::Not)
            )
        }
        Expr::Not { inner, .. } => format!("not {}", expr_at(inner, Level::Not)),
    };

    if level_of(expr) < min {
        format!("({})", text)
    } else {
        text
    }
}

/// Backslash-escape quotes, backslashes, control characters and braces so
/// the text reads back as a plain string with no interpolation.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Print a call description bare when it reads back as the same plain words
/// after the verb, quoted otherwise.
fn description_source(verb: &str, description: &str) -> String {
    if reads_as_plain_words(&format!("{} {}", verb, description)) {
        description.to_string()
    } else {
        quote(description)
    }
}

fn reads_as_plain_words(phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split(' ').collect();
    if words.iter().any(|word| word.is_empty()) {
        return false;
    }
    let Ok(tokens) = tokenize(phrase) else {
        return false;
    };
    let significant: Vec<_> = tokens
        .iter()
        .filter(|token| !matches!(token.kind, TokenKind::Newline | TokenKind::Eof))
        .collect();
    significant.len() == words.len()
        && significant
            .iter()
            .zip(&words)
            .all(|(token, word)| token.kind == TokenKind::Identifier && token.text == *word)
}

fn is_plain_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && crate::parser::token::Keyword::from_phrase(&text.to_ascii_lowercase()).is_none()
}
