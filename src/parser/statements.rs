//! Block and statement builders

use std::fmt::Write;

use super::printer::{escape, quote};
use super::token::{Keyword, Token, TokenKind};
use super::Parser;
use crate::executor::types::ast::{
    AskCall, Binding, Bindings, ConfigBlock, ConfigEntry, ElseIf, ErrorHandler, Header,
    OutputField, Param, RetryPolicy, ServiceCall, ServiceDecl, ServiceKind, ServicesBlock, Span,
    Stmt, WorkflowBlock,
};

type StatementBuilder = fn(&mut Parser) -> Stmt;

/// Leading keyword of a line → statement builder. Lines that start with
/// anything else are service calls.
const STATEMENT_BUILDERS: &[(Keyword, StatementBuilder)] = &[
    (Keyword::Step, Parser::parse_step as StatementBuilder),
    (Keyword::If, Parser::parse_if as StatementBuilder),
    (Keyword::ForEach, Parser::parse_for_each as StatementBuilder),
    (Keyword::Set, Parser::parse_set as StatementBuilder),
    (Keyword::Ask, Parser::parse_ask as StatementBuilder),
    (Keyword::Complete, Parser::parse_complete as StatementBuilder),
    (Keyword::CompleteWith, Parser::parse_complete as StatementBuilder),
    (Keyword::RejectWith, Parser::parse_reject as StatementBuilder),
    (Keyword::Log, Parser::parse_log as StatementBuilder),
];

pub(super) fn token_span(token: &Token) -> Span {
    Span::new(token.offset, token.end, token.line, token.column)
}

impl Parser {
    /* ===================== Blocks ===================== */

    /// Parse the indented lines under a header whose `:` was just consumed.
    fn parse_block_lines(&mut self, each: impl FnMut(&mut Parser)) {
        self.end_of_line();
        if !self.check(TokenKind::Indent) {
            self.error_expected("an indented block on the next line");
            return;
        }
        self.parse_indented(each);
    }

    /// Parse lines between an `Indent` (next token) and its matching `Dedent`.
    fn parse_indented(&mut self, mut each: impl FnMut(&mut Parser)) {
        if self.eat(TokenKind::Indent).is_none() {
            return;
        }
        loop {
            self.recover();
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent => {
                    self.error_here(
                        "Unexpected indentation",
                        Some("Only lines after one ending in ':' can be indented further"),
                    );
                    self.skip_block();
                }
                _ => {
                    let before = self.pos;
                    each(self);
                    if self.pos == before {
                        self.error_expected("a statement");
                        self.synchronize();
                    }
                }
            }
        }
    }

    fn parse_body(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        self.parse_block_lines(|p| {
            if let Some(stmt) = p.parse_statement() {
                body.push(stmt);
            }
        });
        body
    }

    pub(super) fn parse_config_block(&mut self) -> ConfigBlock {
        let start = self.advance();
        self.expect(TokenKind::Colon, "':' after 'config'");

        let mut entries = Vec::new();
        self.parse_block_lines(|p| {
            let key = p.expect(TokenKind::Identifier, "a setting name");
            p.expect(TokenKind::Colon, "':' after the setting name");
            let value = p.parse_expression();
            p.end_of_line();
            if !key.text.is_empty() {
                entries.push(ConfigEntry {
                    key: key.text.clone(),
                    value,
                    span: p.span_from(&key),
                });
            }
        });

        ConfigBlock {
            entries,
            span: self.span_from(&start),
        }
    }

    pub(super) fn parse_services_block(&mut self) -> ServicesBlock {
        let start = self.advance();
        self.expect(TokenKind::Colon, "':' after 'services'");

        let mut services = Vec::new();
        self.parse_block_lines(|p| {
            if let Some(decl) = p.parse_service_decl() {
                services.push(decl);
            }
        });

        ServicesBlock {
            services,
            span: self.span_from(&start),
        }
    }

    /// `Name is an API at "https://..."`, optionally followed by an indented
    /// `with headers:` block.
    fn parse_service_decl(&mut self) -> Option<ServiceDecl> {
        let name = self.expect(TokenKind::Identifier, "a service name");
        self.expect_keyword(Keyword::Is);

        if self.check(TokenKind::Identifier)
            && matches!(self.peek().text.to_ascii_lowercase().as_str(), "a" | "an")
        {
            self.advance();
        }

        let kind_token = self.expect(
            TokenKind::Identifier,
            "a service kind (API, AI, plugin or webhook)",
        );
        let kind = ServiceKind::from_word(&kind_token.text);
        if kind.is_none() && !kind_token.text.is_empty() {
            self.error_at_span(
                format!("Unknown service kind '{}'", kind_token.text),
                token_span(&kind_token),
                Some("Use API, AI, plugin or webhook"),
            );
        }

        if self.eat_keyword(Keyword::At).is_none() {
            self.eat_keyword(Keyword::Using);
        }
        let target = self.expect(TokenKind::Str, "the service address in quotes");
        self.end_of_line();

        let mut headers = Vec::new();
        if self.check(TokenKind::Indent) {
            self.parse_indented(|p| {
                if p.eat_keyword(Keyword::WithHeaders).is_some() {
                    p.expect(TokenKind::Colon, "':' after 'with headers'");
                    p.parse_block_lines(|p| {
                        if let Some(header) = p.parse_header() {
                            headers.push(header);
                        }
                    });
                } else {
                    p.error_expected("'with headers:'");
                    p.synchronize();
                }
            });
        }

        let kind = kind?;
        if name.text.is_empty() {
            return None;
        }
        Some(ServiceDecl {
            name: name.text.clone(),
            kind,
            target: target.text,
            headers,
            span: self.span_from(&name),
        })
    }

    fn parse_header(&mut self) -> Option<Header> {
        let name = if self.check(TokenKind::Str) {
            self.advance()
        } else {
            self.expect(TokenKind::Identifier, "a header name")
        };
        self.expect(TokenKind::Colon, "':' after the header name");
        let value = self.parse_expression();
        self.end_of_line();

        if name.text.is_empty() {
            return None;
        }
        Some(Header {
            name: name.text.clone(),
            value,
            span: self.span_from(&name),
        })
    }

    pub(super) fn parse_workflow_block(&mut self) -> WorkflowBlock {
        let start = self.advance();
        self.expect(TokenKind::Colon, "':' after 'workflow'");

        let mut trigger: Option<String> = None;
        let mut body = Vec::new();
        self.parse_block_lines(|p| {
            if p.check_keyword(Keyword::Trigger) {
                let token = p.advance();
                p.expect(TokenKind::Colon, "':' after 'trigger'");
                let text = p.parse_free_text(|_| false);
                p.end_of_line();
                if trigger.is_some() || !body.is_empty() {
                    p.report(
                        "The trigger must be the first line of the workflow",
                        token_span(&token),
                        None,
                    );
                } else {
                    trigger = Some(text);
                }
            } else if let Some(stmt) = p.parse_statement() {
                body.push(stmt);
            }
        });

        WorkflowBlock {
            trigger,
            body,
            span: self.span_from(&start),
        }
    }

    /// Bare words and quoted strings up to the end of the line or a token
    /// matching `stop`.
    ///
    /// A lone quoted string gives its text. Anything else is kept in source
    /// form with one space between words, strings re-quoted, so printing and
    /// re-reading it gives back the same text.
    fn parse_free_text(&mut self, stop: impl Fn(TokenKind) -> bool) -> String {
        let mut words = Vec::new();
        let mut lone_text = None;
        while !self.at_line_end() && !stop(self.peek_kind()) {
            let token = self.advance();
            let word = match token.kind {
                TokenKind::Str => {
                    if words.is_empty() {
                        lone_text = Some(token.text.clone());
                    }
                    quote(&token.text)
                }
                TokenKind::StringStart => self.interpolated_source(),
                _ => token.text,
            };
            words.push(word);
        }
        match lone_text {
            Some(text) if words.len() == 1 => text,
            _ => words.join(" "),
        }
    }

    /// Source form of an interpolated string, after its opening quote.
    fn interpolated_source(&mut self) -> String {
        let mut out = String::from("\"");
        let mut hole = String::new();
        while !self.check(TokenKind::StringEnd) && !self.check(TokenKind::Eof) {
            let token = self.advance();
            match token.kind {
                TokenKind::StringFragment => out.push_str(&escape(&token.text)),
                TokenKind::InterpStart => hole.clear(),
                TokenKind::InterpEnd => {
                    let _ = write!(out, "{{{}}}", hole);
                }
                TokenKind::Dot => hole.push('.'),
                kind => {
                    if !hole.is_empty() && !hole.ends_with('.') {
                        hole.push(' ');
                    }
                    match kind {
                        TokenKind::Str => hole.push_str(&quote(&token.text)),
                        TokenKind::StringStart => {
                            let nested = self.interpolated_source();
                            hole.push_str(&nested);
                        }
                        _ => hole.push_str(&token.text),
                    }
                }
            }
        }
        if self.check(TokenKind::StringEnd) {
            self.advance();
        }
        out.push('"');
        out
    }

    /* ===================== Statements ===================== */

    pub(super) fn parse_statement(&mut self) -> Option<Stmt> {
        let kind = self.peek_kind();

        if let TokenKind::Keyword(keyword) = kind {
            if let Some((_, build)) = STATEMENT_BUILDERS.iter().find(|(k, _)| *k == keyword) {
                return Some(build(self));
            }
            if matches!(keyword, Keyword::Otherwise | Keyword::OtherwiseIf) {
                self.error_here(
                    "'otherwise' must directly follow an 'if' block at the same indentation",
                    None,
                );
                self.synchronize();
                if self.check(TokenKind::Indent) {
                    self.skip_block();
                }
                return None;
            }
        }

        self.parse_service_call()
    }

    fn parse_step(&mut self) -> Stmt {
        let start = self.advance();
        let label = self.parse_free_text(|k| k == TokenKind::Colon);
        if label.trim().is_empty() {
            self.error_expected("a step name");
        }
        self.expect(TokenKind::Colon, "':' after the step name");
        let body = self.parse_body();

        Stmt::Step {
            label,
            body,
            span: self.span_from(&start),
        }
    }

    fn parse_if(&mut self) -> Stmt {
        let start = self.advance();
        let test = self.parse_expression();
        self.expect(TokenKind::Colon, "':' after the condition");
        let then_body = self.parse_body();

        let mut else_ifs = Vec::new();
        let mut else_body = None;
        loop {
            self.recover();
            if self.check_keyword(Keyword::OtherwiseIf) {
                let branch_start = self.advance();
                let test = self.parse_expression();
                self.expect(TokenKind::Colon, "':' after the condition");
                let body = self.parse_body();
                else_ifs.push(ElseIf {
                    test,
                    body,
                    span: self.span_from(&branch_start),
                });
            } else if self.check_keyword(Keyword::Otherwise) {
                self.advance();
                self.expect(TokenKind::Colon, "':' after 'otherwise'");
                else_body = Some(self.parse_body());
                break;
            } else {
                break;
            }
        }

        Stmt::If {
            test,
            then_body,
            else_ifs,
            else_body,
            span: self.span_from(&start),
        }
    }

    fn parse_for_each(&mut self) -> Stmt {
        let start = self.advance();
        let binding = self.expect(TokenKind::Identifier, "a name for each item");
        self.expect_keyword(Keyword::In);
        let iterable = self.parse_expression();
        self.expect(TokenKind::Colon, "':' after the list to loop over");
        let body = self.parse_body();

        Stmt::ForEach {
            binding: binding.text.clone(),
            binding_span: token_span(&binding),
            iterable,
            body,
            span: self.span_from(&start),
        }
    }

    fn parse_set(&mut self) -> Stmt {
        let start = self.advance();
        let name = self.expect(TokenKind::Identifier, "a variable name");
        self.expect_keyword(Keyword::To);
        let value = self.parse_expression();
        let span = self.span_from(&start);
        self.end_of_line();

        Stmt::Set {
            name: name.text.clone(),
            name_span: token_span(&name),
            value,
            span,
        }
    }

    fn parse_log(&mut self) -> Stmt {
        let start = self.advance();
        let message = self.parse_expression();
        let span = self.span_from(&start);
        self.end_of_line();
        Stmt::Log { message, span }
    }

    fn parse_complete(&mut self) -> Stmt {
        let start = self.advance();
        let mut outputs = Vec::new();

        if start.is_keyword(Keyword::CompleteWith) {
            loop {
                let name = self.expect(TokenKind::Identifier, "an output name");
                let value = self.parse_arithmetic();
                outputs.push(OutputField {
                    name: name.text.clone(),
                    value,
                    span: self.span_from(&name),
                });
                if self.eat_keyword(Keyword::And).is_none() {
                    break;
                }
            }
        }

        let span = self.span_from(&start);
        self.end_of_line();
        Stmt::Complete { outputs, span }
    }

    fn parse_reject(&mut self) -> Stmt {
        let start = self.advance();
        let message = self.parse_expression();
        let span = self.span_from(&start);
        self.end_of_line();
        Stmt::Reject { message, span }
    }

    /* ===================== Service Calls ===================== */

    /// `<verb> <description...> using <Service> [at <path>] [with ...]`
    fn parse_service_call(&mut self) -> Option<Stmt> {
        let start = self.peek().clone();
        if !self.check(TokenKind::Identifier) {
            self.error_expected("a statement");
            self.synchronize();
            return None;
        }
        let verb = self.advance();
        let description = self.parse_free_text(|k| k == TokenKind::Keyword(Keyword::Using));

        if self.eat_keyword(Keyword::Using).is_none() {
            self.error_here(
                format!(
                    "Expected 'using <Service>' after '{}', found {}",
                    [verb.text.as_str(), description.as_str()].join(" ").trim(),
                    super::describe(self.peek())
                ),
                Some("Service calls read like: get order details using Shop"),
            );
            self.synchronize();
            if self.check(TokenKind::Indent) {
                self.skip_block();
            }
            return None;
        }

        let service = self.expect(TokenKind::Identifier, "a service name");
        let path = self
            .eat_keyword(Keyword::At)
            .map(|_| self.parse_expression());
        let mut params = Vec::new();
        if self.eat_keyword(Keyword::With).is_some() {
            self.parse_params(&mut params);
        }
        let (bindings, on_failure) = self.parse_call_modifiers(&mut params);

        Some(Stmt::Call(ServiceCall {
            verb: verb.text,
            description,
            service: service.text.clone(),
            service_span: token_span(&service),
            path,
            params,
            bindings,
            on_failure,
            span: self.span_from(&start),
        }))
    }

    /// `ask <Agent> to <prompt> [with ...]`
    fn parse_ask(&mut self) -> Stmt {
        let start = self.advance();
        let agent = self.expect(TokenKind::Identifier, "the AI service to ask");
        self.expect_keyword(Keyword::To);
        let prompt = self.parse_expression();
        let mut params = Vec::new();
        if self.eat_keyword(Keyword::With).is_some() {
            self.parse_params(&mut params);
        }
        let (bindings, on_failure) = self.parse_call_modifiers(&mut params);

        Stmt::Ask(AskCall {
            agent: agent.text.clone(),
            agent_span: token_span(&agent),
            prompt,
            params,
            bindings,
            on_failure,
            span: self.span_from(&start),
        })
    }

    /// `<name> <value> [and <name> <value>]*`
    fn parse_params(&mut self, params: &mut Vec<Param>) {
        loop {
            let name = self.expect(TokenKind::Identifier, "a parameter name");
            let value = self.parse_arithmetic();
            params.push(Param {
                name: name.text.clone(),
                value,
                span: self.span_from(&name),
            });
            if self.eat_keyword(Keyword::And).is_none() {
                break;
            }
        }
    }

    /// Ends the call line and parses any indented modifier lines.
    fn parse_call_modifiers(
        &mut self,
        params: &mut Vec<Param>,
    ) -> (Bindings, Option<ErrorHandler>) {
        let mut bindings = Bindings::default();
        let mut on_failure: Option<ErrorHandler> = None;

        self.end_of_line();
        if self.check(TokenKind::Indent) {
            self.parse_indented(|p| match p.peek_kind() {
                TokenKind::Keyword(Keyword::With) => {
                    p.advance();
                    p.parse_params(params);
                    p.end_of_line();
                }
                TokenKind::Keyword(Keyword::SaveResultAs) => {
                    p.parse_binding(&mut bindings.result, "result")
                }
                TokenKind::Keyword(Keyword::SaveStatusAs) => {
                    p.parse_binding(&mut bindings.status, "status")
                }
                TokenKind::Keyword(Keyword::SaveHeadersAs) => {
                    p.parse_binding(&mut bindings.headers, "headers")
                }
                TokenKind::Keyword(Keyword::OnFailure) => {
                    let start = p.advance();
                    p.expect(TokenKind::Colon, "':' after 'on failure'");
                    let handler = p.parse_error_handler(&start);
                    if on_failure.is_some() {
                        p.report(
                            "A call can only have one 'on failure' block",
                            token_span(&start),
                            None,
                        );
                    } else {
                        on_failure = Some(handler);
                    }
                }
                _ => {
                    p.error_expected(
                        "'with', 'save the result as', 'save the status as', \
                         'save the headers as' or 'on failure:'",
                    );
                    p.synchronize();
                    if p.check(TokenKind::Indent) {
                        p.skip_block();
                    }
                }
            });
        }

        (bindings, on_failure)
    }

    fn parse_binding(&mut self, slot: &mut Option<Binding>, what: &str) {
        self.advance();
        let name = self.expect(TokenKind::Identifier, "a variable name");
        self.end_of_line();
        if name.text.is_empty() {
            return;
        }
        if let Some(existing) = slot {
            self.report(
                format!("The {} is already saved as '{}'", what, existing.name),
                token_span(&name),
                None,
            );
            return;
        }
        *slot = Some(Binding {
            name: name.text.clone(),
            span: token_span(&name),
        });
    }

    /// Body of `on failure:`. Either `retry N times [waiting M seconds]`
    /// optionally followed by `if still failing:`, or plain fallback
    /// statements.
    fn parse_error_handler(&mut self, start: &Token) -> ErrorHandler {
        let mut retry: Option<RetryPolicy> = None;
        let mut fallback: Option<Vec<Stmt>> = None;
        let mut statements = Vec::new();

        self.parse_block_lines(|p| {
            if p.check_keyword(Keyword::Retry) {
                let policy = p.parse_retry_policy();
                if retry.is_some() || !statements.is_empty() {
                    p.report(
                        "'retry' must be the first line of an 'on failure' block",
                        policy.span,
                        None,
                    );
                } else {
                    retry = Some(policy);
                }
            } else if p.check_keyword(Keyword::IfStillFailing) {
                let token = p.advance();
                p.expect(TokenKind::Colon, "':' after 'if still failing'");
                let body = p.parse_body();
                if retry.is_none() {
                    p.report(
                        "'if still failing' needs a 'retry' line before it",
                        token_span(&token),
                        Some(
                            "Without retries, put the fallback statements directly under \
                             'on failure:'",
                        ),
                    );
                } else if fallback.is_some() {
                    p.report(
                        "Only one 'if still failing' block is allowed",
                        token_span(&token),
                        None,
                    );
                } else {
                    fallback = Some(body);
                }
            } else if let Some(stmt) = p.parse_statement() {
                if retry.is_some() {
                    p.report(
                        "Only 'if still failing:' can follow a retry line",
                        stmt.span(),
                        Some("Move these statements under 'if still failing:'"),
                    );
                } else {
                    statements.push(stmt);
                }
            }
        });

        if retry.is_none() && !statements.is_empty() {
            fallback = Some(statements);
        }

        ErrorHandler {
            retry,
            fallback,
            span: self.span_from(start),
        }
    }

    fn parse_retry_policy(&mut self) -> RetryPolicy {
        let start = self.advance();
        let count = self.expect(TokenKind::Number, "the number of retries");
        let retries = match count.text.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                if !count.text.is_empty() {
                    self.error_at_span(
                        "The retry count must be a whole number",
                        token_span(&count),
                        None,
                    );
                }
                0
            }
        };
        self.expect_keyword(Keyword::Times);

        let mut wait_seconds = None;
        if self.eat_keyword(Keyword::Waiting).is_some() {
            let amount = self.expect(TokenKind::Number, "how long to wait");
            let value: f64 = amount.text.parse().unwrap_or(0.0);
            if value < 0.0 {
                self.error_at_span(
                    "The wait time cannot be negative",
                    token_span(&amount),
                    None,
                );
            }
            let unit = self.expect(TokenKind::Identifier, "'seconds'");
            let scale = match unit.text.to_ascii_lowercase().as_str() {
                "second" | "seconds" | "" => 1.0,
                "minute" | "minutes" => 60.0,
                "millisecond" | "milliseconds" => 0.001,
                other => {
                    self.error_at_span(
                        format!("Unknown time unit '{}'", other),
                        token_span(&unit),
                        Some("Use seconds, minutes or milliseconds"),
                    );
                    1.0
                }
            };
            wait_seconds = Some(value * scale);
        }

        let span = self.span_from(&start);
        self.end_of_line();
        RetryPolicy {
            retries,
            wait_seconds,
            span,
        }
    }
}
