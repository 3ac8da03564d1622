//! Recursive-descent parser for workflow source files
//!
//! Consumes the lexer's token stream in a single pass and builds a
//! [`Program`]. The parser never stops at the first problem: every unexpected
//! token is recorded as a [`ParseError`], the rest of the statement is skipped,
//! and parsing resumes at the next statement boundary (end of line, dedent, or
//! end of file). A failing `expect` hands back a placeholder token so callers
//! can keep going without special cases.

use std::fmt;

use crate::executor::types::ast::{Program, Span};

pub mod lexer;
pub mod printer;
pub mod semantic_validator;
pub mod token;

mod expressions;
mod statements;


use lexer::LexError;
use token::{Keyword, Token, TokenKind};

/* ===================== Error Types ===================== */

/// A recoverable syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub hint: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}, column {}: {}",
            self.span.line, self.span.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing a token stream.
///
/// `program` is always produced; it is only safe to analyze or run when
/// `errors` is empty.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

impl ParseOutput {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/* ===================== Public API ===================== */

/// Lex and parse a source string.
///
/// Lexical errors are fatal and returned as `Err`; syntax errors are
/// collected in the [`ParseOutput`].
pub fn parse_program(source: &str) -> Result<ParseOutput, LexError> {
    let tokens = lexer::tokenize(source)?;
    Ok(parse_tokens(tokens))
}

/// Parse an already-lexed token stream.
pub fn parse_tokens(tokens: Vec<Token>) -> ParseOutput {
    let mut parser = Parser::new(tokens);
    let program = parser.parse_program();
    ParseOutput {
        program,
        errors: parser.errors,
    }
}

/* ===================== Parser State ===================== */

pub(crate) struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    /// Set after an error until the parser resynchronizes, so a single
    /// mistake produces one diagnostic instead of a cascade.
    panicking: bool,
    /// End offset of the last consumed token
    prev_end: usize,
    prev_kind: TokenKind,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let offset = tokens.last().map(|t| t.end).unwrap_or(0);
            let line = tokens.last().map(|t| t.line).unwrap_or(1);
            tokens.push(Token::new(TokenKind::Eof, "", line, 1, offset));
        }
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            panicking: false,
            prev_end: 0,
            prev_kind: TokenKind::Newline,
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        loop {
            self.recover();
            match self.peek_kind() {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                }
                TokenKind::Indent => {
                    self.error_here("Unexpected indentation at the top level", None);
                    self.skip_block();
                }
                TokenKind::Keyword(Keyword::Config) => {
                    let block = self.parse_config_block();
                    if program.config.is_some() {
                        self.report(
                            "The config block can only appear once",
                            block.span,
                            Some("Merge the two config blocks into one"),
                        );
                    } else {
                        program.config = Some(block);
                    }
                }
                TokenKind::Keyword(Keyword::Services) => {
                    let block = self.parse_services_block();
                    if program.services.is_some() {
                        self.report(
                            "The services block can only appear once",
                            block.span,
                            Some("Declare every service in a single services block"),
                        );
                    } else {
                        program.services = Some(block);
                    }
                }
                TokenKind::Keyword(Keyword::Workflow) => {
                    let block = self.parse_workflow_block();
                    if program.workflow.is_some() {
                        self.report(
                            "The workflow block can only appear once",
                            block.span,
                            None,
                        );
                    } else {
                        program.workflow = Some(block);
                    }
                }
                _ => {
                    self.error_expected("'config:', 'services:' or 'workflow:'");
                    self.synchronize();
                    if self.check(TokenKind::Indent) {
                        self.skip_block();
                    }
                }
            }
        }

        program
    }

    /* ===================== Token Access ===================== */

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_nth_kind(&self, n: usize) -> TokenKind {
        let last = self.tokens.len() - 1;
        self.tokens[(self.pos + n).min(last)].kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(TokenKind::Keyword(keyword))
    }

    fn at_line_end(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        )
    }

    /// Consume the current token. Never moves past end of file.
    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
            self.prev_end = token.end;
            self.prev_kind = token.kind;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> Option<Token> {
        self.eat(TokenKind::Keyword(keyword))
    }

    /// Consume a token of `kind`, or record an error and return a
    /// placeholder positioned at the current token.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if let Some(token) = self.eat(kind) {
            return token;
        }
        self.error_expected(what);
        let here = self.peek();
        Token::new(kind, "", here.line, here.column, here.offset)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Token {
        self.expect(
            TokenKind::Keyword(keyword),
            &format!("'{}'", keyword.phrase()),
        )
    }

    /// Expect the end of the current line.
    fn end_of_line(&mut self) {
        if self.eat(TokenKind::Newline).is_some() {
            self.panicking = false;
            return;
        }
        if self.at_line_end() {
            return;
        }
        self.error_expected("end of line");
        self.synchronize();
    }

    fn span_from(&self, start: &Token) -> Span {
        Span::new(
            start.offset,
            self.prev_end.max(start.offset),
            start.line,
            start.column,
        )
    }

    /* ===================== Errors & Recovery ===================== */

    /// Record an error that needs no recovery (the tokens were well formed).
    fn report(&mut self, message: impl Into<String>, span: Span, hint: Option<&str>) {
        self.errors.push(ParseError {
            message: message.into(),
            span,
            hint: hint.map(str::to_string),
        });
    }

    fn error_at_span(&mut self, message: impl Into<String>, span: Span, hint: Option<&str>) {
        if self.panicking {
            return;
        }
        self.panicking = true;
        self.errors.push(ParseError {
            message: message.into(),
            span,
            hint: hint.map(str::to_string),
        });
    }

    fn error_here(&mut self, message: impl Into<String>, hint: Option<&str>) {
        let token = self.peek();
        let span = Span::new(token.offset, token.end, token.line, token.column);
        self.error_at_span(message, span, hint);
    }

    fn error_expected(&mut self, what: &str) {
        let found = describe(self.peek());
        self.error_here(format!("Expected {}, found {}", what, found), None);
    }

    /// Skip to the next statement boundary and leave panic mode.
    ///
    /// A newline is consumed; a dedent or end of file is left for the
    /// enclosing block to handle.
    fn synchronize(&mut self) {
        loop {
            match self.peek_kind() {
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                TokenKind::Dedent | TokenKind::Eof => break,
                TokenKind::Indent => self.skip_block(),
                _ => {
                    self.advance();
                }
            }
        }
        self.panicking = false;
    }

    /// Leave panic mode before the next statement. If the failed statement
    /// already consumed its line ending there is nothing left to skip.
    fn recover(&mut self) {
        if !self.panicking {
            return;
        }
        if matches!(
            self.prev_kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        ) {
            self.panicking = false;
        } else {
            self.synchronize();
        }
    }

    /// Skip an entire indented block, including nested blocks.
    fn skip_block(&mut self) {
        if self.eat(TokenKind::Indent).is_none() {
            return;
        }
        let mut depth = 1;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => depth -= 1,
                TokenKind::Eof => break,
                _ => {}
            }
        }
    }
}

/// Human-readable description of a token for "found ..." messages.
fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Identifier | TokenKind::Number | TokenKind::Boolean => {
            format!("'{}'", token.text)
        }
        TokenKind::Str => format!("\"{}\"", token.text),
        other => other.to_string(),
    }
}
