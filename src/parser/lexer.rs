//! Indentation-aware lexer
//!
//! Turns source text into a flat token stream. Block structure is encoded
//! with `Indent`/`Dedent` tokens driven by an indentation stack, multi-word
//! keywords are matched longest-first, and string interpolation is split into
//! fragment/expression tokens here so the parser never re-scans string bodies.
//!
//! Every lexical problem is fatal: the first one aborts tokenization.

use thiserror::Error;

use super::token::{Keyword, Token, TokenKind, MAX_KEYWORD_WORDS};

/// Number of spaces each nested block must add.
pub const INDENT_WIDTH: usize = 4;

/// A fatal lexical error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct LexError {
    pub message: String,
    /// 1-indexed
    pub line: usize,
    /// 1-indexed
    pub column: usize,
    pub hint: Option<String>,
}

impl LexError {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Tokenize a complete source file.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).tokenize()
}

pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
    at_line_start: bool,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            line_start: 0,
            at_line_start: true,
            indent_stack: vec![0],
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        while self.pos < self.source.len() {
            if self.at_line_start {
                self.start_line()?;
                continue;
            }

            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.push(TokenKind::Newline, "\n", self.pos);
                    self.pos += 1;
                    self.next_line();
                }
                ' ' | '\r' => self.pos += 1,
                '\t' => return Err(self.tab_error(self.pos)),
                '#' => self.skip_to_line_end(),
                '"' => self.lex_string()?,
                ':' => self.single(TokenKind::Colon),
                '.' => self.single(TokenKind::Dot),
                ',' => self.single(TokenKind::Comma),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '0'..='9' => self.lex_number()?,
                '-' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    self.lex_number()?
                }
                c if is_word_start(c) => self.lex_word(),
                other => {
                    return Err(LexError::new(
                        format!("Unexpected character '{}'", other),
                        self.line,
                        self.column(self.pos),
                    ))
                }
            }
        }

        if self
            .tokens
            .last()
            .is_some_and(|t| t.kind != TokenKind::Newline)
        {
            self.push(TokenKind::Newline, "", self.pos);
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push(TokenKind::Dedent, "", self.pos);
        }
        self.push(TokenKind::Eof, "", self.pos);

        Ok(self.tokens)
    }

    /* ===================== Lines & Indentation ===================== */

    /// Measure the indentation of the line at `pos`. Blank and comment-only
    /// lines are consumed whole without touching the indentation stack.
    fn start_line(&mut self) -> Result<(), LexError> {
        let mut width = 0;
        let mut cursor = self.pos;
        loop {
            match self.source[cursor..].chars().next() {
                Some(' ') => {
                    width += 1;
                    cursor += 1;
                }
                Some('\t') => return Err(self.tab_error(cursor)),
                _ => break,
            }
        }

        match self.source[cursor..].chars().next() {
            None => {
                self.pos = cursor;
                self.at_line_start = false;
            }
            Some('\n') | Some('#') | Some('\r') => {
                self.pos = cursor;
                self.skip_to_line_end();
                if self.peek() == Some('\n') {
                    self.pos += 1;
                    self.next_line();
                }
            }
            Some(_) => {
                self.pos = cursor;
                self.at_line_start = false;
                self.apply_indent(width)?;
            }
        }
        Ok(())
    }

    fn apply_indent(&mut self, width: usize) -> Result<(), LexError> {
        let top = self.indent_stack.last().copied().unwrap_or(0);

        if width > top {
            if width - top != INDENT_WIDTH {
                return Err(LexError::new(
                    format!(
                        "Indentation must increase by exactly {} spaces, found {}",
                        INDENT_WIDTH,
                        width - top
                    ),
                    self.line,
                    width + 1,
                )
                .with_hint("Indent each nested block by 4 spaces"));
            }
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, "", self.pos);
        } else if width < top {
            while self.indent_stack.last().is_some_and(|&level| width < level) {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, "", self.pos);
            }
            if self.indent_stack.last().copied() != Some(width) {
                return Err(LexError::new(
                    format!(
                        "Indentation of {} spaces does not line up with any enclosing block",
                        width
                    ),
                    self.line,
                    width + 1,
                )
                .with_hint("Line this statement up with an earlier line"));
            }
        }
        Ok(())
    }

    fn next_line(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
        self.at_line_start = true;
    }

    fn skip_to_line_end(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn tab_error(&self, at: usize) -> LexError {
        LexError::new("Tab characters are not allowed", self.line, self.column(at))
            .with_hint("Use 4 spaces for each level of indentation")
    }

    /* ===================== Words & Keywords ===================== */

    /// Lex an identifier, boolean, or keyword. Compound keywords are tried
    /// longest first so a shorter phrase never pre-empts a longer one.
    fn lex_word(&mut self) {
        let start = self.pos;
        let words = self.scan_words(start);

        for n in (1..=words.len()).rev() {
            let phrase = words[..n]
                .iter()
                .map(|(s, e)| self.source[*s..*e].to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            if let Some(keyword) = Keyword::from_phrase(&phrase) {
                let end = words[n - 1].1;
                let source = self.source;
                self.push(TokenKind::Keyword(keyword), &source[start..end], start);
                self.pos = end;
                return;
            }
        }

        let (s, e) = words[0];
        let source = self.source;
        let text = &source[s..e];
        let kind = if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            TokenKind::Boolean
        } else {
            TokenKind::Identifier
        };
        self.push(kind, text, s);
        self.pos = e;
    }

    /// Collect up to `MAX_KEYWORD_WORDS` space-separated words starting at
    /// `start`, as byte ranges.
    fn scan_words(&self, start: usize) -> Vec<(usize, usize)> {
        let mut words = Vec::new();
        let mut cursor = start;

        while words.len() < MAX_KEYWORD_WORDS {
            let rest = &self.source[cursor..];
            if !rest.chars().next().is_some_and(is_word_start) {
                break;
            }
            let len: usize = rest
                .chars()
                .take_while(|c| is_word_char(*c))
                .map(char::len_utf8)
                .sum();
            words.push((cursor, cursor + len));
            cursor += len;

            let spaces = self.source[cursor..]
                .chars()
                .take_while(|c| *c == ' ')
                .count();
            if spaces == 0 {
                break;
            }
            cursor += spaces;
        }
        words
    }

    /* ===================== Literals ===================== */

    fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        self.eat_digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_digits();
        }
        if self.peek().is_some_and(is_word_char) {
            return Err(LexError::new(
                format!("Invalid number '{}'", self.word_from(start)),
                self.line,
                self.column(start),
            ));
        }
        let source = self.source;
        self.push(TokenKind::Number, &source[start..self.pos], start);
        Ok(())
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn lex_string(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let line = self.line;
        let column = self.column(start);
        self.pos += 1;

        let mut parts: Vec<Token> = Vec::new();
        let mut buf = String::new();
        let mut buf_start = self.pos;
        let mut interpolated = false;

        loop {
            let Some(c) = self.peek() else {
                return Err(unterminated(line, column));
            };
            match c {
                '\n' => return Err(unterminated(line, column)),
                '"' => {
                    self.pos += 1;
                    break;
                }
                '\\' => {
                    let escaped = match self.peek_at(1) {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('{') => '{',
                        Some('}') => '}',
                        Some('\n') | None => return Err(unterminated(line, column)),
                        Some(other) => {
                            return Err(LexError::new(
                                format!("Unknown escape sequence '\\{}'", other),
                                self.line,
                                self.column(self.pos),
                            ))
                        }
                    };
                    buf.push(escaped);
                    self.pos += 2;
                }
                '{' if self.peek_at(1) == Some('{') => {
                    buf.push('{');
                    self.pos += 2;
                }
                '}' if self.peek_at(1) == Some('}') => {
                    buf.push('}');
                    self.pos += 2;
                }
                '{' => {
                    interpolated = true;
                    if !buf.is_empty() {
                        parts.push(self.token_at(
                            TokenKind::StringFragment,
                            std::mem::take(&mut buf),
                            buf_start,
                        ));
                    }
                    self.lex_interpolation(&mut parts)?;
                    buf_start = self.pos;
                }
                '}' => {
                    return Err(LexError::new(
                        "Unmatched '}' in text",
                        self.line,
                        self.column(self.pos),
                    )
                    .with_hint("Write '}}' for a literal brace"))
                }
                other => {
                    buf.push(other);
                    self.pos += other.len_utf8();
                }
            }
        }

        if !interpolated {
            let mut token = self.token_at(TokenKind::Str, buf, start);
            token.end = self.pos;
            self.tokens.push(token);
            return Ok(());
        }

        if !buf.is_empty() {
            parts.push(self.token_at(TokenKind::StringFragment, buf, buf_start));
        }
        self.push(TokenKind::StringStart, "\"", start);
        self.tokens.extend(parts);
        self.push(TokenKind::StringEnd, "\"", self.pos - 1);
        Ok(())
    }

    /// Lex `{name.field...}` inside a string, starting at the `{`.
    fn lex_interpolation(&mut self, parts: &mut Vec<Token>) -> Result<(), LexError> {
        let open = self.pos;
        parts.push(self.token_at(TokenKind::InterpStart, "{".to_string(), open));
        self.pos += 1;
        self.skip_spaces();

        if self.peek() == Some('}') {
            return Err(LexError::new(
                "Empty interpolation '{}'",
                self.line,
                self.column(open),
            )
            .with_hint("Put a name inside the braces, or write '{{}}' for literal braces"));
        }

        loop {
            let word_start = self.pos;
            match self.peek() {
                Some(c) if is_word_start(c) => {
                    let len: usize = self.source[word_start..]
                        .chars()
                        .take_while(|c| is_word_char(*c))
                        .map(char::len_utf8)
                        .sum();
                    self.pos += len;
                    let text = self.source[word_start..self.pos].to_string();
                    parts.push(self.token_at(TokenKind::Identifier, text, word_start));
                }
                None | Some('"') | Some('\n') => return Err(missing_closer(self, open)),
                Some(other) => return Err(bad_interpolation(self, other)),
            }

            self.skip_spaces();
            match self.peek() {
                Some('.') => {
                    parts.push(self.token_at(TokenKind::Dot, ".".to_string(), self.pos));
                    self.pos += 1;
                    self.skip_spaces();
                }
                Some('}') => {
                    parts.push(self.token_at(TokenKind::InterpEnd, "}".to_string(), self.pos));
                    self.pos += 1;
                    return Ok(());
                }
                None | Some('"') | Some('\n') => return Err(missing_closer(self, open)),
                Some(other) => return Err(bad_interpolation(self, other)),
            }
        }

        fn missing_closer(lexer: &Lexer<'_>, open: usize) -> LexError {
            LexError::new(
                "Missing '}' to close interpolation",
                lexer.line,
                lexer.column(open),
            )
        }

        fn bad_interpolation(lexer: &Lexer<'_>, found: char) -> LexError {
            LexError::new(
                format!("Unexpected '{}' inside interpolation", found),
                lexer.line,
                lexer.column(lexer.pos),
            )
            .with_hint("Only names and dotted fields like {order.total} can be interpolated")
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    /* ===================== Helpers ===================== */

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.source[self.pos..].chars().nth(n)
    }

    fn column(&self, offset: usize) -> usize {
        self.source[self.line_start..offset].chars().count() + 1
    }

    fn word_from(&self, start: usize) -> &str {
        let len: usize = self.source[start..]
            .chars()
            .take_while(|c| is_word_char(*c) || *c == '.' || *c == '-')
            .map(char::len_utf8)
            .sum();
        &self.source[start..start + len]
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        let source = self.source;
        self.push(kind, &source[start..self.pos], start);
    }

    fn token_at(&self, kind: TokenKind, text: String, offset: usize) -> Token {
        Token::new(kind, text, self.line, self.column(offset), offset)
    }

    fn push(&mut self, kind: TokenKind, text: &str, offset: usize) {
        let token = self.token_at(kind, text.to_string(), offset);
        self.tokens.push(token);
    }
}

fn unterminated(line: usize, column: usize) -> LexError {
    LexError::new("Unterminated text: missing closing quote", line, column)
        .with_hint("Text must start and end with \" on the same line")
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}
